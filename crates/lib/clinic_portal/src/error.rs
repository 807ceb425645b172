//! Portal error types.

use thiserror::Error;

/// Convenience alias for store operations.
pub type PortalResult<T> = Result<T, PortalError>;

/// Errors surfaced to portal callers.
///
/// Display strings are meant to be shown to the user as-is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortalError {
    /// Credentials were rejected; the message comes from the server.
    #[error("{0}")]
    Authentication(String),

    /// The server answered, but not with a usable session.
    #[error("The server returned an invalid session")]
    InvalidSession(String),

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Not authenticated")]
    NotAuthenticated,

    /// A profile, password or 2FA request was refused; server message verbatim.
    #[error("{0}")]
    Rejected(String),

    #[error("Unable to reach the server: {0}")]
    Network(String),

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Errors raised by a [`crate::verifier::CredentialVerifier`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifierError {
    /// The server answered with a non-success status.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The request never produced an answer.
    #[error("{0}")]
    Transport(String),

    /// The server answered 2xx with a body that could not be decoded.
    #[error("{0}")]
    Decode(String),
}

impl VerifierError {
    /// Map for login/refresh, where a rejection means bad credentials.
    pub(crate) fn into_auth_error(self) -> PortalError {
        match self {
            VerifierError::Rejected { message, .. } => PortalError::Authentication(message),
            VerifierError::Transport(msg) => PortalError::Network(msg),
            VerifierError::Decode(msg) => PortalError::InvalidSession(msg),
        }
    }

    /// Map for account operations, where a rejection is passed through verbatim.
    pub(crate) fn into_rejection(self) -> PortalError {
        match self {
            VerifierError::Rejected { message, .. } => PortalError::Rejected(message),
            VerifierError::Transport(msg) => PortalError::Network(msg),
            VerifierError::Decode(msg) => PortalError::Rejected(msg),
        }
    }
}
