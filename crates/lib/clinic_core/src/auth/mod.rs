//! Server-side credential primitives.
//!
//! Password hashing and access-token signing used by the API server. The
//! portal client never signs or verifies tokens; it treats them as opaque.

pub mod jwt;
pub mod password;

use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    CredentialError,

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
