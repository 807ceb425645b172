//! # clinic_portal
//!
//! Client-side session management for the clinic portal.
//!
//! - [`store::SessionStore`] holds the logged-in identity and its tokens,
//!   persists them across restarts, and answers permission queries.
//! - [`scheduler::RefreshScheduler`] renews the session before it expires.
//! - [`guard::AccessGuard`] decides whether a protected view may render.
//! - [`verifier::CredentialVerifier`] is the seam to the authentication
//!   server, with a remote and an in-memory implementation.

pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod verifier;

pub use config::PortalConfig;
pub use error::{PortalError, PortalResult, VerifierError};
pub use events::{ListenerId, SessionEvent, SessionListener};
pub use guard::{AccessGuard, NavigationDecision, RedirectState};
pub use scheduler::{DEFAULT_REFRESH_LEAD, RefreshScheduler};
pub use storage::{FileStorage, MemoryStorage, SESSION_STORAGE_KEY, SessionStorage};
pub use store::SessionStore;
pub use verifier::{CredentialVerifier, InMemoryVerifier, LoginRequest, RemoteVerifier};
