//! The credential exchange capability.
//!
//! The store never talks HTTP itself; it asks a [`CredentialVerifier`].
//! [`remote::RemoteVerifier`] speaks to the clinic API, while
//! [`memory::InMemoryVerifier`] is a self-contained fixture with the same
//! contract.

pub mod memory;
pub mod remote;

use async_trait::async_trait;
use clinic_core::models::{AuthResponse, ProfileUpdate, Role};
use serde::{Deserialize, Serialize};

use crate::error::VerifierError;

pub use memory::InMemoryVerifier;
pub use remote::RemoteVerifier;

/// Credentials presented at login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Exchange credentials for a session.
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, VerifierError>;

    /// Exchange a refresh token for a new session.
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, VerifierError>;

    /// Tell the server a session is over.
    async fn logout(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), VerifierError>;

    /// Returns the fields the server accepted.
    async fn update_profile(
        &self,
        access_token: &str,
        update: &ProfileUpdate,
    ) -> Result<ProfileUpdate, VerifierError>;

    async fn verify_two_factor(&self, access_token: &str, code: &str)
    -> Result<(), VerifierError>;

    async fn reset_password(&self, email: &str) -> Result<(), VerifierError>;

    async fn change_password(
        &self,
        access_token: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), VerifierError>;
}
