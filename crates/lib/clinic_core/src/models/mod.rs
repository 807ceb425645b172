//! Domain models shared by the portal client and the API server.

pub mod auth;
pub mod role;

pub use auth::{
    AuthResponse, NotificationPreferences, PersistedSession, Preferences, PreferencesUpdate,
    ProfileUpdate, Session, SessionError, Theme, TokenClaims, User,
};
pub use role::Role;
