//! # clinic_core
//!
//! Core domain logic for the clinic portal.
//!
//! Holds the identity and session models, the role → permission table, and
//! the credential primitives used by the API server. The portal client and
//! the server both evaluate authorization through [`permissions`], so the
//! two sides can never disagree about what a role grants.

pub mod auth;
pub mod models;
pub mod permissions;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
