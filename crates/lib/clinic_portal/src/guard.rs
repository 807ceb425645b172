//! Navigation gating for protected views.

use chrono::{DateTime, Utc};
use clinic_core::models::Role;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PortalConfig;
use crate::error::PortalResult;
use crate::store::SessionStore;

/// Navigation state carried to the login view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectState {
    /// The path originally requested.
    pub from: String,
}

/// Outcome of one navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    Render,
    /// Not authenticated: go log in, then come back to `state.from`.
    RedirectToLogin { to: String, state: RedirectState },
    /// Authenticated but lacking the required role.
    RedirectToLanding { to: String },
}

#[derive(Debug, Clone)]
pub struct AccessGuard {
    login_path: String,
    landing_path: String,
}

impl AccessGuard {
    pub fn new(login_path: impl Into<String>, landing_path: impl Into<String>) -> Self {
        Self {
            login_path: login_path.into(),
            landing_path: landing_path.into(),
        }
    }

    pub fn from_config(config: &PortalConfig) -> Self {
        Self::new(&config.login_path, &config.landing_path)
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn landing_path(&self) -> &str {
        &self.landing_path
    }

    pub fn check(
        &self,
        store: &SessionStore,
        path: &str,
        required_role: Option<Role>,
    ) -> NavigationDecision {
        self.check_at(store, path, required_role, Utc::now())
    }

    /// Decide whether `path` may render for the store's session at `now`.
    ///
    /// Role matching is strict equality; admin does not satisfy other roles.
    pub fn check_at(
        &self,
        store: &SessionStore,
        path: &str,
        required_role: Option<Role>,
        now: DateTime<Utc>,
    ) -> NavigationDecision {
        let Some(session) = store.session().filter(|s| s.is_valid_at(now)) else {
            debug!(path, "unauthenticated navigation, redirecting to login");
            return NavigationDecision::RedirectToLogin {
                to: self.login_path.clone(),
                state: RedirectState {
                    from: path.to_string(),
                },
            };
        };

        match required_role {
            Some(role) if session.user.role != role => {
                debug!(
                    path,
                    required = %role,
                    actual = %session.user.role,
                    "role mismatch, redirecting to landing"
                );
                NavigationDecision::RedirectToLanding {
                    to: self.landing_path.clone(),
                }
            }
            _ => NavigationDecision::Render,
        }
    }

    /// Where to go once logged in: the remembered destination when it is a
    /// local path, the landing view otherwise.
    pub fn destination_after_login(&self, state: Option<&RedirectState>) -> String {
        state
            .map(|s| s.from.as_str())
            .filter(|from| from.starts_with('/') && !from.starts_with("//"))
            .filter(|from| *from != self.login_path)
            .unwrap_or(self.landing_path.as_str())
            .to_string()
    }

    /// Log in, then resolve the post-login destination.
    pub async fn login_and_continue(
        &self,
        store: &SessionStore,
        email: &str,
        password: &str,
        role: Option<Role>,
        state: Option<&RedirectState>,
    ) -> PortalResult<String> {
        store.login(email, password, role).await?;
        Ok(self.destination_after_login(state))
    }
}
