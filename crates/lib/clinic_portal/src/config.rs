//! Portal client configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::scheduler::DEFAULT_REFRESH_LEAD;

/// Configuration for a portal client.
#[derive(Clone, Debug)]
pub struct PortalConfig {
    /// Base URL of the clinic API (e.g. "http://127.0.0.1:3100").
    pub api_base_url: String,
    /// Directory holding the persisted session.
    pub session_dir: PathBuf,
    /// How long before expiry the scheduler renews a session.
    pub refresh_lead: Duration,
    /// Where unauthenticated navigation is sent.
    pub login_path: String,
    /// Where authenticated users without the required role are sent.
    pub landing_path: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:3100".into(),
            session_dir: default_session_dir(),
            refresh_lead: DEFAULT_REFRESH_LEAD,
            login_path: "/login".into(),
            landing_path: "/dashboard".into(),
        }
    }
}

impl PortalConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable             | Default                   |
    /// |----------------------|---------------------------|
    /// | `CLINIC_API_URL`     | `http://127.0.0.1:3100`   |
    /// | `CLINIC_SESSION_DIR` | `<data dir>/clinic`       |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base_url: std::env::var("CLINIC_API_URL").unwrap_or(defaults.api_base_url),
            session_dir: std::env::var("CLINIC_SESSION_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_dir),
            ..defaults
        }
    }
}

fn default_session_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("clinic")
}
