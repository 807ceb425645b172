//! API server configuration.

use clinic_core::auth::jwt::{DEFAULT_ACCESS_TOKEN_TTL_SECS, resolve_jwt_secret};

/// Default refresh token lifetime: 30 days.
pub const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 30;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Access token lifetime in seconds.
    pub access_token_ttl_secs: i64,
    /// Refresh token lifetime in days.
    pub refresh_token_ttl_days: i64,
    /// Seed one demo account per role at start-up.
    pub seed_demo_accounts: bool,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                 | Default                          |
    /// |--------------------------|----------------------------------|
    /// | `BIND_ADDR`              | `127.0.0.1:3100`                 |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file |
    /// | `ACCESS_TOKEN_TTL_SECS`  | `900`                            |
    /// | `REFRESH_TOKEN_TTL_DAYS` | `30`                             |
    /// | `SEED_DEMO_ACCOUNTS`     | `true`                           |
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            jwt_secret: resolve_jwt_secret(),
            access_token_ttl_secs: env_parse("ACCESS_TOKEN_TTL_SECS")
                .unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_SECS),
            refresh_token_ttl_days: env_parse("REFRESH_TOKEN_TTL_DAYS")
                .unwrap_or(DEFAULT_REFRESH_TOKEN_TTL_DAYS),
            seed_demo_accounts: env_parse("SEED_DEMO_ACCOUNTS").unwrap_or(true),
        }
    }

    /// Config with a fixed secret and default lifetimes.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".into(),
            jwt_secret: jwt_secret.into(),
            access_token_ttl_secs: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh_token_ttl_days: DEFAULT_REFRESH_TOKEN_TTL_DAYS,
            seed_demo_accounts: false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
