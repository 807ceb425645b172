//! JWT token generation and verification.

use std::path::PathBuf;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::info;

use super::AuthError;
use crate::models::{TokenClaims, User};

/// Default access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;

/// A signed access token and the instant it stops being valid.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Generate a signed JWT access token (HS256) for `user`.
pub fn generate_access_token(
    user: &User,
    ttl_secs: i64,
    secret: &[u8],
) -> Result<IssuedToken, AuthError> {
    let now = Utc::now();
    let exp = (now + Duration::seconds(ttl_secs)).timestamp();
    let claims = TokenClaims {
        sub: user.id.clone(),
        email: user.email.clone(),
        role: user.role,
        exp,
        iat: now.timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))?;

    let expires_at = Utc
        .timestamp_opt(exp, 0)
        .single()
        .ok_or_else(|| AuthError::Internal("token expiry out of range".into()))?;

    Ok(IssuedToken { token, expires_at })
}

/// Verify a JWT access token, returning the claims on success.
pub fn verify_access_token(token: &str, secret: &[u8]) -> Option<TokenClaims> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.leeway = 0;
    decode::<TokenClaims>(token, &key, &validation)
        .ok()
        .map(|data| data.claims)
}

/// Resolve the JWT secret: env var `JWT_SECRET` → `AUTH_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    if let Ok(secret) = std::env::var("JWT_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(secret) = std::env::var("AUTH_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = jwt_secret_path();
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&secret_path, &secret);
    info!(path = %secret_path.display(), "generated new JWT secret");
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("clinic")
        .join("jwt-secret")
}
