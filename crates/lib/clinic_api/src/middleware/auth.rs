//! Authentication middleware: Bearer token extraction and identity lookup.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use clinic_core::auth::jwt::verify_access_token;
use clinic_core::models::User;

use crate::AppState;
use crate::error::AppError;

/// Identity attached to request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Axum middleware: extracts `Authorization: Bearer <token>`, verifies the JWT,
/// loads the account and injects `AuthenticatedUser` into request extensions.
///
/// Handlers behind this layer never re-derive the caller's identity.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))?;

    let claims = verify_access_token(token, state.config.jwt_secret.as_bytes())
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".into()))?;

    let user = state
        .directory
        .get(&claims.sub)
        .ok_or_else(|| AppError::Unauthorized("Unknown account".into()))?;

    if !user.is_active {
        return Err(AppError::Forbidden("Account is disabled".into()));
    }

    request.extensions_mut().insert(AuthenticatedUser(user));

    Ok(next.run(request).await)
}
