//! Authentication request handlers.

use axum::extract::State;
use axum::{Extension, Json};
use clinic_core::models::ProfileUpdate;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    ChangePasswordRequest, LoginRequest, LogoutRequest, LogoutResponse, MessageResponse,
    RefreshRequest, ResetPasswordRequest, TokenResponse, VerifyTwoFactorRequest,
};
use crate::services::auth;

/// `POST /api/auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let resp = auth::login(&state, &body.email, &body.password, body.role)?;
    Ok(Json(resp))
}

/// `POST /api/auth/refresh`: exchange a refresh token for a new token pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let resp = auth::refresh(&state, &body.refresh_token)?;
    Ok(Json(resp))
}

/// `POST /api/auth/logout`: revoke a refresh token.
///
/// The refresh token authenticates itself, so an expired access token does
/// not stop a client from revoking it.
pub async fn logout_handler(
    State(state): State<AppState>,
    Json(body): Json<LogoutRequest>,
) -> AppResult<Json<LogoutResponse>> {
    Ok(Json(auth::logout(&state, body.refresh_token.as_deref())))
}

/// `PATCH /api/auth/profile`: update the caller's profile fields.
pub async fn update_profile_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Json(body): Json<ProfileUpdate>,
) -> AppResult<Json<ProfileUpdate>> {
    let confirmed = auth::update_profile(&state, &user, body)?;
    Ok(Json(confirmed))
}

/// `POST /api/auth/verify-2fa`: check a second-factor code.
pub async fn verify_two_factor_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Json(body): Json<VerifyTwoFactorRequest>,
) -> AppResult<Json<MessageResponse>> {
    let resp = auth::verify_two_factor(&state, &user, &body.code)?;
    Ok(Json(resp))
}

/// `POST /api/auth/reset-password`: request a password reset.
pub async fn reset_password_handler(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let resp = auth::reset_password(&state, &body.email)?;
    Ok(Json(resp))
}

/// `POST /api/auth/change-password`: change the caller's password.
pub async fn change_password_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Json(body): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let resp = auth::change_password(&state, &user, &body.current_password, &body.new_password)?;
    Ok(Json(resp))
}
