//! Authentication service: login, token rotation and account self-service.

use chrono::{Duration, Utc};
use clinic_core::auth::AuthError;
use clinic_core::auth::jwt::generate_access_token;
use clinic_core::auth::password::{hash_password, validate_new_password, verify_password};
use clinic_core::models::{ProfileUpdate, Role, User};
use tracing::{info, warn};

use super::tokens::generate_refresh_token;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{LogoutResponse, MessageResponse, TokenResponse};

/// Issue an access token plus a stored refresh token for `user`.
fn issue_token_pair(state: &AppState, user: User) -> AppResult<TokenResponse> {
    let ttl = state.config.access_token_ttl_secs;
    let access = generate_access_token(&user, ttl, state.config.jwt_secret.as_bytes())?;

    let refresh_token = generate_refresh_token();
    let refresh_expires = Utc::now() + Duration::days(state.config.refresh_token_ttl_days);
    state
        .refresh_tokens
        .store(&refresh_token, &user.id, refresh_expires);

    Ok(TokenResponse {
        access_token: access.token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: ttl,
        expires_at: access.expires_at,
        user,
    })
}

/// Authenticate with email + password, optionally pinned to a role.
pub fn login(
    state: &AppState,
    email: &str,
    password: &str,
    role: Option<Role>,
) -> AppResult<TokenResponse> {
    let record = state
        .directory
        .find_by_email(email)
        .ok_or(AuthError::CredentialError)?;

    if !verify_password(password, &record.password_hash)? {
        return Err(AuthError::CredentialError.into());
    }

    if let Some(role) = role
        && role != record.user.role
    {
        return Err(AppError::Unauthorized(format!(
            "This account is not registered as {role}"
        )));
    }

    if !record.user.is_active {
        return Err(AppError::Forbidden("Account is disabled".into()));
    }

    info!(user_id = %record.user.id, role = %record.user.role, "login succeeded");
    issue_token_pair(state, record.user)
}

/// Exchange a refresh token for a new pair (single-use rotation).
pub fn refresh(state: &AppState, refresh_token: &str) -> AppResult<TokenResponse> {
    let user_id = state
        .refresh_tokens
        .take_valid(refresh_token)
        .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".into()))?;

    let user = state
        .directory
        .get(&user_id)
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;

    if !user.is_active {
        state.refresh_tokens.revoke_all(&user.id);
        return Err(AppError::Forbidden("Account is disabled".into()));
    }

    issue_token_pair(state, user)
}

/// Revoke the presented refresh token, if any.
pub fn logout(state: &AppState, refresh_token: Option<&str>) -> LogoutResponse {
    if let Some(token) = refresh_token {
        state.refresh_tokens.revoke(token);
    }
    LogoutResponse { success: true }
}

/// Apply a profile update and return the fields the server accepted.
pub fn update_profile(
    state: &AppState,
    user: &User,
    update: ProfileUpdate,
) -> AppResult<ProfileUpdate> {
    if update.is_empty() {
        return Err(AppError::Validation("No profile fields to update".into()));
    }
    if !user.role.is_staff() && (update.specialty.is_some() || update.license_number.is_some()) {
        return Err(AppError::Validation(
            "Only staff accounts have a specialty or license number".into(),
        ));
    }
    if let Some(name) = &update.name
        && name.trim().is_empty()
    {
        return Err(AppError::Validation("Name must not be empty".into()));
    }

    state
        .directory
        .update_profile(&user.id, &update)
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    info!(user_id = %user.id, "profile updated");
    Ok(update)
}

/// Check a second-factor code against the one enrolled on the account.
pub fn verify_two_factor(state: &AppState, user: &User, code: &str) -> AppResult<MessageResponse> {
    let code = code.trim();
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation("Verification code must be 6 digits".into()));
    }

    let record = state
        .directory
        .get_record(&user.id)
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    match record.two_factor_code.as_deref() {
        None => Err(AppError::Validation(
            "Two-factor authentication is not enabled for this account".into(),
        )),
        Some(expected) if codes_match(expected, code) => Ok(MessageResponse {
            success: true,
            message: "Verification successful".into(),
        }),
        Some(_) => {
            warn!(user_id = %user.id, "two-factor verification failed");
            Err(AppError::Unauthorized("Invalid verification code".into()))
        }
    }
}

/// Compare two codes without short-circuiting on the first differing byte.
fn codes_match(expected: &str, given: &str) -> bool {
    let (a, b) = (expected.as_bytes(), given.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Start a password reset. Answers the same whether or not the account exists.
pub fn reset_password(state: &AppState, email: &str) -> AppResult<MessageResponse> {
    let email = email.trim();
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed {
        return Err(AppError::Validation("Invalid email address".into()));
    }

    if let Some(record) = state.directory.find_by_email(email) {
        info!(user_id = %record.user.id, "password reset requested");
    }

    Ok(MessageResponse {
        success: true,
        message: "If an account exists for this email, reset instructions have been sent".into(),
    })
}

/// Change the caller's password after checking the current one.
pub fn change_password(
    state: &AppState,
    user: &User,
    current_password: &str,
    new_password: &str,
) -> AppResult<MessageResponse> {
    let record = state
        .directory
        .get_record(&user.id)
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if !verify_password(current_password, &record.password_hash)? {
        return Err(AppError::Validation("Current password is incorrect".into()));
    }
    validate_new_password(new_password)?;
    if current_password == new_password {
        return Err(AppError::Validation(
            "New password must differ from the current password".into(),
        ));
    }

    let hash = hash_password(new_password)?;
    state.directory.set_password_hash(&user.id, hash);

    info!(user_id = %user.id, "password changed");
    Ok(MessageResponse {
        success: true,
        message: "Password updated".into(),
    })
}
