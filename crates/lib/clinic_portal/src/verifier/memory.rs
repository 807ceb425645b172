//! In-memory credential exchange.
//!
//! Behaves like the clinic API for a handful of registered accounts: issues
//! opaque tokens, rotates refresh tokens single-use, and rejects with the
//! same messages. Knobs let tests take it offline or make it return a
//! malformed session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use clinic_core::auth::AuthError;
use clinic_core::auth::password::validate_new_password;
use clinic_core::models::{AuthResponse, Preferences, ProfileUpdate, Role, User};
use clinic_core::permissions::permission_set;
use uuid::Uuid;

use super::{CredentialVerifier, LoginRequest};
use crate::error::VerifierError;

struct Account {
    user: User,
    password: String,
    two_factor_code: Option<String>,
}

#[derive(Default)]
struct State {
    /// Keyed by lowercase email.
    accounts: HashMap<String, Account>,
    /// Access token -> (email, expiry).
    access: HashMap<String, (String, DateTime<Utc>)>,
    /// Refresh token -> email.
    refresh: HashMap<String, String>,
}

pub struct InMemoryVerifier {
    state: Mutex<State>,
    session_ttl: Mutex<Duration>,
    offline: AtomicBool,
    malformed: AtomicBool,
    login_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl Default for InMemoryVerifier {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            session_ttl: Mutex::new(Duration::minutes(60)),
            offline: AtomicBool::new(false),
            malformed: AtomicBool::new(false),
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        }
    }
}

fn rejected(status: u16, message: impl Into<String>) -> VerifierError {
    VerifierError::Rejected {
        status,
        message: message.into(),
    }
}

impl InMemoryVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`add_account`](Self::add_account).
    pub fn with_account(self, email: &str, password: &str, role: Role) -> Self {
        self.add_account(email, password, role);
        self
    }

    /// Register an account; permissions are derived from `role`.
    pub fn add_account(&self, email: &str, password: &str, role: Role) -> User {
        let email = email.trim().to_lowercase();
        let local = email.split('@').next().unwrap_or_default();
        let user = User {
            id: format!("{role}-{}", Uuid::new_v4().simple()),
            email: email.clone(),
            name: local.to_string(),
            role,
            permissions: permission_set(role),
            is_active: true,
            phone: None,
            specialty: None,
            license_number: None,
            patient_id: None,
            preferences: Preferences::default(),
        };
        self.lock().accounts.insert(
            email,
            Account {
                user: user.clone(),
                password: password.to_string(),
                two_factor_code: None,
            },
        );
        user
    }

    pub fn enroll_two_factor(&self, email: &str, code: &str) {
        if let Some(account) = self.lock().accounts.get_mut(&email.to_lowercase()) {
            account.two_factor_code = Some(code.to_string());
        }
    }

    pub fn set_active(&self, email: &str, active: bool) {
        if let Some(account) = self.lock().accounts.get_mut(&email.to_lowercase()) {
            account.user.is_active = active;
        }
    }

    /// Lifetime of sessions issued from now on.
    pub fn set_session_ttl(&self, ttl: Duration) {
        *self.session_ttl.lock().unwrap_or_else(PoisonError::into_inner) = ttl;
    }

    /// Fail every call with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Answer login/refresh with a session missing its identity.
    pub fn set_malformed_responses(&self, malformed: bool) {
        self.malformed.store(malformed, Ordering::SeqCst);
    }

    /// Invalidate every outstanding refresh token.
    pub fn revoke_refresh_tokens(&self) {
        self.lock().refresh.clear();
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    /// Current stored identity for `email`, if registered.
    pub fn account(&self, email: &str) -> Option<User> {
        self.lock()
            .accounts
            .get(&email.to_lowercase())
            .map(|a| a.user.clone())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_online(&self) -> Result<(), VerifierError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(VerifierError::Transport("connection refused".into()));
        }
        Ok(())
    }

    fn issue(&self, state: &mut State, email: &str) -> Result<AuthResponse, VerifierError> {
        let account = state
            .accounts
            .get(email)
            .ok_or_else(|| rejected(401, "User not found"))?;
        let ttl = *self.session_ttl.lock().unwrap_or_else(PoisonError::into_inner);
        let expires_at = Utc::now() + ttl;
        let user = serde_json::to_value(&account.user)
            .map_err(|e| VerifierError::Decode(e.to_string()))?;

        let access_token = Uuid::new_v4().to_string();
        let refresh_token = Uuid::new_v4().to_string();
        state
            .access
            .insert(access_token.clone(), (email.to_string(), expires_at));
        state.refresh.insert(refresh_token.clone(), email.to_string());

        let malformed = self.malformed.load(Ordering::SeqCst);
        Ok(AuthResponse {
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            token_type: Some("Bearer".into()),
            expires_at: Some(expires_at),
            expires_in: Some(ttl.num_seconds()),
            user: (!malformed).then_some(user),
        })
    }

    /// Resolve a bearer token to the account email.
    fn authorize(state: &State, access_token: &str) -> Result<String, VerifierError> {
        match state.access.get(access_token) {
            Some((email, expires_at)) if Utc::now() < *expires_at => Ok(email.clone()),
            _ => Err(rejected(401, "Invalid or expired token")),
        }
    }
}

#[async_trait]
impl CredentialVerifier for InMemoryVerifier {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, VerifierError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;

        let email = request.email.trim().to_lowercase();
        let mut state = self.lock();
        let account = state
            .accounts
            .get(&email)
            .filter(|a| a.password == request.password)
            .ok_or_else(|| rejected(401, "Invalid credentials"))?;

        if let Some(role) = request.role
            && role != account.user.role
        {
            return Err(rejected(
                401,
                format!("This account is not registered as {role}"),
            ));
        }
        if !account.user.is_active {
            return Err(rejected(403, "Account is disabled"));
        }

        self.issue(&mut state, &email)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, VerifierError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;

        let mut state = self.lock();
        let email = state
            .refresh
            .remove(refresh_token)
            .ok_or_else(|| rejected(401, "Invalid refresh token"))?;
        self.issue(&mut state, &email)
    }

    async fn logout(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), VerifierError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;

        let mut state = self.lock();
        state.access.remove(access_token);
        if let Some(token) = refresh_token {
            state.refresh.remove(token);
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        access_token: &str,
        update: &ProfileUpdate,
    ) -> Result<ProfileUpdate, VerifierError> {
        self.ensure_online()?;
        if update.is_empty() {
            return Err(rejected(400, "No profile fields to update"));
        }

        let mut state = self.lock();
        let email = Self::authorize(&state, access_token)?;
        let account = state
            .accounts
            .get_mut(&email)
            .ok_or_else(|| rejected(404, "User not found"))?;
        if !account.user.role.is_staff()
            && (update.specialty.is_some() || update.license_number.is_some())
        {
            return Err(rejected(
                400,
                "Only staff accounts have a specialty or license number",
            ));
        }
        account.user.apply_update(update);
        Ok(update.clone())
    }

    async fn verify_two_factor(
        &self,
        access_token: &str,
        code: &str,
    ) -> Result<(), VerifierError> {
        self.ensure_online()?;
        let state = self.lock();
        let email = Self::authorize(&state, access_token)?;
        let expected = state
            .accounts
            .get(&email)
            .and_then(|a| a.two_factor_code.as_deref());
        match expected {
            None => Err(rejected(
                400,
                "Two-factor authentication is not enabled for this account",
            )),
            Some(expected) if expected == code.trim() => Ok(()),
            Some(_) => Err(rejected(401, "Invalid verification code")),
        }
    }

    async fn reset_password(&self, email: &str) -> Result<(), VerifierError> {
        self.ensure_online()?;
        if !email.contains('@') {
            return Err(rejected(400, "Invalid email address"));
        }
        Ok(())
    }

    async fn change_password(
        &self,
        access_token: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), VerifierError> {
        self.ensure_online()?;
        let mut state = self.lock();
        let email = Self::authorize(&state, access_token)?;
        let account = state
            .accounts
            .get_mut(&email)
            .ok_or_else(|| rejected(404, "User not found"))?;
        if account.password != current_password {
            return Err(rejected(400, "Current password is incorrect"));
        }
        validate_new_password(new_password).map_err(|e| match e {
            AuthError::ValidationError(msg) => rejected(400, msg),
            other => rejected(400, other.to_string()),
        })?;
        account.password = new_password.to_string();
        Ok(())
    }
}
