//! The credential/session store.
//!
//! Single source of truth for who is logged in. State changes are applied
//! under one write lock, so readers see either the old session or the new
//! one, never a mix. Network calls happen with no lock held.
//!
//! Concurrent `login`/`refresh`/`logout` calls are not serialized: whichever
//! completes last sets the visible state. A logout racing an in-flight
//! refresh is overwritten if the refresh lands afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use clinic_core::models::{AuthResponse, PersistedSession, ProfileUpdate, Role, Session, User};
use clinic_core::permissions;
use tracing::{debug, info, warn};

use crate::error::{PortalError, PortalResult, VerifierError};
use crate::events::{ListenerId, SessionEvent, SessionListener};
use crate::storage::{SESSION_STORAGE_KEY, SessionStorage};
use crate::verifier::{CredentialVerifier, LoginRequest};

#[derive(Debug, Default)]
struct StoreState {
    session: Option<Session>,
    last_login: Option<DateTime<Utc>>,
    /// Transient; never persisted.
    loading: bool,
    /// Transient; never persisted.
    last_error: Option<String>,
}

type Listeners = Vec<(ListenerId, Arc<dyn SessionListener>)>;

pub struct SessionStore {
    state: RwLock<StoreState>,
    verifier: Arc<dyn CredentialVerifier>,
    storage: Arc<dyn SessionStorage>,
    listeners: Mutex<Listeners>,
    next_listener_id: AtomicU64,
}

fn into_session(resp: AuthResponse) -> PortalResult<Session> {
    Session::from_auth_response(resp, Utc::now())
        .map_err(|e| PortalError::InvalidSession(e.to_string()))
}

impl SessionStore {
    /// Create an empty store. Call [`restore`](Self::restore) to pick up a
    /// session persisted by a previous run.
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        storage: Arc<dyn SessionStorage>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::default(),
            verifier,
            storage,
            listeners: Mutex::default(),
            next_listener_id: AtomicU64::new(1),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Exchange credentials for a session.
    ///
    /// On failure the previous session, if any, is left untouched.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        role: Option<Role>,
    ) -> PortalResult<Session> {
        self.begin();
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
            role,
        };
        let result = self
            .verifier
            .login(&request)
            .await
            .map_err(VerifierError::into_auth_error)
            .and_then(into_session);

        let session = match result {
            Ok(session) => session,
            Err(e) => {
                debug!(error = %e, "login failed");
                return self.finish(Err(e));
            }
        };

        {
            let mut state = self.write();
            state.session = Some(session.clone());
            state.last_login = Some(Utc::now());
            state.loading = false;
            state.last_error = None;
        }
        self.persist();
        info!(user_id = %session.user.id, role = %session.user.role, "logged in");
        self.notify(SessionEvent::LoggedIn);
        Ok(session)
    }

    /// End the session.
    ///
    /// Local state is cleared and listeners notified before the server is
    /// told; a failed server notification is logged and otherwise ignored.
    pub async fn logout(&self) {
        let outgoing = {
            let mut state = self.write();
            state.loading = false;
            state.last_error = None;
            state.last_login = None;
            state.session.take()
        };
        self.persist();
        self.notify(SessionEvent::LoggedOut);

        let Some(outgoing) = outgoing else {
            return;
        };
        info!(user_id = %outgoing.user.id, "logged out");
        if let Err(e) = self
            .verifier
            .logout(&outgoing.access_token, outgoing.refresh_token.as_deref())
            .await
        {
            warn!(error = %e, "server logout notification failed");
        }
    }

    /// Exchange the refresh token for a new session.
    ///
    /// Any failure ends the session.
    pub async fn refresh(&self) -> PortalResult<Session> {
        let refresh_token = self
            .read()
            .session
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
            .ok_or(PortalError::NoRefreshToken)?;

        self.begin();
        let result = self
            .verifier
            .refresh(&refresh_token)
            .await
            .map_err(VerifierError::into_auth_error)
            .and_then(into_session);

        match result {
            Ok(session) => {
                {
                    let mut state = self.write();
                    state.session = Some(session.clone());
                    state.loading = false;
                    state.last_error = None;
                }
                self.persist();
                debug!(expires_at = %session.expires_at, "session refreshed");
                self.notify(SessionEvent::Refreshed);
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "session refresh failed, logging out");
                self.logout().await;
                Err(e)
            }
        }
    }

    /// Send a partial profile update and merge what the server confirmed.
    pub async fn update_profile(&self, update: ProfileUpdate) -> PortalResult<User> {
        let token = self.valid_token()?;
        self.begin();
        let confirmed = match self.verifier.update_profile(&token, &update).await {
            Ok(confirmed) => confirmed,
            Err(e) => return self.finish(Err(e.into_rejection())),
        };

        let user = {
            let mut state = self.write();
            state.loading = false;
            state.last_error = None;
            let Some(session) = state.session.as_mut() else {
                return Err(PortalError::NotAuthenticated);
            };
            session.user.apply_update(&confirmed);
            session.user.clone()
        };
        self.persist();
        self.notify(SessionEvent::ProfileUpdated);
        Ok(user)
    }

    pub async fn verify_two_factor(&self, code: &str) -> PortalResult<()> {
        let token = self.valid_token()?;
        self.begin();
        let result = self
            .verifier
            .verify_two_factor(&token, code)
            .await
            .map_err(VerifierError::into_rejection);
        self.finish(result)
    }

    /// Request a password reset email. Needs no session.
    pub async fn reset_password(&self, email: &str) -> PortalResult<()> {
        self.begin();
        let result = self
            .verifier
            .reset_password(email)
            .await
            .map_err(VerifierError::into_rejection);
        self.finish(result)
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> PortalResult<()> {
        let token = self.valid_token()?;
        self.begin();
        let result = self
            .verifier
            .change_password(&token, current_password, new_password)
            .await
            .map_err(VerifierError::into_rejection);
        self.finish(result)
    }

    /// Load the session persisted by a previous run.
    ///
    /// An unreadable entry is discarded and treated as "no session".
    pub async fn restore(&self) -> PortalResult<Option<Session>> {
        let raw = self
            .storage
            .load(SESSION_STORAGE_KEY)
            .map_err(|e| PortalError::Storage(e.to_string()))?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let parsed = serde_json::from_str::<PersistedSession>(&raw)
            .map_err(|e| e.to_string())
            .and_then(|p| Session::from_persisted(p).map_err(|e| e.to_string()));
        let (session, last_login) = match parsed {
            Ok(restored) => restored,
            Err(reason) => {
                warn!(%reason, "discarding unreadable persisted session");
                if let Err(e) = self.storage.remove(SESSION_STORAGE_KEY) {
                    warn!(error = %e, "failed to remove persisted session");
                }
                return Ok(None);
            }
        };

        {
            let mut state = self.write();
            state.session = Some(session.clone());
            state.last_login = last_login;
        }
        debug!(
            user_id = %session.user.id,
            valid = session.is_valid(),
            "session restored"
        );
        self.notify(SessionEvent::Restored);
        Ok(Some(session))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// True iff a session exists and has not yet expired.
    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated_at(Utc::now())
    }

    pub fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        self.read()
            .session
            .as_ref()
            .is_some_and(|s| s.is_valid_at(now))
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.read()
            .session
            .as_ref()
            .is_some_and(|s| permissions::has_permission(&s.user, permission))
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.read()
            .session
            .as_ref()
            .is_some_and(|s| s.user.role == role)
    }

    /// Current access token, if a session exists.
    pub fn token(&self) -> Option<String> {
        self.read().session.as_ref().map(|s| s.access_token.clone())
    }

    pub fn user(&self) -> Option<User> {
        self.read().session.as_ref().map(|s| s.user.clone())
    }

    pub fn session(&self) -> Option<Session> {
        self.read().session.clone()
    }

    pub fn last_login(&self) -> Option<DateTime<Utc>> {
        self.read().last_login
    }

    pub fn is_loading(&self) -> bool {
        self.read().loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.read().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.write().last_error = None;
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    pub fn subscribe(&self, listener: Arc<dyn SessionListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn valid_token(&self) -> PortalResult<String> {
        let state = self.read();
        state
            .session
            .as_ref()
            .filter(|s| s.is_valid())
            .map(|s| s.access_token.clone())
            .ok_or(PortalError::NotAuthenticated)
    }

    fn begin(&self) {
        let mut state = self.write();
        state.loading = true;
        state.last_error = None;
    }

    fn finish<T>(&self, result: PortalResult<T>) -> PortalResult<T> {
        let mut state = self.write();
        state.loading = false;
        state.last_error = result.as_ref().err().map(ToString::to_string);
        result
    }

    /// Write the current session to storage, or remove it when logged out.
    fn persist(&self) {
        let persisted = {
            let state = self.read();
            state
                .session
                .as_ref()
                .map(|s| s.to_persisted(state.last_login))
        };
        let result = match persisted {
            Some(p) => match serde_json::to_string(&p) {
                Ok(json) => self.storage.save(SESSION_STORAGE_KEY, &json),
                Err(e) => {
                    warn!(error = %e, "failed to serialize session");
                    return;
                }
            },
            None => self.storage.remove(SESSION_STORAGE_KEY),
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to persist session");
        }
    }

    /// Deliver `event` to every listener with no lock held.
    fn notify(&self, event: SessionEvent) {
        let session = self.session();
        let listeners: Vec<Arc<dyn SessionListener>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener.session_changed(event, session.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::verifier::InMemoryVerifier;
    use chrono::Duration;
    use clinic_core::permissions::{
        PRESCRIBE_MEDICATION, VIEW_OWN_RECORDS, get_permissions_for_role,
    };

    const PASSWORD: &str = "correct-horse";

    struct Fixture {
        verifier: Arc<InMemoryVerifier>,
        storage: Arc<MemoryStorage>,
        store: Arc<SessionStore>,
    }

    fn fixture() -> Fixture {
        let verifier = Arc::new(
            InMemoryVerifier::new()
                .with_account("patient@example.com", PASSWORD, Role::Patient)
                .with_account("doctor@example.com", PASSWORD, Role::Doctor),
        );
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(verifier.clone(), storage.clone());
        Fixture {
            verifier,
            storage,
            store,
        }
    }

    fn recorder(store: &SessionStore) -> Arc<Mutex<Vec<SessionEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        store.subscribe(Arc::new(move |event: SessionEvent, _: Option<&Session>| {
            sink.lock().unwrap().push(event);
        }));
        events
    }

    #[tokio::test]
    async fn login_role_and_permissions_follow_table() {
        let f = fixture();
        let session = f
            .store
            .login("patient@example.com", PASSWORD, None)
            .await
            .unwrap();

        assert_eq!(session.user.role, Role::Patient);
        assert!(f.store.is_authenticated());
        assert!(f.store.has_role(Role::Patient));
        assert!(!f.store.has_role(Role::Doctor));
        for p in get_permissions_for_role("patient").unwrap() {
            assert!(f.store.has_permission(&p));
        }
        assert!(!f.store.has_permission(PRESCRIBE_MEDICATION));
        assert_eq!(f.store.token(), Some(session.access_token));
        assert!(f.store.last_login().is_some());
        assert!(!f.store.is_loading());
    }

    #[tokio::test]
    async fn failed_login_keeps_previous_session() {
        let f = fixture();
        let before = f
            .store
            .login("patient@example.com", PASSWORD, None)
            .await
            .unwrap();

        let err = f
            .store
            .login("doctor@example.com", "wrong", None)
            .await
            .unwrap_err();
        assert_eq!(err, PortalError::Authentication("Invalid credentials".into()));
        assert_eq!(f.store.session(), Some(before));
        assert_eq!(f.store.last_error().as_deref(), Some("Invalid credentials"));
    }

    #[tokio::test]
    async fn login_with_mismatched_role_is_rejected() {
        let f = fixture();
        let err = f
            .store
            .login("patient@example.com", PASSWORD, Some(Role::Doctor))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PortalError::Authentication("This account is not registered as doctor".into())
        );
        assert!(!f.store.is_authenticated());
    }

    #[tokio::test]
    async fn malformed_login_response_is_invalid_session() {
        let f = fixture();
        f.verifier.set_malformed_responses(true);
        let err = f
            .store
            .login("patient@example.com", PASSWORD, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::InvalidSession(_)));
        assert!(f.store.session().is_none());
    }

    #[tokio::test]
    async fn network_failure_on_login_is_not_an_auth_error() {
        let f = fixture();
        f.verifier.set_offline(true);
        let err = f
            .store
            .login("patient@example.com", PASSWORD, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Network(_)));
    }

    #[tokio::test]
    async fn authentication_is_recomputed_at_expiry_boundary() {
        let f = fixture();
        let session = f
            .store
            .login("patient@example.com", PASSWORD, None)
            .await
            .unwrap();
        let expiry = session.expires_at;
        assert!(f.store.is_authenticated_at(expiry - Duration::milliseconds(1)));
        assert!(!f.store.is_authenticated_at(expiry));
        assert!(!f.store.is_authenticated_at(expiry + Duration::milliseconds(1)));
    }

    #[tokio::test]
    async fn logout_clears_locally_even_when_server_is_unreachable() {
        let f = fixture();
        f.store
            .login("patient@example.com", PASSWORD, None)
            .await
            .unwrap();
        f.verifier.set_offline(true);

        f.store.logout().await;
        assert!(!f.store.is_authenticated());
        assert!(f.store.token().is_none());
        assert!(f.store.last_error().is_none());
        assert!(f.storage.load(SESSION_STORAGE_KEY).unwrap().is_none());
        assert_eq!(f.verifier.logout_calls(), 1);
    }

    #[tokio::test]
    async fn refresh_without_session_fails() {
        let f = fixture();
        assert_eq!(f.store.refresh().await.unwrap_err(), PortalError::NoRefreshToken);
        assert_eq!(f.verifier.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn refresh_replaces_tokens() {
        let f = fixture();
        let first = f
            .store
            .login("doctor@example.com", PASSWORD, None)
            .await
            .unwrap();
        let second = f.store.refresh().await.unwrap();
        assert_ne!(first.access_token, second.access_token);
        assert_ne!(first.refresh_token, second.refresh_token);
        assert_eq!(f.store.token(), Some(second.access_token));
        assert!(f.store.has_role(Role::Doctor));
    }

    #[tokio::test]
    async fn failed_refresh_forces_logout() {
        let f = fixture();
        let events = recorder(&f.store);
        f.store
            .login("patient@example.com", PASSWORD, None)
            .await
            .unwrap();
        f.verifier.revoke_refresh_tokens();

        let err = f.store.refresh().await.unwrap_err();
        assert_eq!(err, PortalError::Authentication("Invalid refresh token".into()));
        assert!(f.store.session().is_none());
        assert_eq!(
            *events.lock().unwrap(),
            vec![SessionEvent::LoggedIn, SessionEvent::LoggedOut]
        );
    }

    #[tokio::test]
    async fn profile_update_merges_confirmed_fields() {
        let f = fixture();
        let before = f
            .store
            .login("doctor@example.com", PASSWORD, None)
            .await
            .unwrap();

        let update = ProfileUpdate {
            phone: Some("555-0100".into()),
            specialty: Some("Cardiology".into()),
            ..Default::default()
        };
        let user = f.store.update_profile(update).await.unwrap();
        assert_eq!(user.phone.as_deref(), Some("555-0100"));
        assert_eq!(user.specialty.as_deref(), Some("Cardiology"));
        assert_eq!(user.name, before.user.name);
        assert_eq!(user.permissions, before.user.permissions);
        assert_eq!(f.store.user(), Some(user));
    }

    #[tokio::test]
    async fn profile_update_requires_session() {
        let f = fixture();
        let err = f
            .store
            .update_profile(ProfileUpdate {
                name: Some("X".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, PortalError::NotAuthenticated);
    }

    #[tokio::test]
    async fn server_rejections_surface_verbatim() {
        let f = fixture();
        f.store
            .login("patient@example.com", PASSWORD, None)
            .await
            .unwrap();

        let err = f.store.verify_two_factor("123456").await.unwrap_err();
        assert_eq!(
            err,
            PortalError::Rejected("Two-factor authentication is not enabled for this account".into())
        );

        let err = f
            .store
            .change_password("not-it", "another-pass")
            .await
            .unwrap_err();
        assert_eq!(err, PortalError::Rejected("Current password is incorrect".into()));

        let err = f.store.reset_password("nobody").await.unwrap_err();
        assert_eq!(err, PortalError::Rejected("Invalid email address".into()));
        assert_eq!(f.store.last_error().as_deref(), Some("Invalid email address"));
    }

    #[tokio::test]
    async fn two_factor_and_password_change_succeed() {
        let f = fixture();
        f.verifier.enroll_two_factor("doctor@example.com", "864209");
        f.store
            .login("doctor@example.com", PASSWORD, None)
            .await
            .unwrap();

        f.store.verify_two_factor("864209").await.unwrap();
        f.store
            .change_password(PASSWORD, "brand-new-pass")
            .await
            .unwrap();
        f.store.reset_password("doctor@example.com").await.unwrap();
        assert!(f.store.last_error().is_none());
    }

    #[tokio::test]
    async fn persisted_session_survives_reload() {
        let f = fixture();
        f.store
            .login("patient@example.com", PASSWORD, None)
            .await
            .unwrap();
        let last_login = f.store.last_login();

        let reloaded = SessionStore::new(f.verifier.clone(), f.storage.clone());
        let events = recorder(&reloaded);
        let restored = reloaded.restore().await.unwrap();

        assert_eq!(restored, f.store.session());
        assert_eq!(reloaded.is_authenticated(), f.store.is_authenticated());
        assert_eq!(reloaded.last_login(), last_login);
        for p in [VIEW_OWN_RECORDS, PRESCRIBE_MEDICATION] {
            assert_eq!(reloaded.has_permission(p), f.store.has_permission(p));
        }
        assert_eq!(*events.lock().unwrap(), vec![SessionEvent::Restored]);
    }

    #[tokio::test]
    async fn transient_flags_are_not_persisted() {
        let f = fixture();
        f.store
            .login("patient@example.com", PASSWORD, None)
            .await
            .unwrap();
        let raw = f.storage.load(SESSION_STORAGE_KEY).unwrap().unwrap();
        assert!(!raw.contains("loading"));
        assert!(!raw.contains("last_error"));
    }

    #[tokio::test]
    async fn corrupt_persisted_session_is_discarded() {
        let f = fixture();
        f.storage.save(SESSION_STORAGE_KEY, "{not json").unwrap();
        assert_eq!(f.store.restore().await.unwrap(), None);
        assert!(f.storage.load(SESSION_STORAGE_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn unsubscribed_listener_stops_receiving() {
        let f = fixture();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let id = f
            .store
            .subscribe(Arc::new(move |event: SessionEvent, _: Option<&Session>| {
                sink.lock().unwrap().push(event);
            }));
        f.store
            .login("patient@example.com", PASSWORD, None)
            .await
            .unwrap();
        assert!(f.store.unsubscribe(id));
        assert!(!f.store.unsubscribe(id));
        f.store.logout().await;
        assert_eq!(*events.lock().unwrap(), vec![SessionEvent::LoggedIn]);
    }
}
