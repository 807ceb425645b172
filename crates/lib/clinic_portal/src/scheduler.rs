//! Proactive token renewal.
//!
//! [`RefreshScheduler`] listens to a [`SessionStore`] and keeps at most one
//! timer armed: every session change cancels the outstanding timer and, if
//! the new session has a future expiry, arms a fresh one that calls
//! [`SessionStore::refresh`] `lead` before expiry (immediately if that point
//! has already passed).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use clinic_core::models::Session;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::events::{ListenerId, SessionEvent, SessionListener};
use crate::store::SessionStore;

/// How long before expiry a session is renewed.
pub const DEFAULT_REFRESH_LEAD: Duration = Duration::from_secs(5 * 60);

/// Delay until a session expiring at `expires_at` should be renewed,
/// clamped to zero.
pub fn refresh_delay(expires_at: DateTime<Utc>, now: DateTime<Utc>, lead: Duration) -> Duration {
    (expires_at - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
        .saturating_sub(lead)
}

struct ArmedTimer {
    generation: u64,
    expires_at: DateTime<Utc>,
    cancel: CancellationToken,
}

type Slot = Arc<Mutex<Option<ArmedTimer>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<ArmedTimer>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct RefreshScheduler {
    store: Weak<SessionStore>,
    lead: Duration,
    slot: Slot,
    generation: AtomicU64,
    listener: Mutex<Option<ListenerId>>,
}

impl RefreshScheduler {
    /// Subscribe a scheduler to `store` and arm it for the current session.
    pub fn attach(store: &Arc<SessionStore>, lead: Duration) -> Arc<Self> {
        let scheduler = Arc::new(Self {
            store: Arc::downgrade(store),
            lead,
            slot: Arc::default(),
            generation: AtomicU64::new(0),
            listener: Mutex::new(None),
        });
        let id = store.subscribe(scheduler.clone());
        *scheduler
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(id);
        scheduler.rearm(store.session().as_ref());
        scheduler
    }

    /// Unsubscribe from the store and cancel any outstanding timer.
    pub fn detach(&self) {
        let id = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let (Some(id), Some(store)) = (id, self.store.upgrade()) {
            store.unsubscribe(id);
        }
        self.cancel();
    }

    /// Number of outstanding timers: 0 or 1.
    pub fn pending(&self) -> usize {
        usize::from(lock(&self.slot).is_some())
    }

    /// Expiry of the session the outstanding timer was armed for.
    pub fn armed_expiry(&self) -> Option<DateTime<Utc>> {
        lock(&self.slot).as_ref().map(|t| t.expires_at)
    }

    pub fn lead(&self) -> Duration {
        self.lead
    }

    fn cancel(&self) {
        if let Some(old) = lock(&self.slot).take() {
            old.cancel.cancel();
        }
    }

    /// Cancel the outstanding timer, then arm one for `session` if it is
    /// still valid.
    fn rearm(&self, session: Option<&Session>) {
        let mut slot = lock(&self.slot);
        if let Some(old) = slot.take() {
            old.cancel.cancel();
        }

        let Some(session) = session else {
            return;
        };
        let now = Utc::now();
        if !session.is_valid_at(now) {
            debug!(
                expires_at = %session.expires_at,
                "session already expired, no refresh armed"
            );
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            warn!("no async runtime, refresh timer not armed");
            return;
        };

        let delay = refresh_delay(session.expires_at, now, self.lead);
        let deadline = Instant::now() + delay;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        *slot = Some(ArmedTimer {
            generation,
            expires_at: session.expires_at,
            cancel: cancel.clone(),
        });
        drop(slot);

        debug!(?delay, expires_at = %session.expires_at, "refresh timer armed");
        handle.spawn(fire_at(
            deadline,
            generation,
            cancel,
            Arc::clone(&self.slot),
            self.store.clone(),
        ));
    }
}

async fn fire_at(
    deadline: Instant,
    generation: u64,
    cancel: CancellationToken,
    slot: Slot,
    store: Weak<SessionStore>,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep_until(deadline) => {}
    }

    {
        let mut slot = lock(&slot);
        match slot.as_ref() {
            Some(timer) if timer.generation == generation => *slot = None,
            _ => return,
        }
    }

    let Some(store) = store.upgrade() else {
        return;
    };
    debug!("refreshing session ahead of expiry");
    if let Err(e) = store.refresh().await {
        // The store has already logged out.
        debug!(error = %e, "scheduled refresh failed");
    }
}

impl SessionListener for RefreshScheduler {
    fn session_changed(&self, event: SessionEvent, session: Option<&Session>) {
        trace!(?event, "session changed");
        self.rearm(session);
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::verifier::InMemoryVerifier;
    use clinic_core::models::Role;

    const PASSWORD: &str = "correct-horse";

    fn setup() -> (Arc<InMemoryVerifier>, Arc<SessionStore>, Arc<RefreshScheduler>) {
        let verifier = Arc::new(
            InMemoryVerifier::new().with_account("doctor@example.com", PASSWORD, Role::Doctor),
        );
        let store = SessionStore::new(verifier.clone(), Arc::new(MemoryStorage::new()));
        let scheduler = RefreshScheduler::attach(&store, DEFAULT_REFRESH_LEAD);
        (verifier, store, scheduler)
    }

    /// Let spawned timer tasks run without moving the clock.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn delay_is_expiry_minus_lead() {
        let now = Utc::now();
        let delay = refresh_delay(now + chrono::Duration::minutes(60), now, DEFAULT_REFRESH_LEAD);
        assert_eq!(delay, Duration::from_secs(55 * 60));
    }

    #[test]
    fn delay_clamps_to_zero_inside_lead_window() {
        let now = Utc::now();
        let expiry = now + chrono::Duration::minutes(4);
        assert_eq!(refresh_delay(expiry, now, DEFAULT_REFRESH_LEAD), Duration::ZERO);
        let expired = now - chrono::Duration::minutes(1);
        assert_eq!(refresh_delay(expired, now, DEFAULT_REFRESH_LEAD), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn near_expiry_session_refreshes_immediately() {
        let (verifier, store, scheduler) = setup();
        verifier.set_session_ttl(chrono::Duration::minutes(4));
        store.login("doctor@example.com", PASSWORD, None).await.unwrap();
        // Sessions issued by the refresh itself are long-lived.
        verifier.set_session_ttl(chrono::Duration::minutes(60));
        assert_eq!(scheduler.pending(), 1);

        settle().await;
        assert_eq!(verifier.refresh_calls(), 1);
        assert!(store.is_authenticated());
        assert_eq!(scheduler.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hour_long_session_refreshes_five_minutes_early() {
        let (verifier, store, scheduler) = setup();
        let session = store.login("doctor@example.com", PASSWORD, None).await.unwrap();
        assert_eq!(scheduler.armed_expiry(), Some(session.expires_at));

        tokio::time::advance(Duration::from_secs(54 * 60)).await;
        settle().await;
        assert_eq!(verifier.refresh_calls(), 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        settle().await;
        assert_eq!(verifier.refresh_calls(), 1);
        assert_ne!(store.token(), Some(session.access_token));
    }

    #[tokio::test(start_paused = true)]
    async fn one_timer_after_refresh_none_after_logout() {
        let (_verifier, store, scheduler) = setup();
        store.login("doctor@example.com", PASSWORD, None).await.unwrap();

        let refreshed = store.refresh().await.unwrap();
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.armed_expiry(), Some(refreshed.expires_at));

        store.logout().await;
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.armed_expiry(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_updates_leave_one_timer() {
        let (verifier, store, scheduler) = setup();
        verifier.set_session_ttl(chrono::Duration::minutes(10));
        store.login("doctor@example.com", PASSWORD, None).await.unwrap();
        store.login("doctor@example.com", PASSWORD, None).await.unwrap();
        assert_eq!(scheduler.pending(), 1);

        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
        settle().await;
        assert_eq!(verifier.refresh_calls(), 1);
        assert_eq!(scheduler.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_scheduled_refresh_logs_out_and_disarms() {
        let (verifier, store, scheduler) = setup();
        verifier.set_session_ttl(chrono::Duration::minutes(4));
        store.login("doctor@example.com", PASSWORD, None).await.unwrap();
        verifier.revoke_refresh_tokens();

        settle().await;
        assert_eq!(verifier.refresh_calls(), 1);
        assert!(store.session().is_none());
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn detached_scheduler_stops_arming() {
        let (verifier, store, scheduler) = setup();
        store.login("doctor@example.com", PASSWORD, None).await.unwrap();
        scheduler.detach();
        assert_eq!(scheduler.pending(), 0);

        store.refresh().await.unwrap();
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(verifier.refresh_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restored_session_arms_timer() {
        let verifier = Arc::new(
            InMemoryVerifier::new().with_account("doctor@example.com", PASSWORD, Role::Doctor),
        );
        let storage = Arc::new(MemoryStorage::new());
        let first = SessionStore::new(verifier.clone(), storage.clone());
        let session = first.login("doctor@example.com", PASSWORD, None).await.unwrap();

        let reloaded = SessionStore::new(verifier, storage);
        let scheduler = RefreshScheduler::attach(&reloaded, DEFAULT_REFRESH_LEAD);
        assert_eq!(scheduler.pending(), 0);
        reloaded.restore().await.unwrap();
        assert_eq!(scheduler.armed_expiry(), Some(session.expires_at));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_restored_session_is_kept_but_not_armed() {
        let verifier = Arc::new(
            InMemoryVerifier::new().with_account("doctor@example.com", PASSWORD, Role::Doctor),
        );
        let storage = Arc::new(MemoryStorage::new());
        let first = SessionStore::new(verifier.clone(), storage.clone());
        verifier.set_session_ttl(chrono::Duration::minutes(-1));
        let stale = first.login("doctor@example.com", PASSWORD, None).await.unwrap();
        assert!(stale.expires_at < Utc::now());

        let reloaded = SessionStore::new(verifier.clone(), storage);
        let scheduler = RefreshScheduler::attach(&reloaded, DEFAULT_REFRESH_LEAD);
        reloaded.restore().await.unwrap();

        assert!(!reloaded.is_authenticated());
        assert_eq!(reloaded.session(), Some(stale.clone()));
        assert_eq!(scheduler.pending(), 0);

        // The stored refresh token can still renew the session.
        verifier.set_session_ttl(chrono::Duration::minutes(60));
        let renewed = reloaded.refresh().await.unwrap();
        assert_eq!(verifier.refresh_calls(), 1);
        assert_ne!(renewed.refresh_token, stale.refresh_token);
        assert!(reloaded.is_authenticated());
        assert_eq!(scheduler.pending(), 1);
    }
}
