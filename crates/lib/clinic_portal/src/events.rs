//! Session change notifications.
//!
//! The store emits one event per state change, after the change is visible
//! to readers. Listeners run synchronously on the caller's task and must not
//! block.

use clinic_core::models::Session;

/// What changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    Refreshed,
    LoggedOut,
    ProfileUpdated,
    Restored,
}

/// Handle returned by [`crate::store::SessionStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Receives every session change. `session` is the state after the change.
pub trait SessionListener: Send + Sync {
    fn session_changed(&self, event: SessionEvent, session: Option<&Session>);
}

impl<F> SessionListener for F
where
    F: Fn(SessionEvent, Option<&Session>) + Send + Sync,
{
    fn session_changed(&self, event: SessionEvent, session: Option<&Session>) {
        self(event, session)
    }
}
