//! Refresh token store.
//!
//! Tokens are only ever held as SHA-256 hashes. A token is single-use: a
//! successful refresh takes it out of the store before a new pair is issued.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use tracing::debug;

#[derive(Debug, Clone)]
struct RefreshTokenRecord {
    user_id: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct RefreshTokenStore {
    tokens: DashMap<String, RefreshTokenRecord>,
}

/// Generate a cryptographically random refresh token (64 alphanumeric chars).
pub fn generate_refresh_token() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// SHA-256 hash a refresh token for storage.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl RefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a freshly issued token for `user_id`.
    pub fn store(&self, token: &str, user_id: &str, expires_at: DateTime<Utc>) {
        self.tokens.insert(
            hash_refresh_token(token),
            RefreshTokenRecord {
                user_id: user_id.to_string(),
                expires_at,
            },
        );
    }

    /// Remove the token and return its owner if it was still valid.
    pub fn take_valid(&self, token: &str) -> Option<String> {
        let (_, record) = self.tokens.remove(&hash_refresh_token(token))?;
        if Utc::now() >= record.expires_at {
            debug!(user_id = %record.user_id, "refresh token expired");
            return None;
        }
        Some(record.user_id)
    }

    /// Revoke a single token. Unknown tokens are ignored.
    pub fn revoke(&self, token: &str) {
        self.tokens.remove(&hash_refresh_token(token));
    }

    /// Revoke every token held by `user_id`.
    pub fn revoke_all(&self, user_id: &str) {
        self.tokens.retain(|_, r| r.user_id != user_id);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Evict expired entries.
    pub fn cleanup(&self) {
        let now = Utc::now();
        self.tokens.retain(|_, r| r.expires_at > now);
    }

    /// Spawn a periodic cleanup task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(StdDuration::from_secs(3600));
            loop {
                interval.tick().await;
                store.cleanup();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn tokens_are_random_and_hashed() {
        let a = generate_refresh_token();
        let b = generate_refresh_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(hash_refresh_token(&a).len(), 64);
        assert_ne!(hash_refresh_token(&a), a);
    }

    #[test]
    fn take_is_single_use() {
        let store = RefreshTokenStore::new();
        store.store("tok", "u-1", Utc::now() + Duration::days(1));
        assert_eq!(store.take_valid("tok").as_deref(), Some("u-1"));
        assert!(store.take_valid("tok").is_none());
    }

    #[test]
    fn expired_token_is_not_returned() {
        let store = RefreshTokenStore::new();
        store.store("tok", "u-1", Utc::now() - Duration::seconds(1));
        assert!(store.take_valid("tok").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn revoke_all_only_touches_one_user() {
        let store = RefreshTokenStore::new();
        let later = Utc::now() + Duration::days(1);
        store.store("a1", "u-a", later);
        store.store("a2", "u-a", later);
        store.store("b1", "u-b", later);
        store.revoke_all("u-a");
        assert_eq!(store.len(), 1);
        assert_eq!(store.take_valid("b1").as_deref(), Some("u-b"));
    }

    #[test]
    fn cleanup_drops_expired() {
        let store = RefreshTokenStore::new();
        store.store("old", "u-1", Utc::now() - Duration::seconds(1));
        store.store("new", "u-1", Utc::now() + Duration::days(1));
        store.cleanup();
        assert_eq!(store.len(), 1);
    }
}
