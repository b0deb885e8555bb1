//! Pending request tokens
//!
//! Keeps the request token issued when a login starts so the callback
//! can exchange that same token instead of a fresh one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::RequestToken;

const DEFAULT_MAX_PENDING: usize = 10_000;

/// Pending token entry
#[derive(Debug, Clone)]
struct PendingEntry {
    token: RequestToken,
    issued_at: Instant,
}

/// Request tokens awaiting the provider callback, keyed by `oauth_token`
///
/// Each token can be taken exactly once. Entries older than the TTL are
/// treated as absent and pruned on insert.
pub struct PendingRequestTokens {
    entries: Arc<RwLock<HashMap<String, PendingEntry>>>,
    ttl: Duration,
    max_pending: usize,
}

impl PendingRequestTokens {
    /// Create new store
    ///
    /// # Arguments
    /// * `ttl` - How long a token may wait for its callback
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_PENDING)
    }

    /// Create new store with an explicit cap on pending entries.
    pub fn with_capacity(ttl: Duration, max_pending: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            max_pending: max_pending.max(1),
        }
    }

    /// Remember a token until its callback arrives
    ///
    /// Expired entries are pruned first. Returns `false`, leaving the store
    /// untouched, when it is still full of live entries: tokens of logins
    /// already in progress are never pushed out by new ones.
    pub async fn insert(&self, token: RequestToken) -> bool {
        let mut entries = self.entries.write().await;

        let ttl = self.ttl;
        entries.retain(|_, entry| entry.issued_at.elapsed() < ttl);

        if entries.len() >= self.max_pending {
            tracing::warn!(
                max_pending = self.max_pending,
                "Pending request token store full, refusing new token"
            );
            return false;
        }

        entries.insert(
            token.token.clone(),
            PendingEntry {
                token,
                issued_at: Instant::now(),
            },
        );
        true
    }

    /// Remove and return the token for `key`, if present and not expired
    pub async fn take(&self, key: &str) -> Option<RequestToken> {
        let entry = self.entries.write().await.remove(key)?;
        if entry.issued_at.elapsed() >= self.ttl {
            tracing::debug!("Pending request token expired");
            return None;
        }
        Some(entry.token)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
