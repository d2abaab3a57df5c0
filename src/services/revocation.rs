use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How often the in-memory store drops expired entries by default.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(15 * 60);
/// Longest a revocation is tracked, whatever the caller asks for.
pub const MAX_TRACK_DURATION: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

/// Remembers revoked session IDs for a tracking window.
///
/// A `revoke` that completes before an `is_revoked` call on any other task
/// must be visible to it. Implementations do their own synchronization.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Records `session_id` as revoked until now + `track_for`.
    async fn revoke(&self, session_id: &str, track_for: Duration);

    /// Whether `session_id` currently has an entry.
    async fn is_revoked(&self, session_id: &str) -> bool;
}

/// The default `RevocationStore`: a map guarded by a lock, swept by a
/// background task every `flush_interval`.
pub struct InMemoryRevocationStore {
    revoked: RwLock<HashMap<String, Instant>>,
    flush_interval: Duration,
    sweeper: Mutex<Option<CancellationToken>>,
}

impl InMemoryRevocationStore {
    /// Creates a new store. The sweep is not running until `start`.
    pub fn new(flush_interval: Duration) -> Self {
        Self {
            revoked: RwLock::new(HashMap::new()),
            flush_interval,
            sweeper: Mutex::new(None),
        }
    }

    /// Spawns the sweep task. Calling it while a sweep runs is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if sweeper.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        *sweeper = Some(cancel.clone());

        let store = Arc::downgrade(self);
        let period = self.flush_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(store) = store.upgrade() else { break };
                        let flushed = store.flush_expired(Instant::now()).await;
                        if flushed > 0 {
                            tracing::debug!("🧹 Flushed {} expired revocations", flushed);
                        }
                    }
                }
            }
            tracing::debug!("Revocation sweep stopped");
        });
        tracing::info!("✅ Revocation sweep started (every {:?})", period);
    }

    /// Stops the sweep task. Idempotent.
    pub fn stop(&self) {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cancel) = sweeper.take() {
            cancel.cancel();
        }
    }

    /// Whether the sweep task is running.
    pub fn is_running(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Drops every entry whose expiry is before `now`; returns how many.
    ///
    /// Entries added while the sweep runs are compared against the same
    /// `now`, so anything still valid is kept.
    pub async fn flush_expired(&self, now: Instant) -> usize {
        let mut revoked = self.revoked.write().await;
        let before = revoked.len();
        revoked.retain(|_, expiry| *expiry >= now);
        before - revoked.len()
    }
}

impl Default for InMemoryRevocationStore {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_INTERVAL)
    }
}

impl Drop for InMemoryRevocationStore {
    fn drop(&mut self) {
        self.stop();
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn revoke(&self, session_id: &str, track_for: Duration) {
        let expiry = Instant::now() + track_for.min(MAX_TRACK_DURATION);
        self.revoked
            .write()
            .await
            .insert(session_id.to_string(), expiry);
    }

    async fn is_revoked(&self, session_id: &str) -> bool {
        self.revoked.read().await.contains_key(session_id)
    }
}
