//! A thin advisory lock over the coordination store's set-if-absent-with-TTL primitive.
//!
//! Two distinct usages appear in the design: the matchmaker's fleet-wide
//! `lock:matchmaker`, acquired and explicitly released every tick, and the per-game
//! `lock:finish:{game_id}` lock, acquired once and deliberately never released (it only
//! expires). Both go through the same `Lock` type; callers choose whether to call
//! `release` or let the TTL do the work.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::retry::{RetryConfig, RetryExecutor};
use crate::store::{CoordinationStore, StoreError, StoreResult};

/// A held lock. Dropping this does not release the lock — the store only knows about
/// expiry, not process lifetime, so an explicit `release` call (or a designed-in
/// never-released lock) is how the caller decides.
pub struct LockHandle {
    key: String,
    token: String,
}

impl LockHandle {
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Debug)]
enum LockAcquireError {
    Held,
    Store(StoreError),
}

pub struct Lock {
    store: Arc<dyn CoordinationStore>,
}

impl Lock {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// Try to acquire once, without retrying. Used by `lock:finish:{game_id}`, where
    /// losing the race simply means another runner is finalizing this game.
    pub async fn try_acquire(&self, key: &str, ttl: Duration) -> StoreResult<Option<LockHandle>> {
        let token = Uuid::new_v4().to_string();
        let won = self.store.set_nx(key, &token, ttl.as_secs().max(1)).await?;
        Ok(won.then(|| LockHandle {
            key: key.to_string(),
            token,
        }))
    }

    /// Retry-acquire with backoff, bounded by `max_wait` rather than by an attempt count —
    /// a worker that loses the race to `lock:matchmaker` should keep trying until its own
    /// poll interval elapses, not give up after a fixed number of tries.
    pub async fn acquire(&self, key: &str, ttl: Duration, max_wait: Duration) -> StoreResult<Option<LockHandle>> {
        let deadline = tokio::time::Instant::now() + max_wait;
        let executor = RetryExecutor::new(RetryConfig {
            max_attempts: u32::MAX,
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(250),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        });

        let result = executor
            .execute_with_condition(
                "lock_acquire",
                || async {
                    match self.try_acquire(key, ttl).await {
                        Ok(Some(handle)) => Ok(handle),
                        Ok(None) => Err(LockAcquireError::Held),
                        Err(err) => Err(LockAcquireError::Store(err)),
                    }
                },
                |err| matches!(err, LockAcquireError::Held) && tokio::time::Instant::now() < deadline,
            )
            .await;

        match result {
            Ok(handle) => Ok(Some(handle)),
            Err(LockAcquireError::Held) => Ok(None),
            Err(LockAcquireError::Store(err)) => Err(err),
        }
    }

    pub async fn release(&self, handle: LockHandle) -> StoreResult<()> {
        self.store.release_nx(&handle.key, &handle.token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn second_acquirer_fails_until_release() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryStore::new());
        let lock = Lock::new(store);
        let first = lock.try_acquire("lock:matchmaker", Duration::from_secs(5)).await.unwrap();
        assert!(first.is_some());
        let second = lock.try_acquire("lock:matchmaker", Duration::from_secs(5)).await.unwrap();
        assert!(second.is_none());
        lock.release(first.unwrap()).await.unwrap();
        let third = lock.try_acquire("lock:matchmaker", Duration::from_secs(5)).await.unwrap();
        assert!(third.is_some());
    }

    #[tokio::test]
    async fn finish_lock_is_never_released_by_the_caller() {
        // Two "runners" racing to finalize the same game: only the winner proceeds, and
        // the loser must not be able to acquire again before expiry even though neither
        // side calls `release`.
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryStore::new());
        let lock = Lock::new(store);
        let key = "lock:finish:game-1";
        let winner = lock.try_acquire(key, Duration::from_secs(5)).await.unwrap();
        assert!(winner.is_some());
        let loser = lock.try_acquire(key, Duration::from_secs(5)).await.unwrap();
        assert!(loser.is_none());
    }
}
