//! The coordination store: the single shared resource every role talks to. No role ever
//! calls another role directly; all coordination happens through these primitives.
//!
//! The trait intentionally exposes nothing beyond what the design requires: atomic hash
//! field access with TTL, list head/tail operations, sorted-set score bookkeeping,
//! set-if-absent locks, a prefix scan, and topic pub/sub.

pub mod keys;
pub mod memory;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("coordination store connection lost")]
    ConnectionLost,
    #[error("value at key {0} was malformed")]
    Malformed(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A hash's fields, read or written as a batch. Field values are always short strings;
/// callers parse/format domain types at the edges of the store.
pub type Fields = HashMap<String, String>;

/// Outcome of popping from the head of a list: the IDs removed, in order.
pub type Popped = Vec<String>;

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    // -- Hashes (player:*, session:*, game:*) ------------------------------------------

    /// Overwrite the given fields of the hash at `key`, creating it if absent. If
    /// `ttl_secs` is `Some`, the key's TTL is (re)set to that value; pass `None` to leave
    /// an existing TTL untouched.
    async fn hset(&self, key: &str, fields: Fields, ttl_secs: Option<u64>) -> StoreResult<()>;

    /// Read all fields of the hash at `key`. Returns `None` if the key does not exist or
    /// has expired.
    async fn hgetall(&self, key: &str) -> StoreResult<Option<Fields>>;

    /// Read all fields for many keys in one round trip. Missing/expired keys are simply
    /// absent from the result map, mirroring a pipelined multi-read.
    async fn hgetall_many(&self, keys: &[String]) -> StoreResult<HashMap<String, Fields>>;

    /// Delete the hash at `key` entirely. No-op if absent.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// List every key currently present with the given prefix (used by the reaper's
    /// `player:*` sweep and the capacity provider's session reconciliation).
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;

    // -- Lists (queue:ready) ------------------------------------------------------------

    async fn list_push_tail(&self, key: &str, values: &[String]) -> StoreResult<()>;

    /// Pop up to `count` values from the head of the list at `key`. Returns fewer than
    /// `count` (including zero) if the list is shorter.
    async fn list_pop_head(&self, key: &str, count: usize) -> StoreResult<Popped>;

    /// Snapshot the entire list without consuming it (reaper queue hygiene pass).
    async fn list_snapshot(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Remove every occurrence of `value` from the list (value-based delete, avoids
    /// positional drift under concurrent pops).
    async fn list_remove_value(&self, key: &str, value: &str) -> StoreResult<()>;

    // -- Sorted sets (sessions:available) -----------------------------------------------

    /// Set `member`'s score, inserting it if absent.
    async fn zset_upsert(&self, key: &str, member: &str, score: f64) -> StoreResult<()>;

    /// Atomically add `delta` to `member`'s score, returning the new score. Negative
    /// deltas are how the matchmaker reserves a slot; positive deltas release one. If the
    /// resulting score is `<= 0`, the member is removed (mirrors "available iff score >
    /// 0").
    async fn zset_incr(&self, key: &str, member: &str, delta: f64) -> StoreResult<f64>;

    async fn zset_remove(&self, key: &str, member: &str) -> StoreResult<()>;

    /// The member with the highest score, if any.
    async fn zset_max(&self, key: &str) -> StoreResult<Option<(String, f64)>>;

    async fn zset_all(&self, key: &str) -> StoreResult<Vec<(String, f64)>>;

    // -- Locks (set-if-absent with TTL) --------------------------------------------------

    /// Set `key` to `token` only if absent, with the given TTL. Returns `true` if this
    /// call won the lock.
    async fn set_nx(&self, key: &str, token: &str, ttl_secs: u64) -> StoreResult<bool>;

    /// Release a lock previously won with `set_nx`, but only if `token` still matches
    /// (prevents releasing a lock someone else now owns after TTL expiry + reacquire).
    async fn release_nx(&self, key: &str, token: &str) -> StoreResult<()>;

    // -- Pub/sub --------------------------------------------------------------------------

    async fn publish(&self, topic: &str, payload: String) -> StoreResult<()>;

    /// Subscribe to a topic. Each subscriber gets every message published after it
    /// subscribes; messages published before subscribing are not replayed.
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<String>;
}
