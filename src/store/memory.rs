//! In-process `CoordinationStore` implementation. Backs every primitive with `dashmap` and
//! `tokio::sync` the way the teacher backs `GameDatabase`/`DistributedLock` with
//! `InMemoryDatabase`/`InMemoryDistributedLock`: a trait abstraction with exactly one
//! concrete, non-networked implementation, suitable for a single process or for tests.
//! A store-backed-by-an-actual-network-KV is a separate collaborator this core does not
//! ship (mirrors the teacher's `DatabaseConfig::InMemory`-only enum).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex, RwLock};

use super::{CoordinationStore, Fields, Popped, StoreError, StoreResult};

struct HashEntry {
    fields: Fields,
    expires_at: Option<Instant>,
}

impl HashEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|e| now >= e)
    }
}

struct LockEntry {
    token: String,
    expires_at: Instant,
}

const PUBSUB_CAPACITY: usize = 256;

pub struct InMemoryStore {
    hashes: DashMap<String, HashEntry>,
    lists: DashMap<String, Mutex<VecDeque<String>>>,
    zsets: DashMap<String, RwLock<HashMap<String, f64>>>,
    locks: RwLock<HashMap<String, LockEntry>>,
    topics: DashMap<String, broadcast::Sender<String>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            hashes: DashMap::new(),
            lists: DashMap::new(),
            zsets: DashMap::new(),
            locks: RwLock::new(HashMap::new()),
            topics: DashMap::new(),
        }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn hset(&self, key: &str, fields: Fields, ttl_secs: Option<u64>) -> StoreResult<()> {
        let now = Instant::now();
        let mut entry = self.hashes.entry(key.to_string()).or_insert_with(|| HashEntry {
            fields: Fields::new(),
            expires_at: None,
        });
        entry.fields.extend(fields);
        if let Some(ttl) = ttl_secs {
            entry.expires_at = Some(now + Duration::from_secs(ttl));
        }
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> StoreResult<Option<Fields>> {
        let now = Instant::now();
        match self.hashes.get(key) {
            Some(entry) if !entry.is_expired(now) => Ok(Some(entry.fields.clone())),
            Some(_) => {
                self.hashes.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn hgetall_many(&self, keys: &[String]) -> StoreResult<HashMap<String, Fields>> {
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(fields) = self.hgetall(key).await? {
                out.insert(key.clone(), fields);
            }
        }
        Ok(out)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.hashes.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        let keys: Vec<String> = self
            .hashes
            .iter()
            .filter(|e| e.key().starts_with(prefix) && !e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect();
        Ok(keys)
    }

    async fn list_push_tail(&self, key: &str, values: &[String]) -> StoreResult<()> {
        let list = self.lists.entry(key.to_string()).or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut guard = list.lock().await;
        guard.extend(values.iter().cloned());
        Ok(())
    }

    async fn list_pop_head(&self, key: &str, count: usize) -> StoreResult<Popped> {
        let Some(list) = self.lists.get(key) else {
            return Ok(Vec::new());
        };
        let mut guard = list.lock().await;
        let n = count.min(guard.len());
        Ok(guard.drain(..n).collect())
    }

    async fn list_snapshot(&self, key: &str) -> StoreResult<Vec<String>> {
        let Some(list) = self.lists.get(key) else {
            return Ok(Vec::new());
        };
        let guard = list.lock().await;
        Ok(guard.iter().cloned().collect())
    }

    async fn list_remove_value(&self, key: &str, value: &str) -> StoreResult<()> {
        let Some(list) = self.lists.get(key) else {
            return Ok(());
        };
        let mut guard = list.lock().await;
        guard.retain(|v| v != value);
        Ok(())
    }

    async fn zset_upsert(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        let zset = self.zsets.entry(key.to_string()).or_insert_with(|| RwLock::new(HashMap::new()));
        let mut guard = zset.write().await;
        guard.insert(member.to_string(), score);
        Ok(())
    }

    async fn zset_incr(&self, key: &str, member: &str, delta: f64) -> StoreResult<f64> {
        let zset = self.zsets.entry(key.to_string()).or_insert_with(|| RwLock::new(HashMap::new()));
        let mut guard = zset.write().await;
        let score = guard.entry(member.to_string()).or_insert(0.0);
        *score += delta;
        let new_score = *score;
        if new_score <= 0.0 {
            guard.remove(member);
        }
        Ok(new_score)
    }

    async fn zset_remove(&self, key: &str, member: &str) -> StoreResult<()> {
        if let Some(zset) = self.zsets.get(key) {
            zset.write().await.remove(member);
        }
        Ok(())
    }

    async fn zset_max(&self, key: &str) -> StoreResult<Option<(String, f64)>> {
        let Some(zset) = self.zsets.get(key) else {
            return Ok(None);
        };
        let guard = zset.read().await;
        Ok(guard
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(m, s)| (m.clone(), *s)))
    }

    async fn zset_all(&self, key: &str) -> StoreResult<Vec<(String, f64)>> {
        let Some(zset) = self.zsets.get(key) else {
            return Ok(Vec::new());
        };
        let guard = zset.read().await;
        Ok(guard.iter().map(|(m, s)| (m.clone(), *s)).collect())
    }

    async fn set_nx(&self, key: &str, token: &str, ttl_secs: u64) -> StoreResult<bool> {
        let now = Instant::now();
        let mut locks = self.locks.write().await;
        // Single write-lock acquisition for cleanup-then-insert: avoids a TOCTOU gap
        // between checking expiry and winning the lock.
        if let Some(existing) = locks.get(key) {
            if existing.expires_at > now {
                return Ok(false);
            }
        }
        locks.insert(
            key.to_string(),
            LockEntry {
                token: token.to_string(),
                expires_at: now + Duration::from_secs(ttl_secs),
            },
        );
        Ok(true)
    }

    async fn release_nx(&self, key: &str, token: &str) -> StoreResult<()> {
        let mut locks = self.locks.write().await;
        if let Some(existing) = locks.get(key) {
            if existing.token == token {
                locks.remove(key);
            }
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: String) -> StoreResult<()> {
        let sender = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(PUBSUB_CAPACITY).0)
            .clone();
        // No subscribers is not an error: delivery is best-effort per the spec.
        let _ = sender.send(payload);
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        let sender = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(PUBSUB_CAPACITY).0)
            .clone();
        sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Barrier;

    #[tokio::test]
    async fn hset_then_hgetall_round_trips() {
        let store = InMemoryStore::new();
        let mut fields = Fields::new();
        fields.insert("state".into(), "READY".into());
        store.hset("player:1", fields, None).await.unwrap();
        let got = store.hgetall("player:1").await.unwrap().unwrap();
        assert_eq!(got.get("state"), Some(&"READY".to_string()));
    }

    #[tokio::test]
    async fn hash_ttl_expires() {
        let store = InMemoryStore::new();
        store.hset("player:1", Fields::new(), Some(0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.hgetall("player:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_push_and_pop_head_is_fifo() {
        let store = InMemoryStore::new();
        store
            .list_push_tail("queue:ready", &["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        let popped = store.list_pop_head("queue:ready", 2).await.unwrap();
        assert_eq!(popped, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.list_snapshot("queue:ready").await.unwrap(), vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn list_remove_value_is_value_based() {
        let store = InMemoryStore::new();
        store
            .list_push_tail("queue:ready", &["a".into(), "b".into(), "a".into()])
            .await
            .unwrap();
        store.list_remove_value("queue:ready", "a").await.unwrap();
        assert_eq!(store.list_snapshot("queue:ready").await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn zset_incr_removes_member_at_zero() {
        let store = InMemoryStore::new();
        store.zset_upsert("sessions:available", "s1", 1.0).await.unwrap();
        let score = store.zset_incr("sessions:available", "s1", -1.0).await.unwrap();
        assert_eq!(score, 0.0);
        assert_eq!(store.zset_max("sessions:available").await.unwrap(), None);
    }

    #[tokio::test]
    async fn zset_max_picks_highest_score() {
        let store = InMemoryStore::new();
        store.zset_upsert("sessions:available", "s1", 2.0).await.unwrap();
        store.zset_upsert("sessions:available", "s2", 5.0).await.unwrap();
        let (member, score) = store.zset_max("sessions:available").await.unwrap().unwrap();
        assert_eq!(member, "s2");
        assert_eq!(score, 5.0);
    }

    #[tokio::test]
    async fn set_nx_is_exclusive_until_expiry() {
        let store = InMemoryStore::new();
        assert!(store.set_nx("lock:matchmaker", "a", 10).await.unwrap());
        assert!(!store.set_nx("lock:matchmaker", "b", 10).await.unwrap());
    }

    #[tokio::test]
    async fn release_nx_requires_matching_token() {
        let store = InMemoryStore::new();
        store.set_nx("lock:x", "a", 10).await.unwrap();
        store.release_nx("lock:x", "wrong-token").await.unwrap();
        assert!(!store.set_nx("lock:x", "b", 10).await.unwrap());
        store.release_nx("lock:x", "a").await.unwrap();
        assert!(store.set_nx("lock:x", "b", 10).await.unwrap());
    }

    #[tokio::test]
    async fn publish_subscribe_delivers_after_subscription() {
        let store = InMemoryStore::new();
        let mut rx = store.subscribe("events:match_found");
        store.publish("events:match_found", "payload".into()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "payload");
    }

    #[tokio::test]
    async fn concurrent_slot_reservation_hands_out_each_slot_exactly_once() {
        // Five concurrent reservations against exactly five available slots must produce
        // five distinct scores (4..=0) with no duplicate and no oversell, mirroring the
        // TOCTOU-safe counter races exercised against `connections_per_ip`.
        let store = Arc::new(InMemoryStore::new());
        store.zset_upsert("sessions:available", "s1", 5.0).await.unwrap();
        let barrier = Arc::new(Barrier::new(5));
        let mut handles = Vec::new();
        for _ in 0..5 {
            let store = store.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                store.zset_incr("sessions:available", "s1", -1.0).await.unwrap()
            }));
        }
        let mut scores = Vec::new();
        for handle in handles {
            scores.push(handle.await.unwrap());
        }
        scores.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(scores, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(store.zset_max("sessions:available").await.unwrap(), None);
    }
}
