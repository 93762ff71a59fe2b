//! Watches demand and provisions/decommissions session runners against a pluggable
//! backend. The sole role allowed to delete `session:{id}` records and to rewrite
//! `sessions:available` wholesale (every other role only ever adjusts its own slot via
//! incremental upsert/remove).

pub mod backend;
pub mod policy;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::CapacityConfig;
use crate::metrics::Metrics;
use crate::model::now_ms;
use crate::store::{keys, CoordinationStore, StoreResult};

use self::backend::CapacityBackend;
use self::policy::DemandSnapshot;

/// In-process state the policy needs to remember across ticks: the scale-up cooldown
/// clock and the sustained-low-usage timer for scale-down. Not persisted in the store —
/// a restarted capacity provider simply re-observes demand and re-arms both timers,
/// which is safe because neither timer gates correctness, only pacing.
pub(crate) struct ProviderState {
    last_scale_up_at: Option<i64>,
    low_usage_since: Option<i64>,
}

impl ProviderState {
    pub(crate) const fn new() -> Self {
        Self {
            last_scale_up_at: None,
            low_usage_since: None,
        }
    }
}

/// Reconcile the store against `backend.list()`, then sample demand. Returns the demand
/// snapshot computed *after* reconciliation so scaling decisions see accurate state.
async fn reconcile_and_sample(
    store: &dyn CoordinationStore,
    backend: &dyn CapacityBackend,
) -> StoreResult<DemandSnapshot> {
    let session_keys = store.scan_prefix(keys::SESSION_PREFIX).await?;
    let backend_runners = match backend.list().await {
        Ok(runners) => Some(runners),
        Err(err) => {
            warn!(error = %err, "capacity backend list() failed, skipping reconciliation this tick");
            None
        }
    };

    if let Some(runners) = &backend_runners {
        if runners.is_empty() && !session_keys.is_empty() {
            warn!("backend.list() returned empty with sessions on record, skipping deletion (reconciliation guard)");
        } else if !runners.is_empty() {
            let known: std::collections::HashSet<&str> =
                runners.iter().map(|r| r.id.as_str()).collect();
            for key in &session_keys {
                let Some(id) = key.strip_prefix(keys::SESSION_PREFIX) else {
                    continue;
                };
                if !known.contains(id) {
                    store.delete(key).await?;
                    store.zset_remove(keys::SESSIONS_AVAILABLE, id).await?;
                    debug!(session_id = id, "reconciliation removed session absent from backend");
                }
            }
        }
    }

    let session_keys = store.scan_prefix(keys::SESSION_PREFIX).await?;
    let fields = store.hgetall_many(&session_keys).await?;

    let mut total_slots = 0u32;
    let mut used_slots = 0u32;
    for (key, record) in &fields {
        let Some(id) = key.strip_prefix(keys::SESSION_PREFIX) else {
            continue;
        };
        let max_slots: u32 = record.get("max_slots").and_then(|v| v.parse().ok()).unwrap_or(0);
        let active_games: u32 = record.get("active_games").and_then(|v| v.parse().ok()).unwrap_or(0);
        total_slots += max_slots;
        used_slots += active_games;

        let available = max_slots.saturating_sub(active_games);
        if available > 0 {
            store.zset_upsert(keys::SESSIONS_AVAILABLE, id, f64::from(available)).await?;
        } else {
            store.zset_remove(keys::SESSIONS_AVAILABLE, id).await?;
        }
    }

    let queue_length = store.list_snapshot(keys::QUEUE_READY).await?.len();

    Ok(DemandSnapshot {
        queue_length,
        total_sessions: fields.len() as u32,
        total_slots,
        used_slots,
    })
}

fn idle_session_ids_desc(fields: &HashMap<String, crate::store::Fields>) -> Vec<String> {
    let mut ids: Vec<String> = fields
        .iter()
        .filter(|(_, record)| {
            record
                .get("active_games")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(0)
                == 0
        })
        .filter_map(|(key, _)| key.strip_prefix(keys::SESSION_PREFIX).map(str::to_string))
        .collect();
    ids.sort_unstable_by(|a, b| b.cmp(a));
    ids
}

pub(crate) async fn run_tick(
    store: &dyn CoordinationStore,
    backend: &dyn CapacityBackend,
    config: &CapacityConfig,
    players_per_game: u32,
    state: &mut ProviderState,
    metrics: &Metrics,
) -> StoreResult<()> {
    let demand = reconcile_and_sample(store, backend).await?;
    let now = now_ms();

    let bootstrap = policy::bootstrap_count(&demand, config);
    let starvation = policy::starvation_override_count(&demand, players_per_game, config);
    let cooldown_elapsed = state
        .last_scale_up_at
        .is_none_or(|t| now - t >= config.scale_up_cooldown_ms as i64);
    let threshold = if cooldown_elapsed {
        policy::scale_up_count(&demand, players_per_game, config)
    } else {
        0
    };

    let to_create = if bootstrap > 0 {
        bootstrap
    } else if starvation > 0 {
        starvation
    } else {
        threshold
    };

    if to_create > 0 {
        for _ in 0..to_create {
            let id = format!("session-{}", Uuid::new_v4());
            match backend.create(&id).await {
                Ok(()) => info!(session_id = %id, "capacity provider requested new session runner"),
                Err(err) => warn!(session_id = %id, error = %err, "failed to provision session runner"),
            }
        }
        state.last_scale_up_at = Some(now);
        metrics.scale_up_events.fetch_add(u64::from(to_create), Ordering::Relaxed);
    }

    if policy::is_low_usage(&demand, config) {
        let since = *state.low_usage_since.get_or_insert(now);
        if now - since >= config.scale_down_cooldown_ms as i64 {
            let to_destroy = policy::scale_down_count(&demand, config);
            if to_destroy > 0 {
                let session_keys = store.scan_prefix(keys::SESSION_PREFIX).await?;
                let fields = store.hgetall_many(&session_keys).await?;
                let candidates = idle_session_ids_desc(&fields);
                for id in candidates.into_iter().take(to_destroy as usize) {
                    if let Err(err) = backend.destroy(&id).await {
                        warn!(session_id = %id, error = %err, "failed to destroy session runner");
                        continue;
                    }
                    store.delete(&keys::session(&id)).await?;
                    store.zset_remove(keys::SESSIONS_AVAILABLE, &id).await?;
                    info!(session_id = %id, "capacity provider destroyed idle session runner");
                }
                metrics.scale_down_events.fetch_add(u64::from(to_destroy), Ordering::Relaxed);
            }
        }
    } else {
        state.low_usage_since = None;
    }

    Ok(())
}

/// The capacity provider role's main loop.
pub async fn run(
    store: Arc<dyn CoordinationStore>,
    backend: Arc<dyn CapacityBackend>,
    config: CapacityConfig,
    players_per_game: u32,
    metrics: Arc<Metrics>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    info!(poll_ms = config.capacity_poll_ms, "capacity provider role starting");
    let period = Duration::from_millis(config.capacity_poll_ms);
    let mut state = ProviderState::new();

    loop {
        if *shutdown.borrow() {
            return;
        }

        if let Err(err) = run_tick(store.as_ref(), backend.as_ref(), &config, players_per_game, &mut state, &metrics).await {
            warn!(error = %err, "capacity provider tick failed");
        }

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = shutdown.changed() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use std::collections::HashMap as StdHashMap;

    fn session_fields(max_slots: u32, active_games: u32) -> crate::store::Fields {
        let mut f = StdHashMap::new();
        f.insert("max_slots".to_string(), max_slots.to_string());
        f.insert("active_games".to_string(), active_games.to_string());
        f.insert("game_ids".to_string(), String::new());
        f
    }

    #[tokio::test]
    async fn bootstrap_creates_runners_when_below_min_sessions() {
        let store = InMemoryStore::new();
        let backend = backend::InMemoryCapacityBackend::new();
        let config = CapacityConfig {
            min_sessions: 2,
            ..CapacityConfig::default()
        };
        let mut state = ProviderState::new();
        let metrics = Metrics::new();

        run_tick(&store, &backend, &config, 10, &mut state, &metrics).await.unwrap();

        assert_eq!(backend.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reconciliation_removes_sessions_absent_from_backend() {
        let store = InMemoryStore::new();
        store
            .hset(&keys::session("ghost"), session_fields(5, 0), None)
            .await
            .unwrap();
        store.zset_upsert(keys::SESSIONS_AVAILABLE, "ghost", 5.0).await.unwrap();

        let backend = backend::InMemoryCapacityBackend::new();
        backend.create("session-real").await.unwrap();
        store
            .hset(&keys::session("session-real"), session_fields(5, 0), None)
            .await
            .unwrap();

        let config = CapacityConfig { min_sessions: 0, ..CapacityConfig::default() };
        let mut state = ProviderState::new();
        let metrics = Metrics::new();
        run_tick(&store, &backend, &config, 10, &mut state, &metrics).await.unwrap();

        assert!(store.hgetall(&keys::session("ghost")).await.unwrap().is_none());
        assert!(store.hgetall(&keys::session("session-real")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_backend_list_guards_against_deleting_sessions() {
        let store = InMemoryStore::new();
        store
            .hset(&keys::session("s1"), session_fields(5, 0), None)
            .await
            .unwrap();

        let backend = backend::InMemoryCapacityBackend::new();
        let config = CapacityConfig { min_sessions: 0, ..CapacityConfig::default() };
        let mut state = ProviderState::new();
        let metrics = Metrics::new();
        run_tick(&store, &backend, &config, 10, &mut state, &metrics).await.unwrap();

        assert!(store.hgetall(&keys::session("s1")).await.unwrap().is_some());
    }
}
