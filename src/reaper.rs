//! Background sweeper of stale player records and stale queue entries. Two independent
//! passes, each safe to run concurrently with every other role.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ReaperConfig;
use crate::metrics::Metrics;
use crate::model::{now_ms, PlayerState};
use crate::store::{keys, CoordinationStore, Fields, StoreResult};

fn heartbeat_is_stale(fields: &Fields, now: i64, stale_ms: u64) -> bool {
    let heartbeat_at: i64 = fields
        .get("heartbeat_at")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    now.saturating_sub(heartbeat_at) > stale_ms as i64
}

/// Snapshot `queue:ready` and remove any entry whose player is no longer READY or whose
/// heartbeat has lapsed. Returns the number of entries evicted.
pub async fn sweep_queue(
    store: &dyn CoordinationStore,
    stale_ms: u64,
) -> StoreResult<usize> {
    let snapshot = store.list_snapshot(keys::QUEUE_READY).await?;
    if snapshot.is_empty() {
        return Ok(0);
    }

    let now = now_ms();
    let keyed: Vec<String> = snapshot
        .iter()
        .filter_map(|id| Uuid::parse_str(id).ok())
        .map(keys::player)
        .collect();
    let fields = store.hgetall_many(&keyed).await?;

    let mut evicted = 0usize;
    for id in &snapshot {
        let stale = match Uuid::parse_str(id).ok().and_then(|uuid| fields.get(&keys::player(uuid))) {
            Some(record) => {
                let state = record.get("state").and_then(|s| PlayerState::parse(s));
                state != Some(PlayerState::Ready) || heartbeat_is_stale(record, now, stale_ms)
            }
            None => true, // record gone entirely: definitely stale
        };
        if stale {
            store.list_remove_value(keys::QUEUE_READY, id).await?;
            evicted += 1;
        }
    }

    Ok(evicted)
}

/// Scan `player:*` and reset any player whose heartbeat has lapsed back to `IN_LOBBY`,
/// clearing `game_id`/`session_id` unless `skip_reset_if_in_game` protects players whose
/// session runner still considers them in-game (the documented resolution of the open
/// question in the design notes).
pub async fn sweep_players(
    store: &dyn CoordinationStore,
    config: &ReaperConfig,
) -> StoreResult<usize> {
    let keys_present = store.scan_prefix(keys::PLAYER_PREFIX).await?;
    if keys_present.is_empty() {
        return Ok(0);
    }

    let fields = store.hgetall_many(&keys_present).await?;
    let now = now_ms();
    let mut reset = 0usize;

    for key in &keys_present {
        let Some(record) = fields.get(key) else {
            continue;
        };
        if !heartbeat_is_stale(record, now, config.stale_ms) {
            continue;
        }

        let state = record.get("state").and_then(|s| PlayerState::parse(s));
        if config.skip_reset_if_in_game && state == Some(PlayerState::InGame) {
            continue;
        }

        let Some(id) = key.strip_prefix(keys::PLAYER_PREFIX) else {
            continue;
        };
        store.list_remove_value(keys::QUEUE_READY, id).await?;

        let mut updated: Fields = HashMap::new();
        updated.insert("state".to_string(), PlayerState::InLobby.as_str().to_string());
        updated.insert("heartbeat_at".to_string(), now.to_string());
        updated.insert("game_id".to_string(), String::new());
        updated.insert("session_id".to_string(), String::new());
        store.hset(key, updated, None).await?;
        reset += 1;
    }

    Ok(reset)
}

/// The reaper role's main loop: run both passes every `reaper_period_ms`.
pub async fn run(
    store: Arc<dyn CoordinationStore>,
    config: ReaperConfig,
    metrics: Arc<Metrics>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    info!(period_ms = config.reaper_period_ms, "reaper role starting");
    let period = Duration::from_millis(config.reaper_period_ms);

    loop {
        if *shutdown.borrow() {
            return;
        }

        match sweep_queue(store.as_ref(), config.stale_ms).await {
            Ok(evicted) => {
                metrics.reaper_queue_sweeps.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                metrics
                    .reaper_entries_evicted
                    .fetch_add(evicted as u64, std::sync::atomic::Ordering::Relaxed);
                debug!(evicted, "reaper queue hygiene pass complete");
            }
            Err(err) => warn!(error = %err, "reaper queue hygiene pass failed"),
        }

        match sweep_players(store.as_ref(), &config).await {
            Ok(reset) => {
                metrics.reaper_player_sweeps.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                debug!(reset, "reaper player hygiene pass complete");
            }
            Err(err) => warn!(error = %err, "reaper player hygiene pass failed"),
        }

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = shutdown.changed() => {}
        }
    }
}
