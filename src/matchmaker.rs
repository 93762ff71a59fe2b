//! Forms fixed-size batches of ready players, reserves session capacity, and materializes
//! games. The fleet-wide `lock:matchmaker` advisory lock bounds wasted work across
//! concurrently running matchmaker instances; it is not what makes reservations safe — the
//! atomic `sessions:available` score bookkeeping in the store does that.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MatchmakerConfig;
use crate::locks::Lock;
use crate::metrics::Metrics;
use crate::model::{now_ms, GameId, MatchEvent, PlayerId, PlayerState, TOPIC_MATCH_FOUND};
use crate::store::{keys, CoordinationStore, StoreResult};

/// Outcome of one pass over the ready queue attempting to assemble a batch of exactly
/// `n` currently-ready players.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub picked: Vec<String>,
    pub returned_to_tail: Vec<String>,
}

/// Classify one popped chunk against a state lookup, the pure core of §4.2.1 step 2.
/// Entries whose state is `READY` go to `picked` until it reaches `n`; anything beyond
/// that (still READY, just surplus) goes to `returned_to_tail` instead of being
/// discarded, since it was a genuinely live player. Anything not READY is dropped as
/// stale.
fn classify_chunk(
    chunk: &[String],
    states: &HashMap<String, PlayerState>,
    n: usize,
    picked: &mut Vec<String>,
    returned_to_tail: &mut Vec<String>,
) {
    for id in chunk {
        let Some(state) = states.get(id) else {
            continue; // player record gone entirely: stale, discard
        };
        if *state != PlayerState::Ready {
            continue;
        }
        if picked.len() < n {
            picked.push(id.clone());
        } else {
            returned_to_tail.push(id.clone());
        }
    }
}

/// Pull up to `n` currently-ready players from `queue:ready`, tolerating stale hints.
/// Implements §4.2.1: pops in growing chunks bounded by `max_pull` total inspections,
/// batch-validates state, and returns any READY surplus (or, on starvation, the whole
/// partial pick) to the tail rather than losing it.
pub async fn collect_ready_batch(
    store: &dyn CoordinationStore,
    n: usize,
    max_pull: usize,
) -> StoreResult<BatchResult> {
    let mut picked = Vec::with_capacity(n);
    let mut returned_to_tail = Vec::new();
    let mut inspected = 0usize;

    while picked.len() < n && inspected < max_pull {
        let want = (2 * (n - picked.len())).min(max_pull - inspected);
        let chunk = store.list_pop_head(keys::QUEUE_READY, want).await?;
        if chunk.is_empty() {
            break;
        }
        inspected += chunk.len();

        let keyed: Vec<String> = chunk
            .iter()
            .filter_map(|id| Uuid::parse_str(id).ok())
            .map(keys::player)
            .collect();
        let fields = store.hgetall_many(&keyed).await?;
        let states: HashMap<String, PlayerState> = chunk
            .iter()
            .filter_map(|id| {
                let uuid = Uuid::parse_str(id).ok()?;
                let f = fields.get(&keys::player(uuid))?;
                let state = PlayerState::parse(f.get("state")?)?;
                Some((id.clone(), state))
            })
            .collect();

        classify_chunk(&chunk, &states, n, &mut picked, &mut returned_to_tail);
    }

    if !returned_to_tail.is_empty() {
        store
            .list_push_tail(keys::QUEUE_READY, &returned_to_tail)
            .await?;
    }

    if picked.len() < n {
        // Starvation: put the partial pick back too and report nothing collected.
        if !picked.is_empty() {
            store.list_push_tail(keys::QUEUE_READY, &picked).await?;
        }
        return Ok(BatchResult {
            picked: Vec::new(),
            returned_to_tail,
        });
    }

    Ok(BatchResult {
        picked,
        returned_to_tail,
    })
}

/// Reserve one slot on the session with the most free capacity. Returns the session ID
/// reserved, or `None` if no session currently has capacity.
async fn reserve_slot(store: &dyn CoordinationStore) -> StoreResult<Option<String>> {
    let Some((session_id, _score)) = store.zset_max(keys::SESSIONS_AVAILABLE).await? else {
        return Ok(None);
    };
    store
        .zset_incr(keys::SESSIONS_AVAILABLE, &session_id, -1.0)
        .await?;
    Ok(Some(session_id))
}

/// Undo a reservation made by [`reserve_slot`] — used when batch collection starves
/// after a slot was already taken.
async fn release_slot(store: &dyn CoordinationStore, session_id: &str) -> StoreResult<()> {
    store
        .zset_incr(keys::SESSIONS_AVAILABLE, session_id, 1.0)
        .await?;
    Ok(())
}

/// Pick a game duration uniformly from a triangular distribution peaked at the midpoint
/// of `[min_seconds, max_seconds]`.
fn sample_duration_seconds(min_seconds: u64, max_seconds: u64) -> u64 {
    if min_seconds >= max_seconds {
        return min_seconds;
    }
    let a = min_seconds as f64;
    let b = max_seconds as f64;
    let mid = (a + b) / 2.0;
    let u: f64 = fastrand::f64();
    let f = (mid - a) / (b - a);
    let sampled = if u < f {
        a + (u * (b - a) * (mid - a)).sqrt()
    } else {
        b - ((1.0 - u) * (b - a) * (b - mid)).sqrt()
    };
    sampled.round().clamp(a, b) as u64
}

/// Materialize a game for `players` on `session_id`: one game hash, one players set, N
/// player-state writes, one session accounting update, then a publish. Not transactional
/// against the store; a crash partway through is reconciled later (§4.2, §7).
async fn materialize_game(
    store: &dyn CoordinationStore,
    session_id: &str,
    players: &[String],
    config: &MatchmakerConfig,
) -> StoreResult<GameId> {
    let game_id = Uuid::new_v4();
    let now = now_ms();
    let duration_s = sample_duration_seconds(config.match_min_seconds, config.match_max_seconds);
    let end_at = now + (duration_s as i64) * 1000;

    let mut game_fields = HashMap::new();
    game_fields.insert("session_id".to_string(), session_id.to_string());
    game_fields.insert("state".to_string(), PlayerState::InGame.as_str().to_string());
    game_fields.insert("started_at".to_string(), now.to_string());
    game_fields.insert("end_at".to_string(), end_at.to_string());
    store.hset(&keys::game(game_id), game_fields, None).await?;

    store
        .list_push_tail(&keys::game_players(game_id), players)
        .await?;

    for player_id in players {
        let Ok(uuid) = Uuid::parse_str(player_id) else {
            continue;
        };
        let mut fields = HashMap::new();
        fields.insert("state".to_string(), PlayerState::InGame.as_str().to_string());
        fields.insert("game_id".to_string(), game_id.to_string());
        fields.insert("session_id".to_string(), session_id.to_string());
        fields.insert("heartbeat_at".to_string(), now.to_string());
        store.hset(&keys::player(uuid), fields, Some(config.player_ttl_s)).await?;
    }

    bump_session_active_games(store, session_id, game_id, 1).await?;

    let event = MatchEvent {
        game_id,
        session_id: session_id.to_string(),
        player_ids: players
            .iter()
            .filter_map(|p| Uuid::parse_str(p).ok())
            .collect::<Vec<PlayerId>>(),
    };
    let payload = serde_json::to_string(&event).map_err(|_| {
        crate::store::StoreError::Malformed(format!("match_found payload for {game_id}"))
    })?;
    store.publish(TOPIC_MATCH_FOUND, payload).await?;

    Ok(game_id)
}

/// Bump `active_games` by `delta` and, for a newly materialized game (`delta > 0`),
/// append `game_id` to `game_ids` -- the only way a session runner in a separate process
/// learns of it, since `SessionRunner::discover` reads nothing else.
async fn bump_session_active_games(
    store: &dyn CoordinationStore,
    session_id: &str,
    game_id: GameId,
    delta: i64,
) -> StoreResult<()> {
    let key = keys::session(session_id);
    if let Some(mut fields) = store.hgetall(&key).await? {
        let active: i64 = fields
            .get("active_games")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let updated = (active + delta).max(0);
        fields.insert("active_games".to_string(), updated.to_string());
        fields.insert("updated_at".to_string(), now_ms().to_string());

        if delta > 0 {
            let mut game_ids = parse_game_ids_field(fields.get("game_ids"));
            if !game_ids.contains(&game_id) {
                game_ids.push(game_id);
            }
            fields.insert(
                "game_ids".to_string(),
                game_ids.iter().map(GameId::to_string).collect::<Vec<_>>().join(","),
            );
        }

        store.hset(&key, fields, None).await?;
    }
    Ok(())
}

fn parse_game_ids_field(raw: Option<&String>) -> Vec<GameId> {
    raw.map(|raw| {
        raw.split(',')
            .filter(|s| !s.is_empty())
            .filter_map(|s| Uuid::parse_str(s).ok())
            .collect()
    })
    .unwrap_or_default()
}

/// One matchmaker tick, run under `lock:matchmaker`: decide a target batch count from
/// queue depth and free capacity, then repeatedly reserve+collect+materialize.
pub async fn run_tick(
    store: &dyn CoordinationStore,
    config: &MatchmakerConfig,
    metrics: &Metrics,
) -> StoreResult<usize> {
    let n = config.players_per_game as usize;
    let queue_len = store.list_snapshot(keys::QUEUE_READY).await?.len();
    if queue_len < n {
        return Ok(0);
    }

    let capacity: usize = store
        .zset_all(keys::SESSIONS_AVAILABLE)
        .await?
        .into_iter()
        .map(|(_, score)| score.max(0.0) as usize)
        .sum();
    let target = (queue_len / n).min(capacity);
    if target == 0 {
        return Ok(0);
    }

    let max_pull = config.max_pull() as usize;
    let mut games_formed = 0;

    for _ in 0..target {
        let Some(session_id) = reserve_slot(store).await? else {
            metrics.slot_reservation_failures.fetch_add(1, Ordering::Relaxed);
            break;
        };

        let batch = collect_ready_batch(store, n, max_pull).await?;
        if batch.picked.len() < n {
            release_slot(store, &session_id).await?;
            metrics.batch_starvations.fetch_add(1, Ordering::Relaxed);
            break;
        }

        let game_id = materialize_game(store, &session_id, &batch.picked, config).await?;
        metrics.games_created.fetch_add(1, Ordering::Relaxed);
        metrics
            .players_matched
            .fetch_add(batch.picked.len() as u64, Ordering::Relaxed);
        games_formed += 1;
        debug!(%game_id, %session_id, players = batch.picked.len(), "game materialized");
    }

    Ok(games_formed)
}

/// The matchmaker role's main loop: acquire the fleet-wide lock, run one tick, release,
/// and sleep according to whether the tick made progress.
pub async fn run(
    store: Arc<dyn CoordinationStore>,
    config: MatchmakerConfig,
    metrics: Arc<Metrics>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let lock = Lock::new(store.clone());
    let lock_ttl = Duration::from_millis(config.matchmaker_lock_ttl_ms);

    info!(players_per_game = config.players_per_game, "matchmaker role starting");

    loop {
        if *shutdown.borrow() {
            return;
        }

        let handle = match lock.acquire("lock:matchmaker", lock_ttl, Duration::from_millis(50)).await {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                metrics.lock_contention.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            Err(err) => {
                warn!(error = %err, "matchmaker lock acquisition failed");
                tokio::time::sleep(Duration::from_millis(config.matchmaker_idle_ms)).await;
                continue;
            }
        };

        let outcome = run_tick(store.as_ref(), &config, &metrics).await;
        if let Err(err) = lock.release(handle).await {
            warn!(error = %err, "failed to release matchmaker lock");
        }

        match outcome {
            Ok(0) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(config.matchmaker_idle_ms)) => {}
                    _ = shutdown.changed() => {}
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "matchmaker tick failed");
                tokio::time::sleep(Duration::from_millis(config.matchmaker_no_capacity_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn states(pairs: &[(&str, PlayerState)]) -> HashMap<String, PlayerState> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn classify_chunk_fills_picked_before_return_to_tail() {
        let chunk = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let st = states(&[
            ("a", PlayerState::Ready),
            ("b", PlayerState::Ready),
            ("c", PlayerState::Ready),
        ]);
        let mut picked = Vec::new();
        let mut returned = Vec::new();
        classify_chunk(&chunk, &st, 2, &mut picked, &mut returned);
        assert_eq!(picked, vec!["a", "b"]);
        assert_eq!(returned, vec!["c"]);
    }

    #[test]
    fn classify_chunk_discards_non_ready_and_missing() {
        let chunk = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let st = states(&[("a", PlayerState::InLobby), ("b", PlayerState::Ready)]);
        let mut picked = Vec::new();
        let mut returned = Vec::new();
        classify_chunk(&chunk, &st, 2, &mut picked, &mut returned);
        assert_eq!(picked, vec!["b"]);
        assert!(returned.is_empty());
    }

    #[tokio::test]
    async fn collect_ready_batch_skips_stale_and_drains_queue() {
        let store = InMemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        // A is IN_LOBBY (stale hint), B and C are READY.
        for (id, state) in [(a, PlayerState::InLobby), (b, PlayerState::Ready), (c, PlayerState::Ready)] {
            let mut fields = HashMap::new();
            fields.insert("state".to_string(), state.as_str().to_string());
            store.hset(&keys::player(id), fields, None).await.unwrap();
        }
        store
            .list_push_tail(keys::QUEUE_READY, &[a.to_string(), b.to_string(), c.to_string()])
            .await
            .unwrap();

        let result = collect_ready_batch(&store, 2, 8).await.unwrap();
        assert_eq!(result.picked, vec![b.to_string(), c.to_string()]);
        assert!(store.list_snapshot(keys::QUEUE_READY).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn collect_ready_batch_returns_partial_pick_on_starvation() {
        let store = InMemoryStore::new();
        let a = Uuid::new_v4();
        let mut fields = HashMap::new();
        fields.insert("state".to_string(), PlayerState::Ready.as_str().to_string());
        store.hset(&keys::player(a), fields, None).await.unwrap();
        store
            .list_push_tail(keys::QUEUE_READY, &[a.to_string()])
            .await
            .unwrap();

        let result = collect_ready_batch(&store, 3, 8).await.unwrap();
        assert!(result.picked.is_empty());
        // The partial pick must be put back, not lost (invariant 5).
        assert_eq!(store.list_snapshot(keys::QUEUE_READY).await.unwrap(), vec![a.to_string()]);
    }

    #[tokio::test]
    async fn run_tick_materializes_exact_batch_and_updates_session() {
        let store = InMemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for id in [a, b] {
            let mut fields = HashMap::new();
            fields.insert("state".to_string(), PlayerState::Ready.as_str().to_string());
            store.hset(&keys::player(id), fields, None).await.unwrap();
        }
        store
            .list_push_tail(keys::QUEUE_READY, &[a.to_string(), b.to_string()])
            .await
            .unwrap();

        let mut session_fields = HashMap::new();
        session_fields.insert("max_slots".to_string(), "1".to_string());
        session_fields.insert("active_games".to_string(), "0".to_string());
        store
            .hset(&keys::session("s1"), session_fields, None)
            .await
            .unwrap();
        store.zset_upsert(keys::SESSIONS_AVAILABLE, "s1", 1.0).await.unwrap();

        let config = MatchmakerConfig {
            players_per_game: 2,
            ..MatchmakerConfig::default()
        };
        let metrics = Metrics::new();

        let mut sub = store.subscribe(TOPIC_MATCH_FOUND);
        let formed = run_tick(&store, &config, &metrics).await.unwrap();
        assert_eq!(formed, 1);

        let payload = sub.try_recv().expect("match_found should have been published");
        assert!(payload.contains("s1"));

        let session = store
            .hgetall(&keys::session("s1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.get("active_games").unwrap(), "1");
        assert!(store.zset_max(keys::SESSIONS_AVAILABLE).await.unwrap().is_none());

        let player_a = store.hgetall(&keys::player(a)).await.unwrap().unwrap();
        assert_eq!(player_a.get("state").unwrap(), "IN_GAME");
    }
}
