//! One process represents one `session:{id}` with `max_slots` concurrent game capacity.
//! Owns discovery of newly handed-off games, liveness checking against `end_at`, and
//! exactly-once finalization guarded by a never-released per-game lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::locks::Lock;
use crate::metrics::Metrics;
use crate::model::{now_ms, GameId, GameState, MatchEvent, TOPIC_MATCH_ENDED};
use crate::store::{keys, CoordinationStore, Fields, StoreResult};

/// A session runner's live view of its own `session:{id}` record plus the set of games
/// it currently tracks locally. Rebuilt from the store on start (crash recovery) and
/// kept current by the discovery pass each loop iteration.
pub struct SessionRunner {
    pub session_id: String,
    pub max_slots: u32,
    tracked_games: HashSet<GameId>,
}

impl SessionRunner {
    /// Start up: read any pre-existing `session:{id}` record, re-adopt RUNNING games
    /// listed in it (crash recovery), and publish availability.
    pub async fn start(
        store: &dyn CoordinationStore,
        session_id: String,
        max_slots: u32,
    ) -> StoreResult<Self> {
        let mut tracked_games = HashSet::new();

        if let Some(existing) = store.hgetall(&keys::session(&session_id)).await? {
            for id in parse_game_ids(&existing) {
                if let Some(game) = store.hgetall(&keys::game(id)).await? {
                    if game.get("state").map(String::as_str) == Some("RUNNING") {
                        tracked_games.insert(id);
                    }
                }
            }
        }

        let runner = Self {
            session_id,
            max_slots,
            tracked_games,
        };
        runner.publish_availability(store).await?;
        Ok(runner)
    }

    pub(crate) fn active_games(&self) -> u32 {
        self.tracked_games.len() as u32
    }

    fn available_slots(&self) -> u32 {
        self.max_slots.saturating_sub(self.active_games())
    }

    /// Atomically rewrite `session:{id}` from the locally tracked game set, then upsert
    /// or remove this session in `sessions:available` based on whether slots remain.
    async fn publish_availability(&self, store: &dyn CoordinationStore) -> StoreResult<()> {
        let mut fields: Fields = HashMap::new();
        fields.insert("max_slots".to_string(), self.max_slots.to_string());
        fields.insert("active_games".to_string(), self.active_games().to_string());
        fields.insert(
            "game_ids".to_string(),
            self.tracked_games
                .iter()
                .map(GameId::to_string)
                .collect::<Vec<_>>()
                .join(","),
        );
        fields.insert("available_slots".to_string(), self.available_slots().to_string());
        fields.insert("updated_at".to_string(), now_ms().to_string());
        store.hset(&keys::session(&self.session_id), fields, None).await?;

        let available = self.available_slots();
        if available > 0 {
            store
                .zset_upsert(keys::SESSIONS_AVAILABLE, &self.session_id, f64::from(available))
                .await?;
        } else {
            store.zset_remove(keys::SESSIONS_AVAILABLE, &self.session_id).await?;
        }
        Ok(())
    }

    /// *Discovery.* Reread `session:{id}.game_ids` and adopt any game listed there but
    /// not yet tracked locally — this is how the matchmaker hands off a freshly
    /// materialized game to this runner.
    pub(crate) async fn discover(&mut self, store: &dyn CoordinationStore) -> StoreResult<()> {
        let Some(record) = store.hgetall(&keys::session(&self.session_id)).await? else {
            return Ok(());
        };
        let mut changed = false;
        for id in parse_game_ids(&record) {
            if self.tracked_games.insert(id) {
                changed = true;
            }
        }
        if changed {
            self.publish_availability(store).await?;
        }
        Ok(())
    }

    /// *Liveness.* For each locally tracked game, check its record. Missing/FINISHED/
    /// malformed games are dropped locally (republishing availability); games past
    /// `end_at` (or missing it, fail-safe) are finalized.
    pub(crate) async fn check_liveness(
        &mut self,
        store: &dyn CoordinationStore,
        lock: &Lock,
        finish_lock_ttl: Duration,
        metrics: &Metrics,
        player_ttl_s: u64,
    ) -> StoreResult<()> {
        let now = now_ms();
        let games: Vec<GameId> = self.tracked_games.iter().copied().collect();
        let mut dropped = false;

        for game_id in games {
            let record = store.hgetall(&keys::game(game_id)).await?;
            let Some(record) = record else {
                self.tracked_games.remove(&game_id);
                dropped = true;
                continue;
            };

            let state = record.get("state").and_then(|s| GameState::parse(s));
            if state != Some(GameState::Running) {
                self.tracked_games.remove(&game_id);
                dropped = true;
                continue;
            }

            let end_at: Option<i64> = record.get("end_at").and_then(|v| v.parse().ok());
            let should_finish = match end_at {
                None => true, // fail-safe: no end_at means finalize immediately
                Some(end_at) => now >= end_at,
            };
            if !should_finish {
                continue;
            }

            match self
                .finalize_game(store, lock, finish_lock_ttl, game_id, &record, metrics, player_ttl_s)
                .await
            {
                Ok(true) => {
                    self.tracked_games.remove(&game_id);
                    dropped = true;
                }
                Ok(false) => {
                    metrics.finish_lock_losses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
                Err(err) => warn!(%game_id, error = %err, "finalization attempt failed"),
            }
        }

        if dropped {
            self.publish_availability(store).await?;
        }
        Ok(())
    }

    /// Finalize one game behind `lock:finish:{game_id}`. Returns `true` if this call
    /// performed the finalization, `false` if another runner already holds the lock.
    async fn finalize_game(
        &self,
        store: &dyn CoordinationStore,
        lock: &Lock,
        finish_lock_ttl: Duration,
        game_id: GameId,
        record: &Fields,
        metrics: &Metrics,
        player_ttl_s: u64,
    ) -> StoreResult<bool> {
        // Lock is deliberately never released — it only expires (§4.3, §9).
        let Some(_handle) = lock.try_acquire(&keys::lock_finish(game_id), finish_lock_ttl).await? else {
            return Ok(false);
        };

        let now = now_ms();
        let mut game_fields = record.clone();
        game_fields.insert("state".to_string(), GameState::Finished.as_str().to_string());
        game_fields.insert("finished_at".to_string(), now.to_string());
        store.hset(&keys::game(game_id), game_fields, None).await?;

        let player_ids_raw = store.list_snapshot(&keys::game_players(game_id)).await?;
        let mut player_ids = Vec::with_capacity(player_ids_raw.len());
        for raw in &player_ids_raw {
            let Ok(uuid) = Uuid::parse_str(raw) else {
                continue;
            };
            player_ids.push(uuid);
            let mut fields: Fields = HashMap::new();
            fields.insert("state".to_string(), crate::model::PlayerState::InLobby.as_str().to_string());
            fields.insert("game_id".to_string(), String::new());
            fields.insert("session_id".to_string(), String::new());
            fields.insert("heartbeat_at".to_string(), now.to_string());
            store.hset(&keys::player(uuid), fields, Some(player_ttl_s)).await?;
        }

        let event = MatchEvent {
            game_id,
            session_id: self.session_id.clone(),
            player_ids,
        };
        let payload = serde_json::to_string(&event).map_err(|_| {
            crate::store::StoreError::Malformed(format!("match_ended payload for {game_id}"))
        })?;
        store.publish(TOPIC_MATCH_ENDED, payload).await?;
        metrics.games_finalized.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        Ok(true)
    }
}

fn parse_game_ids(record: &Fields) -> Vec<GameId> {
    record
        .get("game_ids")
        .map(|raw| {
            raw.split(',')
                .filter(|s| !s.is_empty())
                .filter_map(|s| Uuid::parse_str(s).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// The session runner role's main loop: discovery, then liveness, on a fixed period.
pub async fn run(
    store: Arc<dyn CoordinationStore>,
    config: SessionConfig,
    session_id: String,
    metrics: Arc<Metrics>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut runner = match SessionRunner::start(store.as_ref(), session_id.clone(), config.session_max_slots).await {
        Ok(r) => r,
        Err(err) => {
            warn!(%session_id, error = %err, "session runner failed to start, aborting role");
            return;
        }
    };

    info!(%session_id, max_slots = config.session_max_slots, "session runner role starting");
    let lock = Lock::new(store.clone());
    let finish_lock_ttl = Duration::from_millis(config.finish_lock_ttl_ms);
    let period = Duration::from_millis(config.session_poll_ms);

    loop {
        if *shutdown.borrow() {
            return;
        }

        if let Err(err) = runner.discover(store.as_ref()).await {
            warn!(error = %err, "session discovery pass failed");
        }
        if let Err(err) = runner
            .check_liveness(store.as_ref(), &lock, finish_lock_ttl, &metrics, config.player_ttl_s)
            .await
        {
            warn!(error = %err, "session liveness pass failed");
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

    #[tokio::test]
    async fn start_publishes_availability_with_full_capacity() {
        let store = InMemoryStore::new();
        let runner = SessionRunner::start(&store, "s1".to_string(), 3).await.unwrap();
        assert_eq!(runner.available_slots(), 3);

        let (_member, score) = store.zset_max(keys::SESSIONS_AVAILABLE).await.unwrap().unwrap();
        assert_eq!(score, 3.0);
    }

    #[tokio::test]
    async fn discover_adopts_games_listed_in_session_record() {
        let store = InMemoryStore::new();
        let mut runner = SessionRunner::start(&store, "s1".to_string(), 2).await.unwrap();

        let game_id = Uuid::new_v4();
        let mut fields: Fields = HashMap::new();
        fields.insert("max_slots".to_string(), "2".to_string());
        fields.insert("active_games".to_string(), "1".to_string());
        fields.insert("game_ids".to_string(), game_id.to_string());
        store.hset(&keys::session("s1"), fields, None).await.unwrap();

        runner.discover(&store).await.unwrap();
        assert_eq!(runner.active_games(), 1);
        assert_eq!(runner.available_slots(), 1);
    }

    /// The real hand-off path: a matchmaker tick materializes a game against this
    /// session's own `sessions:available` entry, and discovery must pick it up from
    /// `session:{id}.game_ids` alone -- the two roles never call each other directly.
    #[tokio::test]
    async fn discover_adopts_a_game_materialized_by_a_real_matchmaker_tick() {
        let store = InMemoryStore::new();
        let mut runner = SessionRunner::start(&store, "s1".to_string(), 1).await.unwrap();
        assert_eq!(runner.active_games(), 0);

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for id in [a, b] {
            let mut fields: Fields = HashMap::new();
            fields.insert("state".to_string(), crate::model::PlayerState::Ready.as_str().to_string());
            store.hset(&keys::player(id), fields, None).await.unwrap();
        }
        store
            .list_push_tail(keys::QUEUE_READY, &[a.to_string(), b.to_string()])
            .await
            .unwrap();

        let config = crate::config::MatchmakerConfig {
            players_per_game: 2,
            ..crate::config::MatchmakerConfig::default()
        };
        let metrics = Metrics::new();
        let formed = crate::matchmaker::run_tick(&store, &config, &metrics).await.unwrap();
        assert_eq!(formed, 1);

        // Before discovery, the runner has no idea a game exists.
        assert_eq!(runner.active_games(), 0);

        runner.discover(&store).await.unwrap();
        assert_eq!(runner.active_games(), 1, "runner must adopt the game via session.game_ids alone");
        assert_eq!(runner.available_slots(), 0);

        let session = store.hgetall(&keys::session("s1")).await.unwrap().unwrap();
        let game_id = *runner.tracked_games.iter().next().unwrap();
        assert!(session.get("game_ids").unwrap().contains(&game_id.to_string()));
    }

    #[tokio::test]
    async fn finalize_restores_players_and_publishes_match_ended_exactly_once() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryStore::new());
        let mut runner = SessionRunner::start(store.as_ref(), "s1".to_string(), 1)
            .await
            .unwrap();

        let game_id = Uuid::new_v4();
        let player = Uuid::new_v4();
        let mut game_fields: Fields = HashMap::new();
        game_fields.insert("session_id".to_string(), "s1".to_string());
        game_fields.insert("state".to_string(), "RUNNING".to_string());
        game_fields.insert("started_at".to_string(), "0".to_string());
        game_fields.insert("end_at".to_string(), "0".to_string());
        store.hset(&keys::game(game_id), game_fields, None).await.unwrap();
        store
            .list_push_tail(&keys::game_players(game_id), &[player.to_string()])
            .await
            .unwrap();

        let mut session_fields: Fields = HashMap::new();
        session_fields.insert("game_ids".to_string(), game_id.to_string());
        store.hset(&keys::session("s1"), session_fields, None).await.unwrap();

        let mut player_fields: Fields = HashMap::new();
        player_fields.insert("state".to_string(), "IN_GAME".to_string());
        player_fields.insert("game_id".to_string(), game_id.to_string());
        player_fields.insert("session_id".to_string(), "s1".to_string());
        store.hset(&keys::player(player), player_fields, None).await.unwrap();

        let lock = Lock::new(store.clone());
        let metrics = Metrics::new();

        let mut sub = store.subscribe(TOPIC_MATCH_ENDED);
        runner.discover(store.as_ref()).await.unwrap();
        runner
            .check_liveness(store.as_ref(), &lock, Duration::from_secs(5), &metrics, 120)
            .await
            .unwrap();

        assert!(!runner.tracked_games.contains(&game_id));
        let game = store.hgetall(&keys::game(game_id)).await.unwrap().unwrap();
        assert_eq!(game.get("state").unwrap(), "FINISHED");

        let updated_player = store.hgetall(&keys::player(player)).await.unwrap().unwrap();
        assert_eq!(updated_player.get("state").unwrap(), "IN_LOBBY");
        assert_eq!(updated_player.get("game_id").unwrap(), "");

        sub.try_recv().expect("match_ended should have been published");
        assert!(sub.try_recv().is_err(), "match_ended must be published exactly once");
    }

    #[tokio::test]
    async fn two_runners_racing_the_same_overdue_game_finalize_exactly_once() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryStore::new());

        let game_id = Uuid::new_v4();
        let mut game_fields: Fields = HashMap::new();
        game_fields.insert("session_id".to_string(), "s1".to_string());
        game_fields.insert("state".to_string(), "RUNNING".to_string());
        game_fields.insert("started_at".to_string(), "0".to_string());
        game_fields.insert("end_at".to_string(), "0".to_string());
        store.hset(&keys::game(game_id), game_fields, None).await.unwrap();

        let mut session_fields: Fields = HashMap::new();
        session_fields.insert("game_ids".to_string(), game_id.to_string());
        store.hset(&keys::session("s1"), session_fields, None).await.unwrap();

        let mut sub = store.subscribe(TOPIC_MATCH_ENDED);

        // Two independently-started runner instances, both believing they own "s1" --
        // standing in for two processes racing after a crash/restart overlap.
        let mut runner_a = SessionRunner::start(store.as_ref(), "s1".to_string(), 1).await.unwrap();
        let mut runner_b = SessionRunner::start(store.as_ref(), "s1".to_string(), 1).await.unwrap();
        assert!(runner_a.tracked_games.contains(&game_id));
        assert!(runner_b.tracked_games.contains(&game_id));

        let lock = Lock::new(store.clone());
        let metrics = Metrics::new();
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        let (store_a, store_b) = (store.clone(), store.clone());
        let (barrier_a, barrier_b) = (barrier.clone(), barrier.clone());
        let ttl = Duration::from_secs(5);
        let result_a = tokio::spawn(async move {
            barrier_a.wait().await;
            runner_a.check_liveness(store_a.as_ref(), &lock, ttl, &metrics, 120).await.unwrap();
            runner_a
        });
        let lock_b = Lock::new(store.clone());
        let metrics_b = Metrics::new();
        let result_b = tokio::spawn(async move {
            barrier_b.wait().await;
            runner_b.check_liveness(store_b.as_ref(), &lock_b, ttl, &metrics_b, 120).await.unwrap();
            runner_b
        });

        let (runner_a, runner_b) = tokio::try_join!(result_a, result_b).unwrap();
        assert!(!runner_a.tracked_games.contains(&game_id));
        assert!(!runner_b.tracked_games.contains(&game_id));

        let game = store.hgetall(&keys::game(game_id)).await.unwrap().unwrap();
        assert_eq!(game.get("state").unwrap(), "FINISHED");

        sub.try_recv().expect("match_ended should have been published exactly once");
        assert!(sub.try_recv().is_err(), "only one of the two runners may finalize");
    }
}
