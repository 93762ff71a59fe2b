//! Matchmaker configuration: batch size, the stale-queue pull cap, game duration bounds,
//! and the poll/lock timings of the main loop.

use serde::{Deserialize, Serialize};

use super::defaults::{
    default_match_max_seconds, default_match_min_seconds, default_matchmaker_idle_ms,
    default_matchmaker_lock_ttl_ms, default_matchmaker_no_capacity_ms, default_max_pull_multiplier,
    default_player_ttl_s, default_players_per_game,
};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MatchmakerConfig {
    /// N: the exact number of players per formed game.
    #[serde(default = "default_players_per_game")]
    pub players_per_game: u32,
    /// MAX_PULL = this × N, the hard cap on queue entries inspected per batch attempt.
    #[serde(default = "default_max_pull_multiplier")]
    pub max_pull_multiplier: u32,
    #[serde(default = "default_match_min_seconds")]
    pub match_min_seconds: u64,
    #[serde(default = "default_match_max_seconds")]
    pub match_max_seconds: u64,
    /// Sleep when the queue has fewer than N entries.
    #[serde(default = "default_matchmaker_idle_ms")]
    pub matchmaker_idle_ms: u64,
    /// Sleep when the queue is long enough but no session has capacity.
    #[serde(default = "default_matchmaker_no_capacity_ms")]
    pub matchmaker_no_capacity_ms: u64,
    #[serde(default = "default_matchmaker_lock_ttl_ms")]
    pub matchmaker_lock_ttl_ms: u64,
    /// TTL refreshed on every player-record write this role performs (game placement).
    #[serde(default = "default_player_ttl_s")]
    pub player_ttl_s: u64,
}

impl Default for MatchmakerConfig {
    fn default() -> Self {
        Self {
            players_per_game: default_players_per_game(),
            max_pull_multiplier: default_max_pull_multiplier(),
            match_min_seconds: default_match_min_seconds(),
            match_max_seconds: default_match_max_seconds(),
            matchmaker_idle_ms: default_matchmaker_idle_ms(),
            matchmaker_no_capacity_ms: default_matchmaker_no_capacity_ms(),
            matchmaker_lock_ttl_ms: default_matchmaker_lock_ttl_ms(),
            player_ttl_s: default_player_ttl_s(),
        }
    }
}

impl MatchmakerConfig {
    pub fn max_pull(&self) -> u32 {
        self.max_pull_multiplier * self.players_per_game
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_pull_is_multiplier_times_batch_size() {
        let cfg = MatchmakerConfig {
            players_per_game: 4,
            max_pull_multiplier: 4,
            ..MatchmakerConfig::default()
        };
        assert_eq!(cfg.max_pull(), 16);
    }
}
