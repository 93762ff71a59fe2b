//! Reaper configuration.

use serde::{Deserialize, Serialize};

use super::defaults::{default_reaper_period_ms, default_skip_reset_if_in_game, default_stale_ms};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReaperConfig {
    #[serde(default = "default_reaper_period_ms")]
    pub reaper_period_ms: u64,
    #[serde(default = "default_stale_ms")]
    pub stale_ms: u64,
    /// Open question from the design notes: whether the player-hygiene pass should leave
    /// `game_id`/`session_id` alone for a player whose state is IN_GAME even if their
    /// heartbeat is stale, instead of resetting those fields unconditionally. Defaults to
    /// `false` to match documented current behavior.
    #[serde(default = "default_skip_reset_if_in_game")]
    pub skip_reset_if_in_game: bool,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            reaper_period_ms: default_reaper_period_ms(),
            stale_ms: default_stale_ms(),
            skip_reset_if_in_game: default_skip_reset_if_in_game(),
        }
    }
}
