//! Session runner configuration.

use serde::{Deserialize, Serialize};

use super::defaults::{
    default_finish_lock_ttl_ms, default_player_ttl_s, default_session_max_slots, default_session_poll_ms,
};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Explicit session ID; if unset, derived from the hostname (if it matches
    /// `session-*`) or a freshly minted ID.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_session_max_slots")]
    pub session_max_slots: u32,
    #[serde(default = "default_session_poll_ms")]
    pub session_poll_ms: u64,
    #[serde(default = "default_finish_lock_ttl_ms")]
    pub finish_lock_ttl_ms: u64,
    /// TTL refreshed on every player-record write this role performs (finalization).
    #[serde(default = "default_player_ttl_s")]
    pub player_ttl_s: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: None,
            session_max_slots: default_session_max_slots(),
            session_poll_ms: default_session_poll_ms(),
            finish_lock_ttl_ms: default_finish_lock_ttl_ms(),
            player_ttl_s: default_player_ttl_s(),
        }
    }
}
