//! Key-family helpers. Centralizing the string formats here keeps every role's key
//! construction byte-for-byte consistent, the way the teacher centralizes room-code and
//! relay-topic formatting helpers rather than inlining `format!` calls at call sites.

use crate::model::{GameId, PlayerId};

pub fn player(id: PlayerId) -> String {
    format!("player:{id}")
}

pub const PLAYER_PREFIX: &str = "player:";

pub const QUEUE_READY: &str = "queue:ready";

pub fn session(id: &str) -> String {
    format!("session:{id}")
}

pub const SESSION_PREFIX: &str = "session:";

pub const SESSIONS_AVAILABLE: &str = "sessions:available";

pub fn game(id: GameId) -> String {
    format!("game:{id}")
}

pub fn game_players(id: GameId) -> String {
    format!("game:{id}:players")
}

pub fn lock_matchmaker() -> &'static str {
    "lock:matchmaker"
}

pub fn lock_finish(game_id: GameId) -> String {
    format!("lock:finish:{game_id}")
}
