//! Shared domain types: identifiers, state enums, store-backed records, and the
//! player-facing wire protocol.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PlayerId = Uuid;
pub type GameId = Uuid;

/// A session runner's identity. Stable across restarts (derived from configuration or
/// hostname), not a fresh UUID per process the way player/game IDs are.
pub type SessionId = String;

/// Player lifecycle state. Ordered so that `>` matches the monotone-state rule: a write
/// must never move a player from `Ready`/`InGame` down to `InLobby` except through the
/// roles explicitly allowed to do so (matchmaker, session runner, reaper).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerState {
    InLobby,
    Ready,
    InGame,
}

impl PlayerState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InLobby => "IN_LOBBY",
            Self::Ready => "READY",
            Self::InGame => "IN_GAME",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN_LOBBY" => Some(Self::InLobby),
            "READY" => Some(Self::Ready),
            "IN_GAME" => Some(Self::InGame),
            _ => None,
        }
    }
}

/// A player record as stored under `player:{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub state: PlayerState,
    pub heartbeat_at: i64,
    pub game_id: Option<GameId>,
    pub session_id: Option<SessionId>,
}

impl Player {
    pub fn new_in_lobby(id: PlayerId, now_ms: i64) -> Self {
        Self {
            id,
            state: PlayerState::InLobby,
            heartbeat_at: now_ms,
            game_id: None,
            session_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameState {
    Running,
    Finished,
}

impl GameState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(Self::Running),
            "FINISHED" => Some(Self::Finished),
            _ => None,
        }
    }
}

/// A game record as stored under `game:{id}`, paired with the `game:{id}:players` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub session_id: SessionId,
    pub state: GameState,
    pub started_at: i64,
    pub end_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub players: Vec<PlayerId>,
}

/// A session runner's placement capacity, stored under `session:{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub max_slots: u32,
    pub active_games: u32,
    pub game_ids: Vec<GameId>,
    pub updated_at: i64,
}

impl Session {
    pub fn available_slots(&self) -> u32 {
        self.max_slots.saturating_sub(self.active_games)
    }
}

/// Capacity provider backend runner status, returned by `CapacityBackend::list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerStatus {
    pub id: SessionId,
    pub healthy: bool,
}

/// Messages a player sends over the gateway's bidirectional stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    Hello {
        #[serde(default)]
        player_id: Option<PlayerId>,
    },
    ReadyUp,
    Unready,
    Heartbeat,
    Leave,
}

/// Messages the gateway sends back over the bidirectional stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    Welcome {
        player_id: PlayerId,
    },
    State {
        state: PlayerState,
    },
    MatchFound {
        game_id: GameId,
        session_id: SessionId,
    },
    MatchEnded {
        game_id: GameId,
        session_id: SessionId,
    },
    Error {
        code: &'static str,
        message: String,
    },
}

/// Payload published on `events:match_found` and `events:match_ended`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEvent {
    pub game_id: GameId,
    pub session_id: SessionId,
    pub player_ids: Vec<PlayerId>,
}

pub const TOPIC_MATCH_FOUND: &str = "events:match_found";
pub const TOPIC_MATCH_ENDED: &str = "events:match_ended";

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_state_ordering_is_monotone() {
        assert!(PlayerState::Ready > PlayerState::InLobby);
        assert!(PlayerState::InGame > PlayerState::Ready);
    }

    #[test]
    fn player_state_round_trips_through_str() {
        for s in [PlayerState::InLobby, PlayerState::Ready, PlayerState::InGame] {
            assert_eq!(PlayerState::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn available_slots_saturates() {
        let session = Session {
            id: "session-1".into(),
            max_slots: 2,
            active_games: 5,
            game_ids: vec![],
            updated_at: 0,
        };
        assert_eq!(session.available_slots(), 0);
    }
}
