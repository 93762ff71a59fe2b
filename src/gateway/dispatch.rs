//! Pure store operations behind each client message. Kept free of any WebSocket/axum
//! type so they can be unit-tested against an `InMemoryStore` without a live socket.

use std::collections::HashMap;

use uuid::Uuid;

use crate::model::{now_ms, PlayerId, PlayerState};
use crate::store::{keys, CoordinationStore, Fields, StoreResult};

/// `HELLO`: assign identity (client-supplied or freshly minted) and write `player:{id}`
/// with `state=IN_LOBBY`, respecting the monotone-state rule — a record that already
/// exists in READY or IN_GAME is not downgraded.
pub async fn handle_hello(
    store: &dyn CoordinationStore,
    requested_id: Option<PlayerId>,
    player_ttl_s: u64,
) -> StoreResult<(PlayerId, PlayerState)> {
    let player_id = requested_id.unwrap_or_else(Uuid::new_v4);
    let key = keys::player(player_id);
    let existing_state = store
        .hgetall(&key)
        .await?
        .and_then(|f| f.get("state").and_then(|s| PlayerState::parse(s)));

    let state = match existing_state {
        Some(current) if current > PlayerState::InLobby => current,
        _ => PlayerState::InLobby,
    };

    let mut fields: Fields = HashMap::new();
    fields.insert("state".to_string(), state.as_str().to_string());
    fields.insert("heartbeat_at".to_string(), now_ms().to_string());
    store.hset(&key, fields, Some(player_ttl_s)).await?;
    Ok((player_id, state))
}

/// `READY_UP`: set `state=READY` and append to `queue:ready`. Duplicate READY_UPs
/// produce duplicate queue entries by design; they are collapsed at consumption time.
pub async fn handle_ready_up(store: &dyn CoordinationStore, player_id: PlayerId, player_ttl_s: u64) -> StoreResult<()> {
    let mut fields: Fields = HashMap::new();
    fields.insert("state".to_string(), PlayerState::Ready.as_str().to_string());
    fields.insert("heartbeat_at".to_string(), now_ms().to_string());
    store.hset(&keys::player(player_id), fields, Some(player_ttl_s)).await?;
    store.list_push_tail(keys::QUEUE_READY, &[player_id.to_string()]).await
}

/// `UNREADY`: set `state=IN_LOBBY`. Removal from the queue is lazy (left to the reaper
/// and to consumption-time state checks).
pub async fn handle_unready(store: &dyn CoordinationStore, player_id: PlayerId, player_ttl_s: u64) -> StoreResult<()> {
    let mut fields: Fields = HashMap::new();
    fields.insert("state".to_string(), PlayerState::InLobby.as_str().to_string());
    fields.insert("heartbeat_at".to_string(), now_ms().to_string());
    store.hset(&keys::player(player_id), fields, Some(player_ttl_s)).await
}

/// `HEARTBEAT`: refresh `heartbeat_at`. If the record is missing entirely (race with
/// HELLO or TTL expiry) it is re-created in `IN_LOBBY`.
pub async fn handle_heartbeat(store: &dyn CoordinationStore, player_id: PlayerId, player_ttl_s: u64) -> StoreResult<()> {
    let key = keys::player(player_id);
    let existing = store.hgetall(&key).await?;
    let mut fields: Fields = existing.unwrap_or_default();
    fields
        .entry("state".to_string())
        .or_insert_with(|| PlayerState::InLobby.as_str().to_string());
    fields.insert("heartbeat_at".to_string(), now_ms().to_string());
    store.hset(&key, fields, Some(player_ttl_s)).await
}

/// `LEAVE`: set `state=IN_LOBBY`. The caller closes the connection separately.
pub async fn handle_leave(store: &dyn CoordinationStore, player_id: PlayerId, player_ttl_s: u64) -> StoreResult<()> {
    handle_unready(store, player_id, player_ttl_s).await
}

/// Connection-close cleanup when the client disconnected without sending `LEAVE`.
/// Monotone: never downgrades a player already READY or IN_GAME.
pub async fn handle_disconnect(store: &dyn CoordinationStore, player_id: PlayerId, player_ttl_s: u64) -> StoreResult<()> {
    let key = keys::player(player_id);
    let existing_state = store
        .hgetall(&key)
        .await?
        .and_then(|f| f.get("state").and_then(|s| PlayerState::parse(s)));

    if matches!(existing_state, Some(s) if s > PlayerState::InLobby) {
        return Ok(());
    }

    let mut fields: Fields = HashMap::new();
    fields.insert("state".to_string(), PlayerState::InLobby.as_str().to_string());
    fields.insert("heartbeat_at".to_string(), now_ms().to_string());
    store.hset(&key, fields, Some(player_ttl_s)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn hello_assigns_fresh_id_when_none_requested() {
        let store = InMemoryStore::new();
        let (id, state) = handle_hello(&store, None, 600).await.unwrap();
        assert_eq!(state, PlayerState::InLobby);
        let record = store.hgetall(&keys::player(id)).await.unwrap().unwrap();
        assert_eq!(record.get("state").unwrap(), "IN_LOBBY");
    }

    #[tokio::test]
    async fn hello_does_not_downgrade_an_already_ready_player() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();
        handle_ready_up(&store, id, 600).await.unwrap();

        let (returned_id, state) = handle_hello(&store, Some(id), 600).await.unwrap();
        assert_eq!(returned_id, id);
        assert_eq!(state, PlayerState::Ready);
        let record = store.hgetall(&keys::player(id)).await.unwrap().unwrap();
        assert_eq!(record.get("state").unwrap(), "READY");
    }

    #[tokio::test]
    async fn ready_up_enqueues_player() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();
        handle_ready_up(&store, id, 600).await.unwrap();
        assert_eq!(store.list_snapshot(keys::QUEUE_READY).await.unwrap(), vec![id.to_string()]);
    }

    #[tokio::test]
    async fn heartbeat_recreates_missing_record_as_in_lobby() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();
        handle_heartbeat(&store, id, 600).await.unwrap();
        let record = store.hgetall(&keys::player(id)).await.unwrap().unwrap();
        assert_eq!(record.get("state").unwrap(), "IN_LOBBY");
    }

    #[tokio::test]
    async fn disconnect_does_not_downgrade_in_game_player() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();
        let mut fields: Fields = HashMap::new();
        fields.insert("state".to_string(), "IN_GAME".to_string());
        store.hset(&keys::player(id), fields, None).await.unwrap();

        handle_disconnect(&store, id, 600).await.unwrap();
        let record = store.hgetall(&keys::player(id)).await.unwrap().unwrap();
        assert_eq!(record.get("state").unwrap(), "IN_GAME");
    }

    #[tokio::test]
    async fn disconnect_resets_lobby_player() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();
        handle_hello(&store, Some(id), 600).await.unwrap();
        handle_disconnect(&store, id, 600).await.unwrap();
        let record = store.hgetall(&keys::player(id)).await.unwrap().unwrap();
        assert_eq!(record.get("state").unwrap(), "IN_LOBBY");
    }
}
