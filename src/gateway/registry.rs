//! Local connection registry: which players are connected to *this* gateway process,
//! keyed by player ID. Used only to route `events:match_found`/`events:match_ended`
//! notifications to locally-connected sockets; the coordination store is the source of
//! truth for player state, not this map.

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::model::{PlayerId, ServerMessage};

#[derive(Default)]
pub struct ConnectionRegistry {
    clients: DashMap<PlayerId, mpsc::Sender<ServerMessage>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, player_id: PlayerId, sender: mpsc::Sender<ServerMessage>) {
        self.clients.insert(player_id, sender);
    }

    pub fn remove(&self, player_id: &PlayerId) {
        self.clients.remove(player_id);
    }

    /// Best-effort delivery: a full channel or a missing player is silently skipped, the
    /// way the design calls for ("players not connected to this gateway are silently
    /// skipped").
    pub fn try_send(&self, player_id: &PlayerId, message: ServerMessage) {
        if let Some(entry) = self.clients.get(player_id) {
            let _ = entry.try_send(message);
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn try_send_skips_unknown_players_silently() {
        let registry = ConnectionRegistry::new();
        registry.try_send(&Uuid::new_v4(), ServerMessage::State { state: crate::model::PlayerState::Ready });
    }

    #[tokio::test]
    async fn try_send_delivers_to_registered_connection() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(4);
        registry.insert(id, tx);

        registry.try_send(&id, ServerMessage::Welcome { player_id: id });
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, ServerMessage::Welcome { .. }));

        registry.remove(&id);
        assert!(registry.is_empty());
    }
}
