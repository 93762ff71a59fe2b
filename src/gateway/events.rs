//! Forwards `events:match_found`/`events:match_ended` to locally-connected players.
//! Delivery is best-effort: a player not connected to this gateway is silently skipped,
//! and a lagged subscriber just misses the events it fell behind on rather than stalling
//! the whole gateway.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;

use crate::model::{MatchEvent, PlayerState, ServerMessage, TOPIC_MATCH_ENDED, TOPIC_MATCH_FOUND};
use crate::store::CoordinationStore;

use super::registry::ConnectionRegistry;

async fn next_event(rx: &mut broadcast::Receiver<String>) -> Option<MatchEvent> {
    loop {
        match rx.recv().await {
            Ok(payload) => match serde_json::from_str::<MatchEvent>(&payload) {
                Ok(event) => return Some(event),
                Err(err) => {
                    warn!(error = %err, "dropping malformed event payload");
                    continue;
                }
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "gateway event subscriber lagged, events dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// Runs until the underlying store closes both topic channels (normally: forever, since
/// the role only exits when the process does).
pub async fn run(store: Arc<dyn CoordinationStore>, registry: Arc<ConnectionRegistry>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut found_rx = store.subscribe(TOPIC_MATCH_FOUND);
    let mut ended_rx = store.subscribe(TOPIC_MATCH_ENDED);

    loop {
        tokio::select! {
            event = next_event(&mut found_rx) => {
                let Some(event) = event else { return; };
                for player_id in &event.player_ids {
                    registry.try_send(player_id, ServerMessage::MatchFound {
                        game_id: event.game_id,
                        session_id: event.session_id.clone(),
                    });
                    registry.try_send(player_id, ServerMessage::State { state: PlayerState::InGame });
                }
            }
            event = next_event(&mut ended_rx) => {
                let Some(event) = event else { return; };
                for player_id in &event.player_ids {
                    registry.try_send(player_id, ServerMessage::MatchEnded {
                        game_id: event.game_id,
                        session_id: event.session_id.clone(),
                    });
                    registry.try_send(player_id, ServerMessage::State { state: PlayerState::InLobby });
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}
