//! Accepts player connections over WebSocket, tracks per-connection identity, and
//! forwards lifecycle events. The only role with a player-facing listening socket; every
//! other role talks exclusively to the coordination store.

pub mod connection;
pub mod dispatch;
pub mod events;
pub mod registry;
pub mod router;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::config::GatewayConfig;
use crate::store::CoordinationStore;

use registry::ConnectionRegistry;
use router::GatewayState;

/// The gateway role's entry point: binds the player-facing listener and runs the
/// event-forwarding task side by side, both honoring the shared shutdown signal.
pub async fn run(
    store: Arc<dyn CoordinationStore>,
    config: GatewayConfig,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let registry = Arc::new(ConnectionRegistry::new());
    let state = GatewayState {
        store: store.clone(),
        registry: registry.clone(),
        config: config.clone(),
    };

    let events_shutdown = shutdown.clone();
    let events_task = tokio::spawn(events::run(store, registry, events_shutdown));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.gateway_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "gateway role starting");

    let app = router::create_router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    events_task.abort();
    Ok(())
}
