//! Axum router: a single WebSocket upgrade endpoint plus a liveness probe for the
//! read-only observability façade to poll.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::store::CoordinationStore;

use super::connection::handle_socket;
use super::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct GatewayState {
    pub store: Arc<dyn CoordinationStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub config: GatewayConfig,
}

pub fn create_router(state: GatewayState) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<GatewayState>,
) -> Response {
    tracing::debug!(%addr, "accepting gateway connection");
    ws.on_upgrade(move |socket| handle_socket(socket, state.store, state.registry, state.config))
}

async fn health_check() -> &'static str {
    "OK"
}
