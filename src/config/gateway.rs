//! Gateway configuration: the player-facing endpoint and per-connection timeouts.

use serde::{Deserialize, Serialize};

use super::defaults::{default_gateway_port, default_hello_timeout_ms, default_player_ttl_s};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_port")]
    pub gateway_port: u16,
    /// Deadline for the HELLO handshake after a connection opens.
    #[serde(default = "default_hello_timeout_ms")]
    pub hello_timeout_ms: u64,
    /// TTL refreshed on every write to a player record.
    #[serde(default = "default_player_ttl_s")]
    pub player_ttl_s: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_port: default_gateway_port(),
            hello_timeout_ms: default_hello_timeout_ms(),
            player_ttl_s: default_player_ttl_s(),
        }
    }
}
