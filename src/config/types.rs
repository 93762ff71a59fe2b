//! Root configuration type.

use serde::{Deserialize, Serialize};

use super::capacity::CapacityConfig;
use super::gateway::GatewayConfig;
use super::logging::LoggingConfig;
use super::matchmaker::MatchmakerConfig;
use super::reaper::ReaperConfig;
use super::session::SessionConfig;
use super::store::StoreConfig;

/// Root configuration struct.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub matchmaker: MatchmakerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub reaper: ReaperConfig,
    #[serde(default)]
    pub capacity: CapacityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}
