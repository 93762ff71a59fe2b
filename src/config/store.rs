//! Coordination-store location. The in-memory backend shipped by this core ignores these
//! fields (there is no network hop to make), but they are accepted and validated so that a
//! networked backend can be dropped in behind the same `CoordinationStore` trait without a
//! config-format migration.

use serde::{Deserialize, Serialize};

use super::defaults::{default_redis_host, default_redis_port};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_redis_host")]
    pub redis_host: String,
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
        }
    }
}
