//! Capacity provider configuration: pool bounds and the scale up/down policy knobs.

use serde::{Deserialize, Serialize};

use super::defaults::{
    default_capacity_poll_ms, default_max_sessions, default_min_sessions,
    default_scale_down_batch, default_scale_down_cooldown_ms, default_scale_down_threshold,
    default_scale_up_batch, default_scale_up_cooldown_ms, default_scale_up_threshold,
};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CapacityConfig {
    #[serde(default = "default_min_sessions")]
    pub min_sessions: u32,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u32,
    #[serde(default = "default_scale_up_threshold")]
    pub scale_up_threshold: f64,
    #[serde(default = "default_scale_down_threshold")]
    pub scale_down_threshold: f64,
    #[serde(default = "default_scale_up_cooldown_ms")]
    pub scale_up_cooldown_ms: u64,
    #[serde(default = "default_scale_down_cooldown_ms")]
    pub scale_down_cooldown_ms: u64,
    #[serde(default = "default_scale_up_batch")]
    pub scale_up_batch: u32,
    #[serde(default = "default_scale_down_batch")]
    pub scale_down_batch: u32,
    #[serde(default = "default_capacity_poll_ms")]
    pub capacity_poll_ms: u64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            min_sessions: default_min_sessions(),
            max_sessions: default_max_sessions(),
            scale_up_threshold: default_scale_up_threshold(),
            scale_down_threshold: default_scale_down_threshold(),
            scale_up_cooldown_ms: default_scale_up_cooldown_ms(),
            scale_down_cooldown_ms: default_scale_down_cooldown_ms(),
            scale_up_batch: default_scale_up_batch(),
            scale_down_batch: default_scale_down_batch(),
            capacity_poll_ms: default_capacity_poll_ms(),
        }
    }
}
