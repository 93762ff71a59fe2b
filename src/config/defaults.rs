//! Default value functions for configuration fields, one per `#[serde(default = ...)]`
//! attribute, organized by section to mirror the layout of `spec.md` §6.

use super::logging::LogFormat;

// =============================================================================
// Store
// =============================================================================

pub fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

pub const fn default_redis_port() -> u16 {
    6379
}

// =============================================================================
// Gateway
// =============================================================================

pub const fn default_gateway_port() -> u16 {
    7800
}

pub const fn default_hello_timeout_ms() -> u64 {
    10_000
}

pub const fn default_player_ttl_s() -> u64 {
    600
}

// =============================================================================
// Matchmaker
// =============================================================================

pub const fn default_players_per_game() -> u32 {
    100
}

pub const fn default_max_pull_multiplier() -> u32 {
    4
}

pub const fn default_match_min_seconds() -> u64 {
    30
}

pub const fn default_match_max_seconds() -> u64 {
    300
}

pub const fn default_matchmaker_idle_ms() -> u64 {
    250
}

pub const fn default_matchmaker_no_capacity_ms() -> u64 {
    500
}

pub const fn default_matchmaker_lock_ttl_ms() -> u64 {
    5_000
}

// =============================================================================
// Session runner
// =============================================================================

pub const fn default_session_poll_ms() -> u64 {
    500
}

pub const fn default_session_max_slots() -> u32 {
    5
}

pub const fn default_finish_lock_ttl_ms() -> u64 {
    5_000
}

// =============================================================================
// Reaper
// =============================================================================

pub const fn default_reaper_period_ms() -> u64 {
    5_000
}

pub const fn default_stale_ms() -> u64 {
    30_000
}

pub const fn default_skip_reset_if_in_game() -> bool {
    false
}

// =============================================================================
// Capacity provider
// =============================================================================

pub const fn default_min_sessions() -> u32 {
    1
}

pub const fn default_max_sessions() -> u32 {
    10
}

pub const fn default_scale_up_threshold() -> f64 {
    0.8
}

pub const fn default_scale_down_threshold() -> f64 {
    0.3
}

pub const fn default_scale_up_cooldown_ms() -> u64 {
    30_000
}

pub const fn default_scale_down_cooldown_ms() -> u64 {
    300_000
}

pub const fn default_scale_up_batch() -> u32 {
    5
}

pub const fn default_scale_down_batch() -> u32 {
    3
}

pub const fn default_capacity_poll_ms() -> u64 {
    5_000
}

// =============================================================================
// Logging
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "arenaplane.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    false
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
