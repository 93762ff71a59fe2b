//! Configuration validation.

use super::Config;

/// Validate cross-field invariants that `#[serde(default = ...)]` alone can't express.
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    if config.matchmaker.players_per_game == 0 {
        anyhow::bail!("matchmaker.players_per_game must be greater than zero");
    }
    if config.matchmaker.match_min_seconds > config.matchmaker.match_max_seconds {
        anyhow::bail!(
            "matchmaker.match_min_seconds ({}) must be <= match_max_seconds ({})",
            config.matchmaker.match_min_seconds,
            config.matchmaker.match_max_seconds
        );
    }
    if config.session.session_max_slots == 0 {
        anyhow::bail!("session.session_max_slots must be greater than zero");
    }
    if config.capacity.min_sessions > config.capacity.max_sessions {
        anyhow::bail!(
            "capacity.min_sessions ({}) must be <= max_sessions ({})",
            config.capacity.min_sessions,
            config.capacity.max_sessions
        );
    }
    if !(0.0..1.0).contains(&config.capacity.scale_up_threshold) {
        anyhow::bail!("capacity.scale_up_threshold must be in [0.0, 1.0)");
    }
    if !(0.0..1.0).contains(&config.capacity.scale_down_threshold) {
        anyhow::bail!("capacity.scale_down_threshold must be in [0.0, 1.0)");
    }
    if config.capacity.scale_down_threshold >= config.capacity.scale_up_threshold {
        anyhow::bail!(
            "capacity.scale_down_threshold must be below scale_up_threshold (got {} >= {})",
            config.capacity.scale_down_threshold,
            config.capacity.scale_up_threshold
        );
    }

    Ok(())
}
