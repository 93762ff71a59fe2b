//! Pure demand/scaling calculations, separated from the store and backend I/O in
//! `mod.rs` so the scale-up/scale-down arithmetic can be unit-tested directly.

use crate::config::CapacityConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandSnapshot {
    pub queue_length: usize,
    pub total_sessions: u32,
    pub total_slots: u32,
    pub used_slots: u32,
}

impl DemandSnapshot {
    pub fn utilization(&self) -> f64 {
        if self.total_slots == 0 {
            0.0
        } else {
            f64::from(self.used_slots) / f64::from(self.total_slots)
        }
    }

    pub fn available_slots(&self) -> u32 {
        self.total_slots.saturating_sub(self.used_slots)
    }

    fn slots_per_session(&self) -> f64 {
        if self.total_sessions == 0 {
            1.0
        } else {
            f64::from(self.total_slots) / f64::from(self.total_sessions)
        }
    }
}

/// `needed = clamp(ceil((players_in_game + queue) / players_per_game / slots_per_session), min, max)`
fn needed_sessions(demand: &DemandSnapshot, players_per_game: u32, min: u32, max: u32) -> u32 {
    let players_in_game = demand.used_slots * players_per_game;
    let total_players = players_in_game as f64 + demand.queue_length as f64;
    let per_session = players_per_game as f64 * demand.slots_per_session();
    let needed = if per_session <= 0.0 {
        min
    } else {
        (total_players / per_session).ceil() as u32
    };
    needed.clamp(min, max)
}

/// Bootstrap: ensure `total_sessions >= min_sessions`, bypassing every other check.
pub fn bootstrap_count(demand: &DemandSnapshot, config: &CapacityConfig) -> u32 {
    config.min_sessions.saturating_sub(demand.total_sessions)
}

/// Starvation override: the queue already holds a full game's worth of players but no
/// session has a free slot. Bypasses the scale-up cooldown.
pub fn starvation_override_count(demand: &DemandSnapshot, players_per_game: u32, config: &CapacityConfig) -> u32 {
    if demand.queue_length as u32 >= players_per_game
        && demand.available_slots() == 0
        && demand.total_sessions < config.max_sessions
    {
        config
            .scale_up_batch
            .min(config.max_sessions - demand.total_sessions)
            .max(1)
    } else {
        0
    }
}

/// Ordinary threshold-driven scale-up, subject to the cooldown the caller checks
/// separately (this function only computes *how many*, not *whether the cooldown has
/// elapsed*).
pub fn scale_up_count(demand: &DemandSnapshot, players_per_game: u32, config: &CapacityConfig) -> u32 {
    if demand.utilization() <= config.scale_up_threshold {
        return 0;
    }
    let needed = needed_sessions(demand, players_per_game, config.min_sessions, config.max_sessions);
    needed
        .saturating_sub(demand.total_sessions)
        .min(config.scale_up_batch)
}

/// Whether this tick's utilization counts as "sustained low usage" for the scale-down
/// timer.
pub fn is_low_usage(demand: &DemandSnapshot, config: &CapacityConfig) -> bool {
    demand.utilization() < config.scale_down_threshold && demand.total_sessions > config.min_sessions
}

/// How many idle sessions to destroy this tick, once the sustained-low-usage timer has
/// exceeded the cooldown. Capped so `total_sessions` never drops below `min_sessions`.
pub fn scale_down_count(demand: &DemandSnapshot, config: &CapacityConfig) -> u32 {
    let room_above_min = demand.total_sessions.saturating_sub(config.min_sessions);
    config.scale_down_batch.min(room_above_min)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CapacityConfig {
        CapacityConfig {
            min_sessions: 1,
            max_sessions: 5,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.3,
            scale_up_cooldown_ms: 30_000,
            scale_down_cooldown_ms: 300_000,
            scale_up_batch: 5,
            scale_down_batch: 3,
            capacity_poll_ms: 5_000,
        }
    }

    #[test]
    fn bootstrap_fills_up_to_min_sessions() {
        let demand = DemandSnapshot { queue_length: 0, total_sessions: 0, total_slots: 0, used_slots: 0 };
        assert_eq!(bootstrap_count(&demand, &config()), 1);
    }

    #[test]
    fn starvation_override_bypasses_thresholds() {
        let demand = DemandSnapshot { queue_length: 10, total_sessions: 1, total_slots: 1, used_slots: 1 };
        assert_eq!(starvation_override_count(&demand, 10, &config()), 1);
    }

    #[test]
    fn starvation_override_is_silent_when_slots_are_free() {
        let demand = DemandSnapshot { queue_length: 10, total_sessions: 1, total_slots: 2, used_slots: 1 };
        assert_eq!(starvation_override_count(&demand, 10, &config()), 0);
    }

    #[test]
    fn scale_up_triggers_above_threshold() {
        let demand = DemandSnapshot { queue_length: 30, total_sessions: 1, total_slots: 1, used_slots: 1 };
        assert!(scale_up_count(&demand, 10, &config()) > 0);
    }

    #[test]
    fn scale_up_is_zero_below_threshold() {
        let demand = DemandSnapshot { queue_length: 0, total_sessions: 5, total_slots: 5, used_slots: 1 };
        assert_eq!(scale_up_count(&demand, 10, &config()), 0);
    }

    #[test]
    fn scale_down_never_drops_below_min_sessions() {
        let demand = DemandSnapshot { queue_length: 0, total_sessions: 2, total_slots: 2, used_slots: 0 };
        assert_eq!(scale_down_count(&demand, &config()), 1);
    }

    #[test]
    fn is_low_usage_requires_room_above_min_sessions() {
        let demand = DemandSnapshot { queue_length: 0, total_sessions: 1, total_slots: 1, used_slots: 0 };
        assert!(!is_low_usage(&demand, &config()));
    }
}
