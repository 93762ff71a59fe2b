//! In-process counters. No HTTP exposure — the observability façade that would scrape
//! these is an external collaborator outside this core's scope. `snapshot()` gives an
//! operator (or a test) a serializable view, the same role the teacher's
//! `ServerMetrics`/`DashboardMetricsCache` pair plays, minus the dashboard cache.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct Metrics {
    pub games_created: AtomicU64,
    pub players_matched: AtomicU64,
    pub games_finalized: AtomicU64,
    pub batch_starvations: AtomicU64,
    pub lock_contention: AtomicU64,
    pub finish_lock_losses: AtomicU64,
    pub reaper_queue_sweeps: AtomicU64,
    pub reaper_player_sweeps: AtomicU64,
    pub reaper_entries_evicted: AtomicU64,
    pub scale_up_events: AtomicU64,
    pub scale_down_events: AtomicU64,
    pub slot_reservation_failures: AtomicU64,
    pub retry_attempts: AtomicU64,
    pub retry_successes: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub games_created: u64,
    pub players_matched: u64,
    pub games_finalized: u64,
    pub batch_starvations: u64,
    pub lock_contention: u64,
    pub finish_lock_losses: u64,
    pub reaper_queue_sweeps: u64,
    pub reaper_player_sweeps: u64,
    pub reaper_entries_evicted: u64,
    pub scale_up_events: u64,
    pub scale_down_events: u64,
    pub slot_reservation_failures: u64,
    pub retry_attempts: u64,
    pub retry_successes: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            games_created: load(&self.games_created),
            players_matched: load(&self.players_matched),
            games_finalized: load(&self.games_finalized),
            batch_starvations: load(&self.batch_starvations),
            lock_contention: load(&self.lock_contention),
            finish_lock_losses: load(&self.finish_lock_losses),
            reaper_queue_sweeps: load(&self.reaper_queue_sweeps),
            reaper_player_sweeps: load(&self.reaper_player_sweeps),
            reaper_entries_evicted: load(&self.reaper_entries_evicted),
            scale_up_events: load(&self.scale_up_events),
            scale_down_events: load(&self.scale_down_events),
            slot_reservation_failures: load(&self.slot_reservation_failures),
            retry_attempts: load(&self.retry_attempts),
            retry_successes: load(&self.retry_successes),
        }
    }
}
