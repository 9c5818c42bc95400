//! Reactor statistics
//!
//! Plain atomics, updated on every `process` path. Relaxed ordering is
//! sufficient: counters are read for reporting only.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ReactorStats {
    pub processed: AtomicU64,
    pub errors: AtomicU64,
    pub total_duration_ms: AtomicU64,
    pub timeouts: AtomicU64,
    pub rejected: AtomicU64,
    /// Handlers currently executing
    pub in_flight: AtomicU64,
    /// Atoms waiting for a concurrency permit
    pub waiting: AtomicU64,
}

/// Point-in-time copy of [`ReactorStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub errors: u64,
    pub total_duration_ms: u64,
    pub timeouts: u64,
    pub rejected: u64,
    pub in_flight: u64,
    pub waiting: u64,
}

impl StatsSnapshot {
    pub fn avg_duration_ms(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.processed as f64
        }
    }
}

impl ReactorStats {
    pub(crate) fn record(&self, duration_ms: u64, failed: bool) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
        if failed {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            total_duration_ms: self.total_duration_ms.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            waiting: self.waiting.load(Ordering::Relaxed),
        }
    }
}

/// Increments a gauge on creation and decrements it on drop
pub(crate) struct GaugeGuard<'a> {
    gauge: &'a AtomicU64,
}

impl<'a> GaugeGuard<'a> {
    pub(crate) fn new(gauge: &'a AtomicU64) -> Self {
        gauge.fetch_add(1, Ordering::Relaxed);
        Self { gauge }
    }
}

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.gauge.fetch_sub(1, Ordering::Relaxed);
    }
}
