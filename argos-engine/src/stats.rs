//! Dispatch counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Snapshot of dispatcher activity since the engine was opened
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchStats {
    /// Per-interface capture tasks started
    pub captures_started: u64,
    /// Tasks that returned packets (possibly zero)
    pub captures_succeeded: u64,
    /// Tasks whose capture failed
    pub captures_failed: u64,
    /// Tasks aborted before finishing
    pub captures_cancelled: u64,
    /// Packets returned by successful tasks
    pub packets_captured: u64,
    /// Time since the counters were created
    #[serde(with = "duration_secs")]
    pub uptime: Duration,
}

impl DispatchStats {
    /// Tasks that reached a terminal state
    pub fn captures_finished(&self) -> u64 {
        self.captures_succeeded + self.captures_failed + self.captures_cancelled
    }

    /// Failed tasks as a percentage of finished ones
    pub fn failure_rate(&self) -> f64 {
        let finished = self.captures_finished();
        if finished == 0 {
            return 0.0;
        }
        (self.captures_failed as f64 / finished as f64) * 100.0
    }

    /// Human-readable summary
    pub fn format(&self) -> String {
        format!(
            "Captures: {} started, {} succeeded, {} failed ({:.1}%), {} cancelled\n\
             Packets: {}\n\
             Uptime: {:.1}s",
            self.captures_started,
            self.captures_succeeded,
            self.captures_failed,
            self.failure_rate(),
            self.captures_cancelled,
            self.packets_captured,
            self.uptime.as_secs_f64()
        )
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

/// Thread-safe counters shared by every dispatch task
#[derive(Debug, Clone)]
pub struct StatsAccumulator {
    started: Arc<AtomicU64>,
    succeeded: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    cancelled: Arc<AtomicU64>,
    packets: Arc<AtomicU64>,
    start_time: Instant,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self {
            started: Arc::new(AtomicU64::new(0)),
            succeeded: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
            cancelled: Arc::new(AtomicU64::new(0)),
            packets: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, packets: usize) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.packets.fetch_add(packets as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self, tasks: usize) {
        self.cancelled.fetch_add(tasks as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            captures_started: self.started.load(Ordering::Relaxed),
            captures_succeeded: self.succeeded.load(Ordering::Relaxed),
            captures_failed: self.failed.load(Ordering::Relaxed),
            captures_cancelled: self.cancelled.load(Ordering::Relaxed),
            packets_captured: self.packets.load(Ordering::Relaxed),
            uptime: self.start_time.elapsed(),
        }
    }
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
