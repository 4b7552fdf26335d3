//! Runtime-wide counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters shared by every execution unit of a system
#[derive(Debug, Default)]
pub struct RuntimeMetrics {
    /// Lifecycle metrics
    pub spawned: AtomicU64,
    pub running: AtomicU64,
    pub died_abnormally: AtomicU64,
    pub exited_normally: AtomicU64,
    pub restarts: AtomicU64,

    /// Message metrics
    pub messages_processed: AtomicU64,
    pub messages_dropped: AtomicU64,
    pub messages_rejected: AtomicU64,
    pub processing_time: AtomicU64, // Total nanoseconds
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_spawn(&self) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_running(&self) {
        self.running.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stopped(&self, abnormal: bool) {
        // Saturate so a unit stopped before it reported running cannot wrap.
        let _ = self
            .running
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        if abnormal {
            self.died_abnormally.fetch_add(1, Ordering::Relaxed);
        } else {
            self.exited_normally.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message(&self, elapsed: Duration) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        self.processing_time
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    /// A message that reached no live target
    pub fn record_dropped(&self, count: u64) {
        self.messages_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// A message refused by a full mailbox
    pub fn record_rejected(&self) {
        self.messages_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let processed = self.messages_processed.load(Ordering::Relaxed);
        let total_time = Duration::from_nanos(self.processing_time.load(Ordering::Relaxed));
        MetricsSnapshot {
            spawned: self.spawned.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Relaxed),
            died_abnormally: self.died_abnormally.load(Ordering::Relaxed),
            exited_normally: self.exited_normally.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            messages_processed: processed,
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
            avg_processing_time: if processed > 0 {
                total_time / processed as u32
            } else {
                Duration::ZERO
            },
        }
    }
}

/// Point-in-time copy of [`RuntimeMetrics`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub spawned: u64,
    pub running: u64,
    pub died_abnormally: u64,
    pub exited_normally: u64,
    pub restarts: u64,
    pub messages_processed: u64,
    pub messages_dropped: u64,
    pub messages_rejected: u64,
    pub avg_processing_time: Duration,
}
