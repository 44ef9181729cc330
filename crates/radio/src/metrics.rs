//! Per-node protocol counters

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use ncflood_core::NodeId;

/// Counters for one node. Shared through an `Arc` so a driver or report can
/// read them while the node runs, and reset between runs.
#[derive(Debug, Default)]
pub struct NodeMetrics {
    seen_sources: Mutex<BTreeSet<NodeId>>,
    received_in_time: AtomicU64,
    received_late: AtomicU64,
    sent: AtomicU64,
    sent_coded: AtomicU64,
    received: AtomicU64,
    forwarded: AtomicU64,
    suppressed: AtomicU64,
    stale_timers: AtomicU64,
    malformed: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub seen_sources: usize,
    pub received_in_time: u64,
    pub received_late: u64,
    pub sent: u64,
    pub sent_coded: u64,
    pub received: u64,
    pub forwarded: u64,
    pub suppressed: u64,
    pub stale_timers: u64,
    pub malformed: u64,
}

impl MetricsSnapshot {
    /// Share of timed updates that arrived within the age threshold.
    pub fn in_time_ratio(&self) -> f64 {
        let total = self.received_in_time + self.received_late;
        if total == 0 {
            return 0.0;
        }
        self.received_in_time as f64 / total as f64
    }

    pub fn merge(&mut self, other: &MetricsSnapshot) {
        self.seen_sources += other.seen_sources;
        self.received_in_time += other.received_in_time;
        self.received_late += other.received_late;
        self.sent += other.sent;
        self.sent_coded += other.sent_coded;
        self.received += other.received;
        self.forwarded += other.forwarded;
        self.suppressed += other.suppressed;
        self.stale_timers += other.stale_timers;
        self.malformed += other.malformed;
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl NodeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_source(&self, source: NodeId) {
        self.seen_sources
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(source);
    }

    pub(crate) fn record_in_time(&self) {
        bump(&self.received_in_time);
    }

    pub(crate) fn record_late(&self) {
        bump(&self.received_late);
    }

    pub(crate) fn record_sent(&self) {
        bump(&self.sent);
    }

    pub(crate) fn record_sent_coded(&self) {
        bump(&self.sent_coded);
    }

    pub(crate) fn record_received(&self) {
        bump(&self.received);
    }

    pub(crate) fn record_forwarded(&self) {
        bump(&self.forwarded);
    }

    pub(crate) fn record_suppressed(&self) {
        bump(&self.suppressed);
    }

    pub(crate) fn record_stale_timer(&self) {
        bump(&self.stale_timers);
    }

    pub(crate) fn record_malformed(&self) {
        bump(&self.malformed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let seen_sources = self
            .seen_sources
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len();
        MetricsSnapshot {
            seen_sources,
            received_in_time: self.received_in_time.load(Ordering::Relaxed),
            received_late: self.received_late.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            sent_coded: self.sent_coded.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            stale_timers: self.stale_timers.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.seen_sources
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        for counter in [
            &self.received_in_time,
            &self.received_late,
            &self.sent,
            &self.sent_coded,
            &self.received,
            &self.forwarded,
            &self.suppressed,
            &self.stale_timers,
            &self.malformed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_resets() {
        let metrics = NodeMetrics::new();
        metrics.record_source(3);
        metrics.record_source(3);
        metrics.record_source(8);
        metrics.record_sent();
        metrics.record_forwarded();
        metrics.record_forwarded();
        metrics.record_in_time();
        metrics.record_late();

        let snap = metrics.snapshot();
        assert_eq!(snap.seen_sources, 2);
        assert_eq!(snap.sent, 1);
        assert_eq!(snap.forwarded, 2);
        assert_eq!(snap.in_time_ratio(), 0.5);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn merge_adds_up() {
        let mut total = MetricsSnapshot { sent: 2, received: 5, ..Default::default() };
        total.merge(&MetricsSnapshot { sent: 1, received: 4, forwarded: 3, ..Default::default() });
        assert_eq!(total.sent, 3);
        assert_eq!(total.received, 9);
        assert_eq!(total.forwarded, 3);
    }
}
