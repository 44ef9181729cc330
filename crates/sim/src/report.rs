use std::time::Duration;

use serde::Serialize;

use ncflood_core::{NodeId, Position};
use ncflood_radio::MetricsSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub id: NodeId,
    pub position: Position,
    /// Loss probability the node used for coding decisions at the end.
    pub loss_rate: f64,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub elapsed: Duration,
    pub broadcasts: u64,
    pub deliveries: u64,
    pub channel_drops: u64,
    pub totals: MetricsSnapshot,
    pub per_node: Vec<NodeReport>,
}

impl SimulationReport {
    pub fn new(
        elapsed: Duration,
        broadcasts: u64,
        deliveries: u64,
        channel_drops: u64,
        per_node: Vec<NodeReport>,
    ) -> Self {
        let mut totals = MetricsSnapshot::default();
        for node in &per_node {
            totals.merge(&node.metrics);
        }
        Self { elapsed, broadcasts, deliveries, channel_drops, totals, per_node }
    }

    pub fn node_count(&self) -> usize {
        self.per_node.len()
    }

    /// Average share of the other nodes each node heard from at least once.
    pub fn mean_coverage(&self) -> f64 {
        let n = self.per_node.len();
        if n < 2 {
            return 0.0;
        }
        let others = (n - 1) as f64;
        self.per_node
            .iter()
            .map(|node| node.metrics.seen_sources as f64 / others)
            .sum::<f64>()
            / n as f64
    }

    pub fn in_time_ratio(&self) -> f64 {
        self.totals.in_time_ratio()
    }

    /// Share of forwards that carried a second packet.
    pub fn coded_share(&self) -> f64 {
        if self.totals.forwarded == 0 {
            return 0.0;
        }
        self.totals.sent_coded as f64 / self.totals.forwarded as f64
    }

    /// Frames on the air per originated status packet.
    pub fn overhead(&self) -> f64 {
        if self.totals.sent == 0 {
            return 0.0;
        }
        self.broadcasts as f64 / self.totals.sent as f64
    }

    pub fn mean_loss_estimate(&self) -> f64 {
        if self.per_node.is_empty() {
            return 0.0;
        }
        self.per_node.iter().map(|n| n.loss_rate).sum::<f64>() / self.per_node.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: NodeId, seen_sources: usize, forwarded: u64, sent_coded: u64) -> NodeReport {
        NodeReport {
            id,
            position: Position::ORIGIN,
            loss_rate: 0.25,
            metrics: MetricsSnapshot {
                seen_sources,
                sent: 4,
                forwarded,
                sent_coded,
                ..Default::default()
            },
        }
    }

    #[test]
    fn aggregates() {
        let report = SimulationReport::new(
            Duration::from_secs(4),
            20,
            40,
            2,
            vec![node(1, 2, 3, 1), node(2, 1, 1, 1), node(3, 2, 0, 0)],
        );
        assert_eq!(report.node_count(), 3);
        assert_eq!(report.totals.forwarded, 4);
        assert_eq!(report.totals.sent, 12);
        assert!((report.mean_coverage() - 5.0 / 6.0).abs() < 1e-12);
        assert_eq!(report.coded_share(), 0.5);
        assert!((report.overhead() - 20.0 / 12.0).abs() < 1e-12);
        assert_eq!(report.mean_loss_estimate(), 0.25);
    }

    #[test]
    fn empty_report_is_all_zero() {
        let report = SimulationReport::new(Duration::ZERO, 0, 0, 0, Vec::new());
        assert_eq!(report.mean_coverage(), 0.0);
        assert_eq!(report.coded_share(), 0.0);
        assert_eq!(report.overhead(), 0.0);
        assert_eq!(report.in_time_ratio(), 0.0);
    }
}
