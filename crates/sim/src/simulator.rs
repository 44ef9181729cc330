//! Deterministic discrete-event simulation of a flooding network

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info};

use ncflood_core::{NodeId, Position};
use ncflood_radio::{
    FloodError, FloodingConfig, FloodingNode, NodeMetrics, Positioning, Scheduler, Timer, TimerHandle, Transport,
};

use crate::channel::{Channel, ChannelConfig};
use crate::event::{Event, EventQueue, NodeIndex};
use crate::mobility::Mobility;
use crate::report::{NodeReport, SimulationReport};

struct SimNode {
    node: FloodingNode,
    mobility: Mobility,
}

/// What one node sees of the simulator while it handles an event.
struct NodeEnv<'a> {
    index: NodeIndex,
    now: Duration,
    position: Position,
    queue: &'a mut EventQueue,
    outbox: &'a mut Vec<Bytes>,
}

impl Scheduler for NodeEnv<'_> {
    fn now(&self) -> Duration {
        self.now
    }

    fn schedule_after(&mut self, delay: Duration, timer: Timer) -> TimerHandle {
        TimerHandle(self.queue.push(self.now.saturating_add(delay), Event::Fire { node: self.index, timer }))
    }
}

impl Transport for NodeEnv<'_> {
    fn broadcast(&mut self, frame: Bytes) -> Result<(), FloodError> {
        self.outbox.push(frame);
        Ok(())
    }
}

impl Positioning for NodeEnv<'_> {
    fn current_position(&self) -> Position {
        self.position
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ChannelStats {
    broadcasts: u64,
    deliveries: u64,
    drops: u64,
}

pub struct Simulator {
    nodes: Vec<SimNode>,
    queue: EventQueue,
    channel: Channel,
    flooding: FloodingConfig,
    now: Duration,
    stats: ChannelStats,
}

impl Simulator {
    pub fn new(channel: ChannelConfig, flooding: FloodingConfig, seed: u64) -> Result<Self, FloodError> {
        flooding.validate()?;
        Ok(Self {
            nodes: Vec::new(),
            queue: EventQueue::new(),
            channel: Channel::new(channel, seed)?,
            flooding,
            now: Duration::ZERO,
            stats: ChannelStats::default(),
        })
    }

    /// Adds a node running the shared flooding config and starts it at the
    /// current virtual time. Ids are handed out from 1.
    pub fn add_node(&mut self, mobility: Mobility) -> Result<NodeId, FloodError> {
        let config = self.flooding.clone();
        self.add_node_with_config(mobility, config)
    }

    pub fn add_node_with_config(&mut self, mobility: Mobility, config: FloodingConfig) -> Result<NodeId, FloodError> {
        let index = self.nodes.len();
        let id = NodeId::try_from(index + 1)
            .map_err(|_| FloodError::InvalidConfig(format!("too many nodes: {}", index + 1)))?;
        let mut node = FloodingNode::new(id, config, Arc::new(NodeMetrics::new()))?;

        let mut outbox = Vec::new();
        let mut env = NodeEnv {
            index,
            now: self.now,
            position: mobility.position_at(self.now),
            queue: &mut self.queue,
            outbox: &mut outbox,
        };
        node.start(&mut env);

        self.nodes.push(SimNode { node, mobility });
        self.fan_out(index, outbox);
        Ok(id)
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&FloodingNode> {
        self.index_of(id).map(|i| &self.nodes[i].node)
    }

    pub fn position_of(&self, id: NodeId) -> Option<Position> {
        self.index_of(id).map(|i| self.nodes[i].mobility.position_at(self.now))
    }

    fn index_of(&self, id: NodeId) -> Option<NodeIndex> {
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        (index < self.nodes.len()).then_some(index)
    }

    /// Processes the next event. Returns `false` once the queue is empty.
    pub fn step(&mut self) -> bool {
        let Some(scheduled) = self.queue.pop() else {
            return false;
        };
        self.now = scheduled.time;

        let index = match &scheduled.event {
            Event::Deliver { to, .. } => *to,
            Event::Fire { node, .. } => *node,
        };
        let Some(sim_node) = self.nodes.get_mut(index) else {
            return true;
        };

        let mut outbox = Vec::new();
        let mut env = NodeEnv {
            index,
            now: self.now,
            position: sim_node.mobility.position_at(self.now),
            queue: &mut self.queue,
            outbox: &mut outbox,
        };
        match scheduled.event {
            Event::Deliver { frame, .. } => {
                sim_node.node.handle_frame(&mut env, &frame);
            }
            Event::Fire { timer, .. } => {
                if let Some(outcome) = sim_node.node.handle_timer(&mut env, timer) {
                    debug!("[{:?}] node {}: {:?}", self.now, sim_node.node.id(), outcome);
                }
            }
        }

        self.fan_out(index, outbox);
        true
    }

    /// Puts every frame `from` sent on the air for the nodes in range.
    fn fan_out(&mut self, from: NodeIndex, frames: Vec<Bytes>) {
        if frames.is_empty() {
            return;
        }
        let sender = self.nodes[from].mobility.position_at(self.now);

        for frame in frames {
            self.stats.broadcasts += 1;
            for (index, receiver) in self.nodes.iter().enumerate() {
                if index == from || !self.channel.in_range(&sender, &receiver.mobility.position_at(self.now)) {
                    continue;
                }
                match self.channel.transmit() {
                    Some(delay) => {
                        self.stats.deliveries += 1;
                        self.queue.push(self.now + delay, Event::Deliver { to: index, frame: frame.clone() });
                    }
                    None => self.stats.drops += 1,
                }
            }
        }
    }

    /// Runs every event due up to and including `end`.
    pub fn run_until(&mut self, end: Duration) {
        while self.queue.peek_time().is_some_and(|t| t <= end) {
            self.step();
        }
        self.now = self.now.max(end);
        info!(
            "Simulation reached {:?}: {} broadcasts, {} deliveries, {} dropped",
            self.now, self.stats.broadcasts, self.stats.deliveries, self.stats.drops
        );
    }

    pub fn run_for(&mut self, duration: Duration) {
        self.run_until(self.now + duration);
    }

    pub fn report(&self) -> SimulationReport {
        let per_node: Vec<NodeReport> = self
            .nodes
            .iter()
            .map(|n| NodeReport {
                id: n.node.id(),
                position: n.mobility.position_at(self.now),
                loss_rate: n.node.loss_rate(),
                metrics: n.node.metrics().snapshot(),
            })
            .collect();

        SimulationReport::new(self.now, self.stats.broadcasts, self.stats.deliveries, self.stats.drops, per_node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ncflood_radio::LossRate;

    fn line(sim: &mut Simulator, n: usize, spacing: f64) -> Vec<NodeId> {
        (0..n)
            .map(|i| {
                sim.add_node(Mobility::Static(Position::new(i as f64 * spacing, 0.0, 0.0)))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn ids_start_at_one() {
        let mut sim = Simulator::new(ChannelConfig::default(), FloodingConfig::default(), 1).unwrap();
        let ids = line(&mut sim, 3, 100.0);
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(sim.node(0).is_none());
        assert!(sim.node(4).is_none());
        assert_eq!(sim.position_of(3), Some(Position::new(200.0, 0.0, 0.0)));
    }

    #[test]
    fn flood_crosses_a_multi_hop_line() {
        let mut sim = Simulator::new(ChannelConfig::default(), FloodingConfig::default(), 1).unwrap();
        let ids = line(&mut sim, 4, 400.0);
        sim.run_until(Duration::from_secs(10));

        // the ends are 1200 m apart and only hear each other through relays
        for id in &ids {
            let snap = sim.node(*id).unwrap().metrics().snapshot();
            assert_eq!(snap.seen_sources, 3, "node {}: {:?}", id, snap);
        }
        let report = sim.report();
        assert_eq!(report.channel_drops, 0);
        assert!(report.totals.forwarded > 0);
        assert_eq!(report.mean_coverage(), 1.0);
    }

    #[test]
    fn out_of_range_nodes_stay_silent_to_each_other() {
        let mut sim = Simulator::new(ChannelConfig::default(), FloodingConfig::default(), 1).unwrap();
        line(&mut sim, 2, 1_000.0);
        sim.run_until(Duration::from_secs(5));
        let report = sim.report();
        assert_eq!(report.deliveries, 0);
        assert_eq!(report.totals.received, 0);
        assert!(report.broadcasts >= 8);
    }

    #[test]
    fn same_seed_same_run() {
        let channel = ChannelConfig {
            loss_probability: 0.2,
            delay_jitter: Duration::from_micros(300),
            ..Default::default()
        };
        let run = |seed| {
            let mut sim = Simulator::new(channel.clone(), FloodingConfig::default(), seed).unwrap();
            line(&mut sim, 5, 300.0);
            sim.run_until(Duration::from_secs(20));
            sim.report()
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn estimator_tracks_channel_loss() {
        let channel = ChannelConfig { loss_probability: 0.3, ..Default::default() };
        let flooding = FloodingConfig::default().with_loss_rate(LossRate::Auto);
        let mut sim = Simulator::new(channel, flooding, 3).unwrap();
        for row in 0..3 {
            for col in 0..3 {
                sim.add_node(Mobility::Static(Position::new(col as f64 * 200.0, row as f64 * 200.0, 0.0)))
                    .unwrap();
            }
        }
        sim.run_until(Duration::from_secs(120));

        for node in sim.report().per_node {
            assert!(
                (0.1..0.5).contains(&node.loss_rate),
                "node {} estimated {}",
                node.id,
                node.loss_rate
            );
        }
    }

    #[test]
    fn moving_node_joins_the_flood() {
        let mut sim = Simulator::new(ChannelConfig::default(), FloodingConfig::default(), 5).unwrap();
        sim.add_node(Mobility::Static(Position::ORIGIN)).unwrap();
        let walker = sim
            .add_node(Mobility::ConstantVelocity {
                start: Position::new(2_000.0, 0.0, 0.0),
                velocity: Position::new(-100.0, 0.0, 0.0),
            })
            .unwrap();

        sim.run_until(Duration::from_secs(10));
        assert_eq!(sim.node(walker).unwrap().metrics().snapshot().seen_sources, 0);
        sim.run_until(Duration::from_secs(20));
        assert_eq!(sim.node(walker).unwrap().metrics().snapshot().seen_sources, 1);
    }
}
