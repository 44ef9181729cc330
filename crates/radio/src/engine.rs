//! Forwarding engine: decides whether, when and how a node relays what it hears
//!
//! A node floods its own status every `send_interval` and relays everyone
//! else's. A received packet is relayed only if this node moved it further
//! from its origin than the previous hop did, after a contention delay that
//! shrinks with that advance plus a rate-decay pause that grows with the hop
//! count. When the forward fires, another pending packet may ride along in
//! the same frame if the coding gain model says enough neighbours can decode
//! it.
//!
//! Cancellation is logical: forward timers are never withdrawn. A timer that
//! fires after its slot was already served, or whose packet was meanwhile
//! heard from another relay, turns into a no-op.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};

use ncflood_core::{HopCount, NodeId, PacketId, Position, SeqNo, SubPacket, NO_NODE};

use crate::candidates::CandidateStore;
use crate::codec::CodedFrame;
use crate::estimator::LossEstimator;
use crate::gain::GainModel;
use crate::metrics::NodeMetrics;
use crate::scheduler::{Environment, Timer};
use crate::{FloodError, FloodingConfig, LossRate};

/// How a sub-packet reached the receive path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Plain,
    /// Recovered from a coded frame by cancelling the known left half.
    Decoded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// Already known. `twice_seen` tells whether this copy newly marked it as
    /// propagated by someone else.
    Duplicate { id: PacketId, twice_seen: bool },
    /// First reception. `forward_in` is set when a forward was scheduled.
    Accepted { id: PacketId, advance: f64, forward_in: Option<Duration> },
}

/// One coding partner considered during a forward.
#[derive(Debug, Clone, PartialEq)]
pub struct CodingOption {
    pub packet: PacketId,
    pub last_hop_position: Position,
    pub gain: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForwardOutcome {
    /// Nothing pending for the source any more.
    Stale,
    /// The packet was heard from another relay before the timer fired.
    Suppressed { packet: PacketId },
    Sent {
        left: PacketId,
        right: Option<PacketId>,
        options: Vec<CodingOption>,
    },
}

pub struct FloodingNode {
    id: NodeId,
    config: FloodingConfig,
    store: CandidateStore,
    estimator: LossEstimator,
    gain: GainModel,
    /// Loss probability currently fed to the gain model.
    loss_rate: f64,
    next_seq: SeqNo,
    rx_successes: u32,
    rx_failures: u32,
    metrics: Arc<NodeMetrics>,
}

impl FloodingNode {
    pub fn new(id: NodeId, config: FloodingConfig, metrics: Arc<NodeMetrics>) -> Result<Self, FloodError> {
        if id == NO_NODE {
            return Err(FloodError::ReservedNodeId(id));
        }
        config.validate()?;

        let estimator = LossEstimator::new(config.estimator_step)?;
        let loss_rate = match config.loss_rate {
            LossRate::Fixed(p) => p,
            LossRate::Auto => estimator.expected_loss(),
        };
        let gain = GainModel::new(config.communication_range, config.node_density);

        Ok(Self {
            id,
            config,
            store: CandidateStore::new(),
            estimator,
            gain,
            loss_rate,
            next_seq: 0,
            rx_successes: 0,
            rx_failures: 0,
            metrics,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &FloodingConfig {
        &self.config
    }

    pub fn loss_rate(&self) -> f64 {
        self.loss_rate
    }

    pub fn estimator(&self) -> &LossEstimator {
        &self.estimator
    }

    pub fn store(&self) -> &CandidateStore {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    /// Successes and failures collected since the last loss update.
    pub fn pending_observations(&self) -> (u32, u32) {
        (self.rx_successes, self.rx_failures)
    }

    /// Arms the recurring timers.
    pub fn start<E: Environment>(&mut self, env: &mut E) {
        info!(
            "Node {} starting: interval {:?}, range {} m, loss rate {:?}",
            self.id, self.config.send_interval, self.config.communication_range, self.config.loss_rate
        );
        env.schedule_after(self.config.send_interval, Timer::SelfSend);
        if self.config.loss_rate.is_auto() {
            env.schedule_after(self.config.loss_update_interval, Timer::LossUpdate);
        }
    }

    /// Runs a fired timer. Forward timers report what they did.
    pub fn handle_timer<E: Environment>(&mut self, env: &mut E, timer: Timer) -> Option<ForwardOutcome> {
        match timer {
            Timer::SelfSend => {
                self.send_status(env);
                None
            }
            Timer::LossUpdate => {
                self.update_loss_rate(env);
                None
            }
            Timer::Forward { source, packet } => Some(self.forward(env, source, packet)),
        }
    }

    fn send_status<E: Environment>(&mut self, env: &mut E) {
        let now = env.now();
        let position = env.current_position();
        let id = PacketId::new(self.id, self.next_seq);
        self.next_seq = self.next_seq.wrapping_add(1);

        let packet = SubPacket::originate(id, position, now);
        let frame = CodedFrame::new(&packet, None, self.id, position);
        if self.transmit(env, &frame) {
            self.metrics.record_sent();
            trace!("Node {} sent status {}", self.id, id);
        }

        // never treat our own packet as news when it echoes back
        self.store.mark_seen(id);
        env.schedule_after(self.config.send_interval, Timer::SelfSend);
    }

    fn update_loss_rate<E: Environment>(&mut self, env: &mut E) {
        if !self.config.loss_rate.is_auto() {
            return;
        }
        if u64::from(self.rx_successes) + u64::from(self.rx_failures) > 0 {
            self.estimator.report_observation(self.rx_successes, self.rx_failures);
            self.rx_successes = 0;
            self.rx_failures = 0;
            self.loss_rate = self.estimator.expected_loss();
            debug!("Node {} loss estimate now {:.4}", self.id, self.loss_rate);
        }
        env.schedule_after(self.config.loss_update_interval, Timer::LossUpdate);
    }

    /// Entry point for raw bytes from the transport. Malformed frames are
    /// dropped without touching any state.
    pub fn handle_frame<E: Environment>(&mut self, env: &mut E, bytes: &[u8]) -> Vec<DeliveryOutcome> {
        let frame = match CodedFrame::decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Node {} dropping frame: {}", self.id, e);
                self.metrics.record_malformed();
                return Vec::new();
            }
        };

        let left = frame.left_packet();
        let Some(right) = frame.right_packet() else {
            return vec![self.deliver(env, left, Delivery::Plain)];
        };

        // Each half is recoverable once the other one is known. The checks
        // run in order, so recovering the right half can make the left half
        // recoverable too.
        let mut outcomes = Vec::with_capacity(2);
        if self.store.is_seen(&left.id) {
            outcomes.push(self.deliver(env, right.clone(), Delivery::Decoded));
        }
        if self.store.is_seen(&right.id) {
            outcomes.push(self.deliver(env, left, Delivery::Plain));
        }
        if outcomes.is_empty() {
            trace!("Node {} cannot decode coded frame from {}", self.id, frame.relay);
        }
        outcomes
    }

    fn deliver<E: Environment>(&mut self, env: &mut E, packet: SubPacket, delivery: Delivery) -> DeliveryOutcome {
        let id = packet.id;
        let source = packet.source();

        if self.store.is_seen(&id) {
            let twice_seen = delivery == Delivery::Plain && self.store.mark_twice_seen(id);
            trace!("Node {} duplicate {} via {} (twice seen: {})", self.id, id, packet.last_hop, twice_seen);
            return DeliveryOutcome::Duplicate { id, twice_seen };
        }
        self.store.mark_seen(id);

        let now = env.now();
        let position = env.current_position();
        let range = self.config.communication_range;
        let origin_distance = packet.origin.distance_to(&position);

        self.metrics.record_source(source);
        if let Some(previous) = self.store.last_received(source) {
            if origin_distance <= range {
                if now.saturating_sub(previous) > self.config.aoi_threshold {
                    self.metrics.record_late();
                } else {
                    self.metrics.record_in_time();
                }
            }
        }
        self.record_loss_events(&packet, &position, now);
        self.store.record_reception(&packet);
        self.metrics.record_received();

        let advance = packet.advance(&position);
        let (delay, decay) = self.forward_delay(source, packet.hop_count, advance, delivery, now);

        self.store.insert_pending(packet.next_hop());

        let forward_in = if advance > 0.0 {
            env.schedule_after(delay, Timer::Forward { source, packet: id });
            debug!("Node {} received {} (advance {:.1} m), forwarding in {:?}", self.id, id, advance, delay);
            Some(delay)
        } else {
            debug!("Node {} received {} (advance {:.1} m), kept for coding only", self.id, id, advance);
            None
        };
        self.store.reserve_forward(source, now.saturating_add(decay));

        DeliveryOutcome::Accepted { id, advance, forward_in }
    }

    /// Total delay before forwarding and the rate-decay part of it.
    fn forward_delay(
        &self,
        source: NodeId,
        hop_count: HopCount,
        advance: f64,
        delivery: Delivery,
        now: Duration,
    ) -> (Duration, Duration) {
        let jitter = self.config.forwarding_jitter;
        let interval = self.config.send_interval;
        let exponent = self.config.decay_exponent;
        let decoded = delivery == Delivery::Decoded;

        let scale = (1.0 - advance / self.config.communication_range).max(0.0);
        let mut contention = scaled(jitter, scale);
        if decoded {
            // reconstructed copies yield to copies heard in the clear
            contention = contention.saturating_add(jitter);
        }

        let decay = match self.store.last_forward(source) {
            Some(last) => {
                let spacing = scaled(interval, (f64::from(hop_count) + 1.0).powf(exponent));
                last.saturating_add(spacing).saturating_sub(now)
            }
            None => Duration::ZERO,
        };

        let mut delay = contention.saturating_add(decay);
        if decoded {
            // the previous hop may have skipped its own decay pause
            delay = delay.saturating_add(scaled(interval, f64::from(hop_count).powf(exponent)));
        }
        (delay, decay)
    }

    /// Turns a reception gap into loss observations for the estimator. Only
    /// direct, in-range receptions say anything about the channel.
    fn record_loss_events(&mut self, packet: &SubPacket, position: &Position, now: Duration) {
        let source = packet.source();
        let (Some(previous_origin), Some(last_direct)) =
            (self.store.last_origin(source), self.store.last_direct_receive(source))
        else {
            return;
        };

        let range = self.config.communication_range;
        let old_distance = previous_origin.distance_to(position);
        let new_distance = packet.origin.distance_to(position);

        if new_distance <= range && packet.hop_count > 0 {
            // relayed although the source is in range: a detour
            return;
        }
        if old_distance >= range {
            return;
        }

        let elapsed_ms = now.saturating_sub(last_direct).as_millis();
        let interval_ms = self.config.send_interval.as_millis().max(1);
        let missed = u32::try_from((elapsed_ms / interval_ms).saturating_sub(1)).unwrap_or(u32::MAX);

        self.rx_successes = self.rx_successes.saturating_add(1);
        self.rx_failures = self.rx_failures.saturating_add(missed);
        trace!("Node {} loss tally for {}: +1 ok, +{} missed", self.id, source, missed);
    }

    /// Forward action for `source`, armed by `packet`.
    pub fn forward<E: Environment>(&mut self, env: &mut E, source: NodeId, packet: PacketId) -> ForwardOutcome {
        let Some(current) = self.store.pending(source).cloned() else {
            self.metrics.record_stale_timer();
            trace!("Node {} forward timer for {} found nothing pending", self.id, packet);
            return ForwardOutcome::Stale;
        };

        if self.store.is_twice_seen(&packet) {
            self.store.take_pending(source);
            self.metrics.record_suppressed();
            debug!("Node {} suppressing {}: already propagated", self.id, packet);
            return ForwardOutcome::Suppressed { packet };
        }

        let position = env.current_position();
        let mut options = Vec::new();
        let mut best_gain = self.config.min_gain;
        let mut partner: Option<NodeId> = None;
        for candidate in self.store.coding_candidates(source) {
            let gain = self.gain.coding_gain(
                &position,
                &current.last_hop_position,
                &candidate.last_hop_position,
                self.loss_rate,
            );
            options.push(CodingOption {
                packet: candidate.id,
                last_hop_position: candidate.last_hop_position,
                gain,
            });
            if gain > best_gain {
                best_gain = gain;
                partner = Some(candidate.source());
            }
        }

        let partner = partner.and_then(|s| self.store.take_pending(s));
        let frame = CodedFrame::new(&current, partner.as_ref(), self.id, position);
        if self.transmit(env, &frame) {
            self.metrics.record_forwarded();
            if partner.is_some() {
                self.metrics.record_sent_coded();
            }
        }
        self.store.take_pending(source);

        let right = partner.map(|p| p.id);
        match right {
            Some(right) => debug!(
                "Node {} forwarded {} coded with {} (gain {:.4}, {} options)",
                self.id,
                current.id,
                right,
                best_gain,
                options.len()
            ),
            None => debug!("Node {} forwarded {} ({} options)", self.id, current.id, options.len()),
        }

        ForwardOutcome::Sent { left: current.id, right, options }
    }

    /// Encodes and broadcasts once. Lost broadcasts are not retried.
    fn transmit<E: Environment>(&self, env: &mut E, frame: &CodedFrame) -> bool {
        let bytes = match frame.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Node {} failed to encode frame: {}", self.id, e);
                return false;
            }
        };
        match env.broadcast(bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!("Node {} broadcast failed: {}", self.id, e);
                false
            }
        }
    }
}

/// `base * factor`, saturating where the product does not fit a `Duration`.
/// Hop counts come off the wire, so the factor can be arbitrarily large.
fn scaled(base: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}
