//! Per-source forwarding candidates and reception history

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use ncflood_core::{NodeId, PacketId, Position, SubPacket};

/// Everything one node remembers about the flood. Owned by a single
/// [`FloodingNode`](crate::FloodingNode).
#[derive(Debug, Default)]
pub struct CandidateStore {
    /// At most one un-forwarded candidate per source. Ordered so coding
    /// partner searches visit sources deterministically.
    pending: BTreeMap<NodeId, SubPacket>,
    seen: HashSet<PacketId>,
    twice_seen: HashSet<PacketId>,
    last_forward: HashMap<NodeId, Duration>,
    last_received: HashMap<NodeId, Duration>,
    last_direct_receive: HashMap<NodeId, Duration>,
    last_origin: HashMap<NodeId, Position>,
}

impl CandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a first reception. Returns `false` if the id was already known.
    pub fn mark_seen(&mut self, id: PacketId) -> bool {
        self.seen.insert(id)
    }

    pub fn is_seen(&self, id: &PacketId) -> bool {
        self.seen.contains(id)
    }

    /// Records that someone else already propagated `id`.
    pub fn mark_twice_seen(&mut self, id: PacketId) -> bool {
        self.twice_seen.insert(id)
    }

    pub fn is_twice_seen(&self, id: &PacketId) -> bool {
        self.twice_seen.contains(id)
    }

    /// Stores `packet` as its source's candidate, returning the one it replaced.
    pub fn insert_pending(&mut self, packet: SubPacket) -> Option<SubPacket> {
        self.pending.insert(packet.source(), packet)
    }

    pub fn pending(&self, source: NodeId) -> Option<&SubPacket> {
        self.pending.get(&source)
    }

    pub fn take_pending(&mut self, source: NodeId) -> Option<SubPacket> {
        self.pending.remove(&source)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Pending candidates of other sources that are still worth coding with.
    pub fn coding_candidates(&self, exclude: NodeId) -> impl Iterator<Item = &SubPacket> + '_ {
        self.pending
            .iter()
            .filter(move |(source, packet)| **source != exclude && !self.twice_seen.contains(&packet.id))
            .map(|(_, packet)| packet)
    }

    /// Updates the timing and origin history after a first reception.
    pub fn record_reception(&mut self, packet: &SubPacket) {
        let source = packet.source();
        self.last_received.insert(source, packet.sent_at);
        if packet.hop_count == 0 {
            self.last_direct_receive.insert(source, packet.sent_at);
        }
        self.last_origin.insert(source, packet.origin);
    }

    pub fn last_received(&self, source: NodeId) -> Option<Duration> {
        self.last_received.get(&source).copied()
    }

    pub fn last_direct_receive(&self, source: NodeId) -> Option<Duration> {
        self.last_direct_receive.get(&source).copied()
    }

    pub fn last_origin(&self, source: NodeId) -> Option<Position> {
        self.last_origin.get(&source).copied()
    }

    pub fn last_forward(&self, source: NodeId) -> Option<Duration> {
        self.last_forward.get(&source).copied()
    }

    /// Reserves the next forwarding slot for `source` at time `at`.
    pub fn reserve_forward(&mut self, source: NodeId, at: Duration) {
        self.last_forward.insert(source, at);
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }
}
