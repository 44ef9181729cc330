use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::position::Position;
use crate::types::{HopCount, NodeId, PacketId};

/// One logical status packet as seen by a relay: either an uncoded
/// transmission or one half of a coded one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubPacket {
    pub id: PacketId,
    /// Where the source was when it generated the packet.
    pub origin: Position,
    pub last_hop: NodeId,
    pub last_hop_position: Position,
    pub hop_count: HopCount,
    /// Send time at the source, measured from the start of the run.
    pub sent_at: Duration,
}

impl SubPacket {
    /// A freshly generated packet, transmitted by its own source.
    pub fn originate(id: PacketId, position: Position, sent_at: Duration) -> Self {
        Self {
            id,
            origin: position,
            last_hop: id.source,
            last_hop_position: position,
            hop_count: 0,
            sent_at,
        }
    }

    pub fn source(&self) -> NodeId {
        self.id.source
    }

    /// Progress this copy makes away from the origin at `receiver`,
    /// relative to the hop that transmitted it.
    pub fn advance(&self, receiver: &Position) -> f64 {
        self.origin.distance_to(receiver) - self.origin.distance_to(&self.last_hop_position)
    }

    /// The copy a relay keeps for retransmission: one hop further along.
    pub fn next_hop(&self) -> SubPacket {
        SubPacket {
            hop_count: self.hop_count.saturating_add(1),
            ..self.clone()
        }
    }
}
