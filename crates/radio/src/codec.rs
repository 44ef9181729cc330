//! Fixed-layout wire codec for coded and uncoded flooding frames
//!
//! Every frame is 112 bytes, big-endian, fields in this order:
//!
//! | field                          | bytes |
//! |--------------------------------|-------|
//! | seq left, seq right            | 4, 4  |
//! | timestamp left, right (ns)     | 8, 8  |
//! | source left, right             | 4, 4  |
//! | hop count left, right          | 4, 4  |
//! | relay id                       | 4     |
//! | origin left x/y/z              | 4 x 3 |
//! | origin right x/y/z             | 4 x 3 |
//! | relay position x/y/z           | 4 x 3 |
//! | reserved, zero                 | 32    |
//!
//! Positions travel as whole meters (truncated toward zero). A right source
//! of 0 means the frame carries a single, uncoded sub-packet.

use std::time::Duration;

use bincode::config::{BigEndian, Configuration, Fixint};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use ncflood_core::{HopCount, NodeId, PacketId, Position, SubPacket, NO_NODE};

use crate::FloodError;

pub const FRAME_LEN: usize = 112;

const RESERVED_LEN: usize = 32;

fn wire_config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

/// Field-for-field image of the frame header on the wire.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireFrame {
    seq_left: u32,
    seq_right: u32,
    ts_left: u64,
    ts_right: u64,
    src_left: u32,
    src_right: u32,
    hops_left: u32,
    hops_right: u32,
    relay: u32,
    origin_left: [i32; 3],
    origin_right: [i32; 3],
    relay_position: [i32; 3],
    reserved: [u8; RESERVED_LEN],
}

/// The per-packet half of a frame. The relay fields are shared by both halves.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSlot {
    pub id: PacketId,
    pub origin: Position,
    pub hop_count: HopCount,
    pub sent_at: Duration,
}

impl FrameSlot {
    pub fn from_packet(packet: &SubPacket) -> Self {
        Self {
            id: packet.id,
            origin: packet.origin,
            hop_count: packet.hop_count,
            sent_at: packet.sent_at,
        }
    }

    fn into_packet(self, relay: NodeId, relay_position: Position) -> SubPacket {
        SubPacket {
            id: self.id,
            origin: self.origin,
            last_hop: relay,
            last_hop_position: relay_position,
            hop_count: self.hop_count,
            sent_at: self.sent_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodedFrame {
    pub left: FrameSlot,
    pub right: Option<FrameSlot>,
    pub relay: NodeId,
    pub relay_position: Position,
}

impl CodedFrame {
    pub fn new(left: &SubPacket, right: Option<&SubPacket>, relay: NodeId, relay_position: Position) -> Self {
        Self {
            left: FrameSlot::from_packet(left),
            right: right.map(FrameSlot::from_packet),
            relay,
            relay_position,
        }
    }

    pub fn is_coded(&self) -> bool {
        self.right.is_some()
    }

    /// Left sub-packet as the receiver sees it, last hop = this frame's relay.
    pub fn left_packet(&self) -> SubPacket {
        self.left.clone().into_packet(self.relay, self.relay_position)
    }

    pub fn right_packet(&self) -> Option<SubPacket> {
        self.right
            .clone()
            .map(|slot| slot.into_packet(self.relay, self.relay_position))
    }

    pub fn encode(&self) -> Result<Bytes, FloodError> {
        if self.left.id.source == NO_NODE {
            return Err(FloodError::ReservedNodeId(NO_NODE));
        }

        let mut wire = WireFrame {
            seq_left: self.left.id.seq,
            ts_left: nanos(self.left.sent_at),
            src_left: self.left.id.source,
            hops_left: self.left.hop_count,
            relay: self.relay,
            origin_left: to_wire_position(&self.left.origin),
            relay_position: to_wire_position(&self.relay_position),
            ..Default::default()
        };
        if let Some(right) = &self.right {
            if right.id.source == NO_NODE {
                return Err(FloodError::ReservedNodeId(NO_NODE));
            }
            wire.seq_right = right.id.seq;
            wire.ts_right = nanos(right.sent_at);
            wire.src_right = right.id.source;
            wire.hops_right = right.hop_count;
            wire.origin_right = to_wire_position(&right.origin);
        }

        let bytes = bincode::serde::encode_to_vec(&wire, wire_config())
            .map_err(|e| FloodError::Encode(e.to_string()))?;
        debug_assert_eq!(bytes.len(), FRAME_LEN);
        Ok(Bytes::from(bytes))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FloodError> {
        if bytes.len() != FRAME_LEN {
            return Err(FloodError::FrameLength { expected: FRAME_LEN, actual: bytes.len() });
        }
        let (wire, read): (WireFrame, usize) = bincode::serde::decode_from_slice(bytes, wire_config())
            .map_err(|e| FloodError::InvalidFrame(e.to_string()))?;
        if read != FRAME_LEN {
            return Err(FloodError::FrameLength { expected: FRAME_LEN, actual: read });
        }
        if wire.src_left == NO_NODE {
            return Err(FloodError::InvalidFrame("left source uses the reserved id".into()));
        }
        if wire.reserved.iter().any(|b| *b != 0) {
            return Err(FloodError::InvalidFrame("reserved bytes are not zero".into()));
        }

        let left = FrameSlot {
            id: PacketId::new(wire.src_left, wire.seq_left),
            origin: from_wire_position(wire.origin_left),
            hop_count: wire.hops_left,
            sent_at: Duration::from_nanos(wire.ts_left),
        };
        // right-hand fields are meaningless without a right source
        let right = (wire.src_right != NO_NODE).then(|| FrameSlot {
            id: PacketId::new(wire.src_right, wire.seq_right),
            origin: from_wire_position(wire.origin_right),
            hop_count: wire.hops_right,
            sent_at: Duration::from_nanos(wire.ts_right),
        });

        Ok(Self {
            left,
            right,
            relay: wire.relay,
            relay_position: from_wire_position(wire.relay_position),
        })
    }
}

fn nanos(t: Duration) -> u64 {
    u64::try_from(t.as_nanos()).unwrap_or(u64::MAX)
}

fn to_wire_position(p: &Position) -> [i32; 3] {
    [p.x as i32, p.y as i32, p.z as i32]
}

fn from_wire_position(p: [i32; 3]) -> Position {
    Position::new(f64::from(p[0]), f64::from(p[1]), f64::from(p[2]))
}
