use std::fmt;

use serde::{Deserialize, Serialize};

pub type NodeId = u32;
pub type SeqNo = u32;
pub type HopCount = u32;

/// Reserved node id. On the wire it marks an absent right-hand sub-packet.
pub const NO_NODE: NodeId = 0;

/// Identifies one originally generated packet: unique per (source, sequence).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PacketId {
    pub source: NodeId,
    pub seq: SeqNo,
}

impl PacketId {
    pub const fn new(source: NodeId, seq: SeqNo) -> Self {
        Self { source, seq }
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.source, self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_id_display_and_order() {
        let a = PacketId::new(3, 7);
        let b = PacketId::new(3, 8);
        assert_eq!(a.to_string(), "3-7");
        assert!(a < b);
        assert_ne!(a, PacketId::new(4, 7));
    }
}
