//! Core data types for ncflood

pub mod packet;
pub mod position;
pub mod types;

pub use packet::SubPacket;
pub use position::Position;
pub use types::{HopCount, NodeId, PacketId, SeqNo, NO_NODE};
