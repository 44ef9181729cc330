//! Collaborators a node is driven by: a virtual clock with timers, a
//! broadcast medium and a position source

use std::time::Duration;

use bytes::Bytes;

use ncflood_core::{NodeId, PacketId, Position};

use crate::FloodError;

/// Work a node asks to be woken up for. Timers are plain values handed back
/// to the node when they fire, so a torn-down node leaves nothing dangling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// Generate the next own status packet.
    SelfSend,
    /// Fold the loss tally into the estimator.
    LossUpdate,
    /// Forward whatever is pending for `source`; `packet` is the packet that
    /// armed the timer.
    Forward { source: NodeId, packet: PacketId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(pub u64);

pub trait Scheduler {
    /// Time since the start of the run.
    fn now(&self) -> Duration;

    /// Fires `timer` after `delay`. Timers due at the same instant fire in
    /// the order they were scheduled.
    fn schedule_after(&mut self, delay: Duration, timer: Timer) -> TimerHandle;
}

pub trait Transport {
    /// Unreliable one-hop broadcast.
    fn broadcast(&mut self, frame: Bytes) -> Result<(), FloodError>;
}

pub trait Positioning {
    fn current_position(&self) -> Position;
}

/// Everything a [`FloodingNode`](crate::FloodingNode) needs from its host.
pub trait Environment: Scheduler + Transport + Positioning {}

impl<T: Scheduler + Transport + Positioning> Environment for T {}
