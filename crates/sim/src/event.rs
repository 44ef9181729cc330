//! Events and the virtual-time queue that orders them

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use bytes::Bytes;

use ncflood_radio::Timer;

/// Index of a node inside the simulator.
pub type NodeIndex = usize;

#[derive(Debug, Clone)]
pub enum Event {
    /// A frame reaches a node after propagation.
    Deliver { to: NodeIndex, frame: Bytes },
    /// A timer armed by a node comes due.
    Fire { node: NodeIndex, timer: Timer },
}

#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub time: Duration,
    /// Breaks ties between events due at the same instant: first scheduled
    /// runs first.
    pub seq: u64,
    pub event: Event,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    // reversed for a min-heap
    fn cmp(&self, other: &Self) -> Ordering {
        other.time.cmp(&self.time).then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `event` at absolute time `time` and returns its sequence number.
    pub fn push(&mut self, time: Duration, event: Event) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduledEvent { time, seq, event });
        seq
    }

    pub fn pop(&mut self) -> Option<ScheduledEvent> {
        self.heap.pop()
    }

    pub fn peek_time(&self) -> Option<Duration> {
        self.heap.peek().map(|e| e.time)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fire(node: NodeIndex) -> Event {
        Event::Fire { node, timer: Timer::SelfSend }
    }

    fn node_of(event: &ScheduledEvent) -> NodeIndex {
        match event.event {
            Event::Fire { node, .. } => node,
            Event::Deliver { to, .. } => to,
        }
    }

    #[test]
    fn earliest_first() {
        let mut queue = EventQueue::new();
        queue.push(Duration::from_secs(10), fire(1));
        queue.push(Duration::from_secs(5), fire(2));
        queue.push(Duration::from_millis(7_500), fire(3));

        assert_eq!(queue.peek_time(), Some(Duration::from_secs(5)));
        let order: Vec<NodeIndex> = std::iter::from_fn(|| queue.pop()).map(|e| node_of(&e)).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn same_instant_keeps_insertion_order() {
        let mut queue = EventQueue::new();
        let at = Duration::from_millis(250);
        for node in 0..5 {
            queue.push(at, fire(node));
        }
        assert_eq!(queue.len(), 5);
        let order: Vec<NodeIndex> = std::iter::from_fn(|| queue.pop()).map(|e| node_of(&e)).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn sub_millisecond_times_are_distinct() {
        let mut queue = EventQueue::new();
        queue.push(Duration::from_micros(1_500), fire(1));
        queue.push(Duration::from_micros(1_200), fire(2));
        assert_eq!(node_of(&queue.pop().unwrap()), 2);
    }
}
