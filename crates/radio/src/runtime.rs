//! Drives a [`FloodingNode`] over a real UDP broadcast socket

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use bytes::Bytes;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::time::{sleep_until, Instant};

use ncflood_core::{NodeId, Position};

use crate::engine::FloodingNode;
use crate::metrics::NodeMetrics;
use crate::scheduler::{Positioning, Scheduler, Timer, TimerHandle, Transport};
use crate::{FloodError, FloodingConfig, FRAME_LEN};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub node_id: NodeId,
    pub bind_addr: SocketAddr,
    /// Where frames are sent. Usually the subnet broadcast address.
    pub broadcast_addr: SocketAddr,
    pub position: Position,
    pub flooding: FloodingConfig,
}

/// Deadline for delays too long to represent; effectively never.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

struct Armed {
    at: Instant,
    seq: u64,
    timer: Timer,
}

impl PartialEq for Armed {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Armed {}

impl PartialOrd for Armed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Armed {
    // reversed: BinaryHeap pops the earliest deadline first
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at).then_with(|| other.seq.cmp(&self.seq))
    }
}

struct UdpEnv {
    socket: Arc<UdpSocket>,
    broadcast_addr: SocketAddr,
    position: Position,
    timers: BinaryHeap<Armed>,
    next_seq: u64,
}

impl UdpEnv {
    fn next_deadline(&self) -> Option<Instant> {
        self.timers.peek().map(|armed| armed.at)
    }

    fn pop_due(&mut self, now: Instant) -> Option<Timer> {
        if self.timers.peek()?.at > now {
            return None;
        }
        self.timers.pop().map(|armed| armed.timer)
    }
}

impl Scheduler for UdpEnv {
    /// Wall-clock time since the Unix epoch. Timestamps travel in frames and
    /// are compared against other nodes' clocks, so every node shares it.
    fn now(&self) -> Duration {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO)
    }

    fn schedule_after(&mut self, delay: Duration, timer: Timer) -> TimerHandle {
        self.next_seq += 1;
        let now = Instant::now();
        self.timers.push(Armed {
            at: now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE),
            seq: self.next_seq,
            timer,
        });
        TimerHandle(self.next_seq)
    }
}

impl Transport for UdpEnv {
    fn broadcast(&mut self, frame: Bytes) -> Result<(), FloodError> {
        self.socket
            .try_send_to(&frame, self.broadcast_addr)
            .map(|_| ())
            .map_err(FloodError::TransmissionFailed)
    }
}

impl Positioning for UdpEnv {
    fn current_position(&self) -> Position {
        self.position
    }
}

pub struct NodeRuntime {
    node: FloodingNode,
    env: UdpEnv,
    local_addr: SocketAddr,
}

impl NodeRuntime {
    pub async fn bind(config: RuntimeConfig) -> Result<Self, FloodError> {
        let node = FloodingNode::new(config.node_id, config.flooding, Arc::new(NodeMetrics::new()))?;

        let socket = UdpSocket::bind(config.bind_addr).await.map_err(FloodError::Bind)?;
        socket.set_broadcast(true).map_err(FloodError::Bind)?;
        let local_addr = socket.local_addr().map_err(FloodError::Bind)?;
        info!(
            "Node {} bound to {}, broadcasting to {}",
            config.node_id, local_addr, config.broadcast_addr
        );

        Ok(Self {
            node,
            env: UdpEnv {
                socket: Arc::new(socket),
                broadcast_addr: config.broadcast_addr,
                position: config.position,
                timers: BinaryHeap::new(),
                next_seq: 0,
            },
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn node(&self) -> &FloodingNode {
        &self.node
    }

    pub fn metrics(&self) -> Arc<NodeMetrics> {
        self.node.metrics().clone()
    }

    /// Moves the node. Takes effect for the next send or forward.
    pub fn set_position(&mut self, position: Position) {
        self.env.position = position;
    }

    /// Runs the node until `shutdown` resolves.
    pub async fn run<F>(&mut self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let socket = self.env.socket.clone();
        let mut buf = vec![0u8; FRAME_LEN * 4];
        tokio::pin!(shutdown);

        self.node.start(&mut self.env);

        loop {
            let deadline = self.env.next_deadline();
            let wake = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Node {} shutting down: {:?}", self.node.id(), self.node.metrics().snapshot());
                    return Ok(());
                }
                received = socket.recv_from(&mut buf) => {
                    let (len, from) = received.context("UDP receive failed")?;
                    if from == self.local_addr {
                        continue;
                    }
                    trace!("Node {} got {} bytes from {}", self.node.id(), len, from);
                    self.node.handle_frame(&mut self.env, &buf[..len]);
                }
                _ = wake => {
                    let now = Instant::now();
                    while let Some(timer) = self.env.pop_due(now) {
                        if let Some(outcome) = self.node.handle_timer(&mut self.env, timer) {
                            debug!("Node {} forward: {:?}", self.node.id(), outcome);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn config(node_id: NodeId, broadcast_addr: SocketAddr, position: Position) -> RuntimeConfig {
        RuntimeConfig {
            node_id,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            broadcast_addr,
            position,
            flooding: FloodingConfig::default()
                .with_send_interval(Duration::from_millis(50))
                .with_forwarding_jitter(Duration::from_millis(5)),
        }
    }

    #[tokio::test]
    async fn rejects_reserved_node_id() {
        let result = NodeRuntime::bind(config(0, "127.0.0.1:9".parse().unwrap(), Position::ORIGIN)).await;
        assert!(matches!(result, Err(FloodError::ReservedNodeId(0))));
    }

    #[tokio::test]
    async fn reports_bind_failures() {
        let mut cfg = config(1, "127.0.0.1:9".parse().unwrap(), Position::ORIGIN);
        cfg.bind_addr = "192.0.2.1:0".parse().unwrap();
        let Err(err) = NodeRuntime::bind(cfg).await else {
            panic!("binding a non-local address succeeded");
        };
        assert!(matches!(err, FloodError::Bind(_)));
    }

    #[tokio::test]
    async fn status_packets_cross_the_socket() {
        let mut listener =
            assert_ok!(NodeRuntime::bind(config(2, "127.0.0.1:9".parse().unwrap(), Position::new(100.0, 0.0, 0.0))).await);
        let mut talker = assert_ok!(NodeRuntime::bind(config(1, listener.local_addr(), Position::ORIGIN)).await);

        let window = Duration::from_millis(400);
        let (a, b) = tokio::join!(
            talker.run(tokio::time::sleep(window)),
            listener.run(tokio::time::sleep(window)),
        );
        assert_ok!(a);
        assert_ok!(b);

        assert!(talker.metrics().snapshot().sent >= 2);
        let heard = listener.metrics().snapshot();
        assert!(heard.received >= 2, "{:?}", heard);
        assert_eq!(heard.seen_sources, 1);
        assert_eq!(heard.malformed, 0);
        // a direct neighbour with positive advance gets relayed
        assert!(heard.forwarded >= 1, "{:?}", heard);
    }

    #[tokio::test]
    async fn nodes_started_apart_share_one_clock() {
        let mut listener =
            assert_ok!(NodeRuntime::bind(config(2, "127.0.0.1:9".parse().unwrap(), Position::new(100.0, 0.0, 0.0))).await);
        // well past the age-of-information threshold
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        let mut talker = assert_ok!(NodeRuntime::bind(config(1, listener.local_addr(), Position::ORIGIN)).await);

        let earlier = listener.env.now();
        let later = talker.env.now();
        assert!(later >= earlier && later - earlier < Duration::from_millis(100));

        let window = Duration::from_millis(400);
        let (a, b) = tokio::join!(
            talker.run(tokio::time::sleep(window)),
            listener.run(tokio::time::sleep(window)),
        );
        assert_ok!(a);
        assert_ok!(b);

        let heard = listener.metrics().snapshot();
        assert!(heard.received_in_time >= 1, "{:?}", heard);
        assert_eq!(heard.received_late, 0, "{:?}", heard);
    }
}
