//! rate-decay flooding with opportunistic network coding

use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ncflood_core::NodeId;

pub mod codec;
pub mod candidates;
pub mod engine;
pub mod estimator;
pub mod gain;
pub mod metrics;
pub mod runtime;
pub mod scheduler;

pub use codec::{CodedFrame, FrameSlot, FRAME_LEN};
pub use candidates::CandidateStore;
pub use engine::{Delivery, DeliveryOutcome, FloodingNode, ForwardOutcome, CodingOption};
pub use estimator::LossEstimator;
pub use gain::GainModel;
pub use metrics::{MetricsSnapshot, NodeMetrics};
pub use runtime::{NodeRuntime, RuntimeConfig};
pub use scheduler::{Environment, Positioning, Scheduler, Timer, TimerHandle, Transport};

#[derive(Debug, Error)]
pub enum FloodError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Node id {0} is reserved")]
    ReservedNodeId(NodeId),

    #[error("Frame length {actual} does not match the fixed {expected} byte layout")]
    FrameLength { expected: usize, actual: usize },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Frame encoding failed: {0}")]
    Encode(String),

    #[error("Failed to bind transport: {0}")]
    Bind(#[source] std::io::Error),

    #[error("Broadcast failed: {0}")]
    TransmissionFailed(#[source] std::io::Error),
}

/// Loss probability fed into the coding gain model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LossRate {
    Fixed(f64),
    /// Estimated online from reception gaps.
    Auto,
}

impl LossRate {
    /// Values above 1.0 select online estimation, anything else is a fixed
    /// probability.
    pub fn from_sentinel(value: f64) -> Self {
        if value > 1.0 {
            LossRate::Auto
        } else {
            LossRate::Fixed(value)
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, LossRate::Auto)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodingConfig {
    /// Period of self-generated status packets.
    pub send_interval: Duration,
    /// Upper bound of the contention delay before a forward.
    pub forwarding_jitter: Duration,
    /// Communication range in meters.
    pub communication_range: f64,
    pub decay_exponent: f64,
    /// Coding partners must beat this gain.
    pub min_gain: f64,
    pub loss_rate: LossRate,
    /// Age of information above which an update counts as late.
    pub aoi_threshold: Duration,
    pub estimator_step: f64,
    pub loss_update_interval: Duration,
    /// Expected node density in nodes per square meter.
    pub node_density: f64,
}

impl Default for FloodingConfig {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_secs(1),
            forwarding_jitter: Duration::from_millis(110),
            communication_range: 500.0,
            decay_exponent: 1.0,
            min_gain: 0.0,
            loss_rate: LossRate::Fixed(0.0),
            aoi_threshold: Duration::from_secs_f64(0.73573573573),
            estimator_step: 0.001,
            loss_update_interval: Duration::from_millis(500),
            node_density: 12.0 / 1e6,
        }
    }
}

impl FloodingConfig {
    pub fn with_send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    pub fn with_forwarding_jitter(mut self, jitter: Duration) -> Self {
        self.forwarding_jitter = jitter;
        self
    }

    pub fn with_range(mut self, range: f64) -> Self {
        self.communication_range = range;
        self
    }

    pub fn with_decay_exponent(mut self, exponent: f64) -> Self {
        self.decay_exponent = exponent;
        self
    }

    pub fn with_min_gain(mut self, min_gain: f64) -> Self {
        self.min_gain = min_gain;
        self
    }

    pub fn with_loss_rate(mut self, loss_rate: LossRate) -> Self {
        self.loss_rate = loss_rate;
        self
    }

    pub fn validate(&self) -> Result<(), FloodError> {
        if self.send_interval.is_zero() {
            return Err(FloodError::InvalidConfig("send interval must be positive".into()));
        }
        if self.loss_update_interval.is_zero() {
            return Err(FloodError::InvalidConfig("loss update interval must be positive".into()));
        }
        if !(self.communication_range > 0.0 && self.communication_range.is_finite()) {
            return Err(FloodError::InvalidConfig(format!(
                "communication range must be positive, got {}",
                self.communication_range
            )));
        }
        if !(self.decay_exponent >= 0.0 && self.decay_exponent.is_finite()) {
            return Err(FloodError::InvalidConfig(format!(
                "decay exponent must be non-negative, got {}",
                self.decay_exponent
            )));
        }
        if !(self.min_gain >= 0.0) {
            return Err(FloodError::InvalidConfig(format!(
                "minimum gain must be non-negative, got {}",
                self.min_gain
            )));
        }
        if let LossRate::Fixed(p) = self.loss_rate {
            if !(0.0..=1.0).contains(&p) {
                return Err(FloodError::InvalidConfig(format!("fixed loss rate {} outside [0, 1]", p)));
            }
        }
        if !(self.estimator_step > 0.0 && self.estimator_step <= 1.0) {
            return Err(FloodError::InvalidConfig(format!(
                "estimator step must be in (0, 1], got {}",
                self.estimator_step
            )));
        }
        if !(self.node_density >= 0.0 && self.node_density.is_finite()) {
            return Err(FloodError::InvalidConfig(format!(
                "node density must be non-negative, got {}",
                self.node_density
            )));
        }
        Ok(())
    }
}
