//! Unit-disk broadcast channel with independent per-receiver loss

use std::time::Duration;

use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use ncflood_core::Position;
use ncflood_radio::FloodError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Receivers further away than this hear nothing.
    pub range: f64,
    /// Probability that one receiver misses one frame.
    pub loss_probability: f64,
    pub propagation_delay: Duration,
    /// Standard deviation of the extra delay on top of `propagation_delay`.
    pub delay_jitter: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            range: 500.0,
            loss_probability: 0.0,
            propagation_delay: Duration::from_millis(1),
            delay_jitter: Duration::ZERO,
        }
    }
}

pub struct Channel {
    config: ChannelConfig,
    rng: StdRng,
    jitter: Normal<f64>,
}

impl Channel {
    pub fn new(config: ChannelConfig, seed: u64) -> Result<Self, FloodError> {
        if !(config.range > 0.0) {
            return Err(FloodError::InvalidConfig(format!("channel range {} must be positive", config.range)));
        }
        if !(0.0..=1.0).contains(&config.loss_probability) {
            return Err(FloodError::InvalidConfig(format!(
                "loss probability {} outside [0, 1]",
                config.loss_probability
            )));
        }
        let jitter = Normal::new(0.0, config.delay_jitter.as_secs_f64())
            .map_err(|e| FloodError::InvalidConfig(format!("delay jitter: {}", e)))?;

        Ok(Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            jitter,
        })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn in_range(&self, from: &Position, to: &Position) -> bool {
        from.distance_to(to) <= self.config.range
    }

    /// Rolls one reception. `None` if the frame is lost, otherwise the delay
    /// after which it arrives.
    pub fn transmit(&mut self) -> Option<Duration> {
        if self.rng.random::<f64>() < self.config.loss_probability {
            trace!("Simulated frame loss");
            return None;
        }
        let extra = self.jitter.sample(&mut self.rng).abs();
        Some(self.config.propagation_delay + Duration::from_secs_f64(extra))
    }
}
