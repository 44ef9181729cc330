//! Node placements for simulation runs

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ncflood_core::Position;
use ncflood_radio::{FloodError, FloodingConfig};

use crate::channel::ChannelConfig;
use crate::mobility::Mobility;
use crate::simulator::Simulator;

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub placements: Vec<Mobility>,
    pub duration: Duration,
}

impl Scenario {
    /// `n` static nodes on the x axis.
    pub fn line(n: usize, spacing: f64) -> Self {
        Self {
            name: format!("line {}x{:.0}m", n, spacing),
            placements: (0..n)
                .map(|i| Mobility::Static(Position::new(i as f64 * spacing, 0.0, 0.0)))
                .collect(),
            duration: Duration::from_secs(60),
        }
    }

    pub fn grid(rows: usize, cols: usize, spacing: f64) -> Self {
        let mut placements = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                placements.push(Mobility::Static(Position::new(
                    col as f64 * spacing,
                    row as f64 * spacing,
                    0.0,
                )));
            }
        }
        Self {
            name: format!("grid {}x{} @ {:.0}m", rows, cols, spacing),
            placements,
            duration: Duration::from_secs(60),
        }
    }

    /// `n` static nodes placed uniformly in a `width` by `height` area.
    pub fn random_area(n: usize, width: f64, height: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let placements = (0..n)
            .map(|_| {
                Mobility::Static(Position::new(
                    rng.random_range(0.0..width),
                    rng.random_range(0.0..height),
                    0.0,
                ))
            })
            .collect();
        Self {
            name: format!("random {} in {:.0}x{:.0}m", n, width, height),
            placements,
            duration: Duration::from_secs(60),
        }
    }

    /// A line of vehicles driving along the x axis at `speed` m/s, with every
    /// other lane in the opposite direction.
    pub fn convoy(n: usize, spacing: f64, speed: f64) -> Self {
        let placements = (0..n)
            .map(|i| {
                let direction = if i % 2 == 0 { 1.0 } else { -1.0 };
                Mobility::ConstantVelocity {
                    start: Position::new(i as f64 * spacing, (i % 2) as f64 * 5.0, 0.0),
                    velocity: Position::new(direction * speed, 0.0, 0.0),
                }
            })
            .collect();
        Self {
            name: format!("convoy {} @ {:.0}m/s", n, speed),
            placements,
            duration: Duration::from_secs(60),
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn build(&self, channel: ChannelConfig, flooding: FloodingConfig, seed: u64) -> Result<Simulator, FloodError> {
        let mut sim = Simulator::new(channel, flooding, seed)?;
        for mobility in &self.placements {
            sim.add_node(*mobility)?;
        }
        Ok(sim)
    }
}
