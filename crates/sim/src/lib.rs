//! simulation tools for rate-decay flooding

pub mod channel;
pub mod event;
pub mod mobility;
pub mod report;
pub mod scenarios;
pub mod simulator;

use std::time::Duration;

pub use channel::{Channel, ChannelConfig};
pub use event::{Event, EventQueue, ScheduledEvent};
pub use mobility::Mobility;
pub use report::{NodeReport, SimulationReport};
pub use scenarios::Scenario;
pub use simulator::Simulator;

pub struct SimulationPresets;

impl SimulationPresets {
    pub fn good_conditions() -> ChannelConfig {
        ChannelConfig {
            range: 500.0,
            loss_probability: 0.05,
            propagation_delay: Duration::from_millis(1),
            delay_jitter: Duration::from_micros(100),
        }
    }

    pub fn average_conditions() -> ChannelConfig {
        ChannelConfig {
            range: 500.0,
            loss_probability: 0.15,
            propagation_delay: Duration::from_millis(2),
            delay_jitter: Duration::from_micros(500),
        }
    }

    pub fn poor_conditions() -> ChannelConfig {
        ChannelConfig {
            range: 500.0,
            loss_probability: 0.30,
            propagation_delay: Duration::from_millis(5),
            delay_jitter: Duration::from_millis(2),
        }
    }

    pub fn extreme_conditions() -> ChannelConfig {
        ChannelConfig {
            range: 500.0,
            loss_probability: 0.50,
            propagation_delay: Duration::from_millis(10),
            delay_jitter: Duration::from_millis(5),
        }
    }

    pub fn all() -> Vec<(&'static str, ChannelConfig)> {
        vec![
            ("Good Conditions", Self::good_conditions()),
            ("Average Conditions", Self::average_conditions()),
            ("Poor Conditions", Self::poor_conditions()),
            ("Extreme Conditions", Self::extreme_conditions()),
        ]
    }
}
