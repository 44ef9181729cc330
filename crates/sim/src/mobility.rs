use std::time::Duration;

use serde::{Deserialize, Serialize};

use ncflood_core::Position;

/// How a simulated node moves over virtual time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Mobility {
    Static(Position),
    /// `velocity` in meters per second, starting from `start` at time zero.
    ConstantVelocity { start: Position, velocity: Position },
}

impl Mobility {
    pub fn position_at(&self, t: Duration) -> Position {
        match *self {
            Mobility::Static(position) => position,
            Mobility::ConstantVelocity { start, velocity } => start + velocity * t.as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_never_moves() {
        let m = Mobility::Static(Position::new(3.0, 4.0, 0.0));
        assert_eq!(m.position_at(Duration::from_secs(100)), Position::new(3.0, 4.0, 0.0));
    }

    #[test]
    fn constant_velocity_is_linear() {
        let m = Mobility::ConstantVelocity {
            start: Position::new(0.0, 10.0, 0.0),
            velocity: Position::new(20.0, 0.0, 0.0),
        };
        assert_eq!(m.position_at(Duration::ZERO), Position::new(0.0, 10.0, 0.0));
        assert_eq!(m.position_at(Duration::from_millis(2_500)), Position::new(50.0, 10.0, 0.0));
    }
}
