// Gravity-compensated arm driven from both sides
//
// The right motor follows the left one; every output carries a constant
// feed-forward that holds the arm against gravity.

use std::time::Duration;

use tracing::warn;

use super::paired::{BroadcastReport, Direction, PairedActuator};
use crate::motor::{ControlMode, ControllerError, Demand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmDirection {
    Up,
    Down,
}

impl Direction for ArmDirection {
    fn sign(self) -> f64 {
        match self {
            ArmDirection::Up => 1.0,
            ArmDirection::Down => -1.0,
        }
    }
}

pub struct Arm {
    actuator: PairedActuator,
    gravity_feed_forward: f64,
}

impl Arm {
    /// Makes the right master follow the left one, inverted, since the two
    /// motors face each other across the arm
    pub fn new(actuator: PairedActuator, gravity_feed_forward: f64) -> Self {
        {
            let mut right = actuator.right().borrow_mut();
            let left = actuator.left().borrow();
            let wired = right
                .set_inverted(true)
                .and_then(|()| right.follow(&left));
            if let Err(e) = wired {
                warn!("Arm follower wiring failed: {}", e);
            }
        }
        Self {
            actuator,
            gravity_feed_forward,
        }
    }

    pub fn actuator(&self) -> &PairedActuator {
        &self.actuator
    }

    pub fn gravity_feed_forward(&self) -> f64 {
        self.gravity_feed_forward
    }

    pub fn move_percent_output(&self, output: f64, direction: ArmDirection) -> Result<(), ControllerError> {
        self.set_percent_output(direction.sign() * output)
    }

    /// Signed percent output plus the gravity feed-forward
    pub fn set_percent_output(&self, output: f64) -> Result<(), ControllerError> {
        self.actuator.left().borrow_mut().set_with_demand(
            ControlMode::PercentOutput,
            output,
            Demand::ArbitraryFeedForward(self.gravity_feed_forward),
        )
    }

    pub fn set_current_limit(
        &self,
        peak_amps: f64,
        peak_duration_ms: u32,
        continuous_amps: f64,
        timeout: Option<Duration>,
    ) -> BroadcastReport {
        self.actuator
            .set_current_limit(peak_amps, peak_duration_ms, continuous_amps, timeout)
    }

    pub fn current(&self) -> Result<f64, ControllerError> {
        self.actuator.left().borrow_mut().output_current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::{Controller, SimController};
    use crate::subsystem::paired::shared;

    fn arm() -> (Arm, SimController, SimController) {
        let l = SimController::new(21);
        let r = SimController::new(22);
        let actuator = PairedActuator::new(
            shared(Controller::new(Box::new(l.clone()))),
            shared(Controller::new(Box::new(r.clone()))),
        );
        (Arm::new(actuator, 0.12), l, r)
    }

    /// Output the right motor actually drives while following
    fn effective_right_output(l: &SimController, r: &SimController) -> f64 {
        let (left, right) = (l.state(), r.state());
        assert_eq!(right.following, Some(21));
        let sign = if left.inverted == right.inverted { 1.0 } else { -1.0 };
        sign * left.output
    }

    #[test]
    fn test_right_follows_left() {
        let (_arm, _, r) = arm();
        assert_eq!(r.state().following, Some(21));
        assert!(r.state().inverted);
    }

    #[test]
    fn test_sides_are_mirrored() {
        let (arm, l, r) = arm();
        arm.move_percent_output(0.5, ArmDirection::Up).unwrap();
        assert_eq!(l.state().output, 0.5);
        assert_eq!(effective_right_output(&l, &r), -0.5);

        arm.move_percent_output(0.5, ArmDirection::Down).unwrap();
        assert_eq!(effective_right_output(&l, &r), 0.5);
    }

    #[test]
    fn test_move_with_gravity_feed_forward() {
        let (arm, l, r) = arm();
        arm.move_percent_output(0.4, ArmDirection::Down).unwrap();
        let state = l.state();
        assert_eq!(state.mode, ControlMode::PercentOutput);
        assert_eq!(state.output, -0.4);
        assert_eq!(state.demand, Demand::ArbitraryFeedForward(0.12));
        // Follower is left alone
        assert_eq!(r.state().following, Some(21));

        arm.move_percent_output(0.4, ArmDirection::Up).unwrap();
        assert_eq!(l.state().output, 0.4);
    }

    #[test]
    fn test_current_limit_and_current() {
        let (arm, l, _) = arm();
        assert!(arm.set_current_limit(20.0, 100, 10.0, None).is_success());
        assert_eq!(l.state().peak_current_limit, 20.0);
        assert_eq!(l.state().peak_current_duration_ms, 100);
        l.set_output_current(4.5);
        assert_eq!(arm.current().unwrap(), 4.5);
    }
}
