// Two-sided roller intake
//
// The rollers face each other, so pulling a game piece in means spinning the
// two sides in opposite directions.

use serde::{Deserialize, Serialize};

use super::paired::{BroadcastReport, Direction, PairedActuator, Side};
use crate::motor::{ControlMode, ControllerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeDirection {
    In,
    Out,
}

impl Direction for IntakeDirection {
    fn sign(self) -> f64 {
        match self {
            IntakeDirection::In => 1.0,
            IntakeDirection::Out => -1.0,
        }
    }
}

/// How the intake output is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    #[default]
    Percent,
    /// Native ticks per 100 ms
    Velocity,
}

impl OutputKind {
    fn mode(self) -> ControlMode {
        match self {
            OutputKind::Percent => ControlMode::PercentOutput,
            OutputKind::Velocity => ControlMode::Velocity,
        }
    }
}

pub struct Intake {
    actuator: PairedActuator,
}

impl Intake {
    pub fn new(actuator: PairedActuator) -> Self {
        Self { actuator }
    }

    pub fn actuator(&self) -> &PairedActuator {
        &self.actuator
    }

    pub fn intake(
        &self,
        output: f64,
        direction: IntakeDirection,
        kind: OutputKind,
    ) -> BroadcastReport {
        self.actuator.set_mirrored(kind.mode(), output, direction)
    }

    pub fn stop(&self) -> BroadcastReport {
        self.actuator.set_both(ControlMode::PercentOutput, 0.0)
    }

    /// A side is stalling when it draws more than `min_current` amps while
    /// turning slower than `jammed_velocity` in either direction
    pub fn is_stalling(&self, min_current: f64, jammed_velocity: f64) -> Result<bool, ControllerError> {
        for side in [Side::Left, Side::Right] {
            let mut master = self.actuator.master(side).borrow_mut();
            if master.output_current()? > min_current
                && master.sensor_velocity(0)?.abs() < jammed_velocity
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::{Controller, PidLoop, SimController};
    use crate::subsystem::paired::shared;

    fn intake() -> (Intake, SimController, SimController) {
        let l = SimController::new(11);
        let r = SimController::new(12);
        let actuator = PairedActuator::new(
            shared(Controller::new(Box::new(l.clone()))),
            shared(Controller::new(Box::new(r.clone()))),
        );
        (Intake::new(actuator), l, r)
    }

    #[test]
    fn test_intake_in_and_out() {
        let (intake, l, r) = intake();

        intake.intake(0.5, IntakeDirection::In, OutputKind::Percent);
        assert_eq!(l.state().output, 0.5);
        assert_eq!(r.state().output, -0.5);

        intake.intake(0.5, IntakeDirection::Out, OutputKind::Percent);
        assert_eq!(l.state().output, -0.5);
        assert_eq!(r.state().output, 0.5);
    }

    #[test]
    fn test_intake_velocity() {
        let (intake, l, r) = intake();
        intake.intake(200.0, IntakeDirection::In, OutputKind::Velocity);
        assert_eq!(l.state().mode, ControlMode::Velocity);
        assert_eq!(r.state().output, -200.0);

        intake.stop();
        assert_eq!(l.state().mode, ControlMode::PercentOutput);
        assert_eq!(l.state().output, 0.0);
    }

    #[test]
    fn test_stall_detection() {
        let (intake, l, r) = intake();
        intake.intake(1.0, IntakeDirection::In, OutputKind::Percent);
        // Mirrored rollers spin in opposite directions
        l.set_sensor_velocity(PidLoop::Primary, 300.0);
        r.set_sensor_velocity(PidLoop::Primary, -300.0);
        l.set_output_current(35.0);
        assert!(!intake.is_stalling(30.0, 50.0).unwrap());

        // High current but still turning is not a stall, on either side
        r.set_output_current(35.0);
        assert!(!intake.is_stalling(30.0, 50.0).unwrap());

        r.set_sensor_velocity(PidLoop::Primary, -10.0);
        assert!(intake.is_stalling(30.0, 50.0).unwrap());

        // Low current means free spinning even when slow
        r.set_output_current(5.0);
        l.set_sensor_velocity(PidLoop::Primary, 10.0);
        l.set_output_current(5.0);
        assert!(!intake.is_stalling(30.0, 50.0).unwrap());
    }
}
