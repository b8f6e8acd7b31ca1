// Mechanisms built from smart motor controllers
//
// Provides:
// - PairedActuator: two masters (plus optional followers and gyro) driven as one
// - Drivetrain: arcade drive and wheel odometry in feet
// - Intake: mirrored rollers with stall detection
// - Arm: gravity feed-forward output on a follower pair
// - Elevator: one master and its followers, slowed near the bottom

mod arm;
mod drivetrain;
mod elevator;
mod intake;
pub mod paired;

pub use arm::{Arm, ArmDirection};
pub use drivetrain::{DriveError, Drivetrain, arcade_mix};
pub use elevator::{Elevator, FactorRange, SlowDown};
pub use intake::{Intake, IntakeDirection, OutputKind};
pub use paired::{
    BroadcastReport, ControllerRef, Direction, Followers, PairedActuator, Side, shared,
};
