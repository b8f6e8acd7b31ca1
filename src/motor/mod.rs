// Motor controller layer
//
// Provides:
// - Device traits for smart motor controllers and inertial sensors
// - A controller facade with a bound default timeout and index validation
// - Factory-default reset and a builder on top of it
// - Closed-loop gain sets
// - In-memory simulated devices

mod builder;
mod controller;
pub mod device;
mod gains;
pub mod imu;
pub mod reset;
pub mod sim;

pub use builder::{Built, ControllerBuilder};
pub use controller::{Controller, ControllerError, CurrentLimit, SoftLimits};
pub(crate) use controller::{pid_loop_arg, slot_arg};
pub use device::{
    ControlMode, Demand, FeedbackDevice, MotorController, NeutralMode, PidLoop, Slot, StatusCode,
};
pub use gains::{GainSet, GainTerm};
pub use imu::{Imu, ImuError, ImuRef, InertialSensor, SimImu};
pub use reset::{ConfigDomain, ResetOptions, ResetReport};
pub use sim::SimController;
