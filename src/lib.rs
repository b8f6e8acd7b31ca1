// Motor controller abstraction and paired-actuator subsystems
//
// Layers, bottom up:
// - units: angle, position, speed and time conversions
// - motor: device traits, controller facade, reset, simulated devices
// - subsystem: paired actuators and the mechanisms built on them
// - runtime: 50 Hz control loop over zenoh

pub mod config;
pub mod messages;
pub mod motor;
pub mod runtime;
pub mod subsystem;
pub mod units;
