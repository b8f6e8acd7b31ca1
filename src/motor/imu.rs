// Inertial sensor (gyro) facade
//
// Same pattern as the motor controller: raw device trait below, a wrapper with
// a default timeout on top.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use super::device::{DeviceResult, StatusCode};
use crate::config::DEFAULT_TIMEOUT;
use crate::units::{
    AngleUnit, DEGREES_PER_ROTATION, SENSOR_UNITS_PER_ROTATION, UnitConverter, UnitError,
};

/// Firmware scales a written yaw down by this factor; writes compensate for it
pub const YAW_WRITE_SCALE: f64 = 64.0;

/// Raw operations of an inertial measurement unit
pub trait InertialSensor {
    fn device_id(&self) -> u8;

    /// Yaw, pitch and roll in degrees
    fn yaw_pitch_roll(&mut self) -> DeviceResult<[f64; 3]>;
    /// Overwrite yaw with a raw (firmware-scaled) value
    fn set_yaw(&mut self, raw: f64, timeout: Duration) -> DeviceResult;
    fn add_yaw(&mut self, raw: f64, timeout: Duration) -> DeviceResult;
    fn set_accum_z_angle(&mut self, degrees: f64, timeout: Duration) -> DeviceResult;
}

#[derive(Debug, thiserror::Error)]
pub enum ImuError {
    #[error("IMU {device_id} returned {code}")]
    Device { device_id: u8, code: StatusCode },

    #[error(transparent)]
    Unit(#[from] UnitError),
}

pub type Result<T = ()> = std::result::Result<T, ImuError>;

/// An inertial sensor with a default timeout bound to it
pub struct Imu {
    device: Box<dyn InertialSensor>,
    timeout: Duration,
    converter: UnitConverter,
}

impl Imu {
    pub fn new(device: Box<dyn InertialSensor>) -> Self {
        Self::with_timeout(device, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(device: Box<dyn InertialSensor>, timeout: Duration) -> Self {
        Self {
            device,
            timeout,
            converter: UnitConverter::new(),
        }
    }

    pub fn device_id(&self) -> u8 {
        self.device.device_id()
    }

    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_default_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn check<T>(&self, result: DeviceResult<T>) -> Result<T> {
        result.map_err(|code| ImuError::Device {
            device_id: self.device.device_id(),
            code,
        })
    }

    pub fn yaw(&mut self) -> Result<f64> {
        let r = self.device.yaw_pitch_roll();
        self.check(r).map(|ypr| ypr[0])
    }

    pub fn pitch(&mut self) -> Result<f64> {
        let r = self.device.yaw_pitch_roll();
        self.check(r).map(|ypr| ypr[1])
    }

    pub fn roll(&mut self) -> Result<f64> {
        let r = self.device.yaw_pitch_roll();
        self.check(r).map(|ypr| ypr[2])
    }

    /// Yaw expressed in any angle unit
    pub fn heading(&mut self, unit: AngleUnit) -> Result<f64> {
        let degrees = self.yaw()?;
        Ok(self.converter.convert(AngleUnit::Degrees, degrees, unit)?)
    }

    /// Set yaw, in sensor-native units (8192 per rotation)
    pub fn set_yaw(&mut self, native: f64) -> Result {
        let r = self.device.set_yaw(native * YAW_WRITE_SCALE, self.timeout);
        self.check(r)
    }

    /// Add to yaw, in sensor-native units (8192 per rotation)
    pub fn add_yaw(&mut self, native: f64) -> Result {
        let r = self.device.add_yaw(native * YAW_WRITE_SCALE, self.timeout);
        self.check(r)
    }

    pub fn zero(&mut self) -> Result {
        self.set_yaw(0.0)?;
        let r = self.device.set_accum_z_angle(0.0, self.timeout);
        self.check(r)
    }
}

/// Shared handle; a drivetrain and a heading controller can both hold one
pub type ImuRef = Rc<RefCell<Imu>>;

/// In-memory IMU; clones share the same readings
#[derive(Debug, Clone)]
pub struct SimImu {
    id: u8,
    ypr: Rc<RefCell<[f64; 3]>>,
}

impl SimImu {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            ypr: Rc::new(RefCell::new([0.0; 3])),
        }
    }

    /// Feed yaw, pitch and roll in degrees
    pub fn set_orientation(&self, yaw: f64, pitch: f64, roll: f64) {
        *self.ypr.borrow_mut() = [yaw, pitch, roll];
    }
}

impl InertialSensor for SimImu {
    fn device_id(&self) -> u8 {
        self.id
    }

    fn yaw_pitch_roll(&mut self) -> DeviceResult<[f64; 3]> {
        Ok(*self.ypr.borrow())
    }

    fn set_yaw(&mut self, raw: f64, _timeout: Duration) -> DeviceResult {
        // Firmware divides by the write scale, then stores degrees
        let native = raw / YAW_WRITE_SCALE;
        self.ypr.borrow_mut()[0] = native * DEGREES_PER_ROTATION / SENSOR_UNITS_PER_ROTATION;
        Ok(())
    }

    fn add_yaw(&mut self, raw: f64, _timeout: Duration) -> DeviceResult {
        let native = raw / YAW_WRITE_SCALE;
        self.ypr.borrow_mut()[0] += native * DEGREES_PER_ROTATION / SENSOR_UNITS_PER_ROTATION;
        Ok(())
    }

    fn set_accum_z_angle(&mut self, _degrees: f64, _timeout: Duration) -> DeviceResult {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaw_pitch_roll_split() {
        let sim = SimImu::new(30);
        sim.set_orientation(45.0, -3.0, 1.5);
        let mut imu = Imu::new(Box::new(sim));
        assert_eq!(imu.yaw().unwrap(), 45.0);
        assert_eq!(imu.pitch().unwrap(), -3.0);
        assert_eq!(imu.roll().unwrap(), 1.5);
    }

    #[test]
    fn test_heading_in_radians() {
        let sim = SimImu::new(31);
        sim.set_orientation(180.0, 0.0, 0.0);
        let mut imu = Imu::new(Box::new(sim));
        let heading = imu.heading(AngleUnit::Radians).unwrap();
        assert!((heading - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn test_set_yaw_compensates_firmware_scale() {
        let sim = SimImu::new(32);
        let mut imu = Imu::new(Box::new(sim.clone()));
        // 2048 native units is a quarter turn
        imu.set_yaw(2048.0).unwrap();
        assert!((imu.yaw().unwrap() - 90.0).abs() < 1e-9);
        imu.add_yaw(2048.0).unwrap();
        assert!((imu.yaw().unwrap() - 180.0).abs() < 1e-9);
        imu.zero().unwrap();
        assert_eq!(imu.yaw().unwrap(), 0.0);
    }
}
