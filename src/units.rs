// Unit conversion between physical and device-native quantities
//
// Units are grouped into families (angle, position, speed, time). A conversion
// is only defined between two units of the same family. Position and speed
// additionally depend on the wheel diameter, which is owned by the converter
// instead of living in global state.

use std::f64::consts::PI;
use std::fmt;

/// Sensor-native angle units in one rotation (inertial sensor resolution)
pub const SENSOR_UNITS_PER_ROTATION: f64 = 8192.0;
pub const DEGREES_PER_ROTATION: f64 = 360.0;
pub const RADIANS_PER_ROTATION: f64 = 2.0 * PI;

pub const MS_PER_SEC: f64 = 1e3;
pub const MICROS_PER_SEC: f64 = 1e6;
pub const NANOS_PER_SEC: f64 = 1e9;

/// Encoder resolution: 4096 ticks per revolution (magnetic encoder)
pub const TICKS_PER_REV: f64 = 4096.0;
pub const INCHES_PER_FOOT: f64 = 12.0;

/// Native speed is measured per 100 ms; this many sampling periods per second
const SPEED_PERIODS_PER_SEC: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleUnit {
    Radians,
    Degrees,
    SensorNative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionUnit {
    Feet,
    EncoderTicks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedUnit {
    FeetPerSecond,
    EncoderTicksPer100ms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

/// Any unit the converter understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Angle(AngleUnit),
    Position(PositionUnit),
    Speed(SpeedUnit),
    Time(TimeUnit),
}

/// The family a unit belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitFamily {
    Angle,
    Position,
    Speed,
    Time,
}

impl fmt::Display for UnitFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitFamily::Angle => "angle",
            UnitFamily::Position => "position",
            UnitFamily::Speed => "speed",
            UnitFamily::Time => "time",
        };
        f.write_str(name)
    }
}

impl Unit {
    pub fn family(self) -> UnitFamily {
        match self {
            Unit::Angle(_) => UnitFamily::Angle,
            Unit::Position(_) => UnitFamily::Position,
            Unit::Speed(_) => UnitFamily::Speed,
            Unit::Time(_) => UnitFamily::Time,
        }
    }
}

impl From<AngleUnit> for Unit {
    fn from(unit: AngleUnit) -> Self {
        Unit::Angle(unit)
    }
}

impl From<PositionUnit> for Unit {
    fn from(unit: PositionUnit) -> Self {
        Unit::Position(unit)
    }
}

impl From<SpeedUnit> for Unit {
    fn from(unit: SpeedUnit) -> Self {
        Unit::Speed(unit)
    }
}

impl From<TimeUnit> for Unit {
    fn from(unit: TimeUnit) -> Self {
        Unit::Time(unit)
    }
}

/// Error types for unit conversion
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum UnitError {
    #[error("Cannot convert between {from} and {to} units")]
    InvalidUnitFamily { from: UnitFamily, to: UnitFamily },

    #[error("{family} conversion requires a wheel diameter; call set_wheel_diameter() first")]
    ConfigurationRequired { family: UnitFamily },

    #[error("Wheel diameter must be a positive finite number of inches, got {0}")]
    InvalidWheelDiameter(f64),
}

pub type Result<T> = std::result::Result<T, UnitError>;

/// Converts values between units of the same family
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UnitConverter {
    wheel_diameter: Option<f64>, // inches
}

impl UnitConverter {
    /// Create a converter with no wheel diameter (angle and time only)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a converter for a drive wheel of the given diameter in inches
    pub fn with_wheel_diameter(inches: f64) -> Result<Self> {
        let mut converter = Self::new();
        converter.set_wheel_diameter(inches)?;
        Ok(converter)
    }

    /// Set (or replace) the wheel diameter used for position and speed
    pub fn set_wheel_diameter(&mut self, inches: f64) -> Result<()> {
        if !inches.is_finite() || inches <= 0.0 {
            return Err(UnitError::InvalidWheelDiameter(inches));
        }
        self.wheel_diameter = Some(inches);
        Ok(())
    }

    pub fn wheel_diameter(&self) -> Option<f64> {
        self.wheel_diameter
    }

    /// Convert `value` expressed in `from` into `to`
    pub fn convert(&self, from: impl Into<Unit>, value: f64, to: impl Into<Unit>) -> Result<f64> {
        let from = from.into();
        let to = to.into();

        if from.family() != to.family() {
            return Err(UnitError::InvalidUnitFamily {
                from: from.family(),
                to: to.family(),
            });
        }

        // Every unit is expressed as "how many of it make one base quantity",
        // so the conversion is value / per_base(from) * per_base(to).
        let from_per_base = self.per_base(from)?;
        let to_per_base = self.per_base(to)?;
        Ok(value / from_per_base * to_per_base)
    }

    /// Units per base quantity: rotations, seconds, feet and feet per second
    fn per_base(&self, unit: Unit) -> Result<f64> {
        let factor = match unit {
            Unit::Angle(AngleUnit::Radians) => RADIANS_PER_ROTATION,
            Unit::Angle(AngleUnit::Degrees) => DEGREES_PER_ROTATION,
            Unit::Angle(AngleUnit::SensorNative) => SENSOR_UNITS_PER_ROTATION,

            Unit::Time(TimeUnit::Seconds) => 1.0,
            Unit::Time(TimeUnit::Milliseconds) => MS_PER_SEC,
            Unit::Time(TimeUnit::Microseconds) => MICROS_PER_SEC,
            Unit::Time(TimeUnit::Nanoseconds) => NANOS_PER_SEC,

            // Feet need no diameter to scale, but the family is gated as a whole
            Unit::Position(PositionUnit::Feet) => {
                self.ticks_per_foot(UnitFamily::Position)?;
                1.0
            }
            Unit::Speed(SpeedUnit::FeetPerSecond) => {
                self.ticks_per_foot(UnitFamily::Speed)?;
                1.0
            }
            Unit::Position(PositionUnit::EncoderTicks) => self.ticks_per_foot(UnitFamily::Position)?,
            Unit::Speed(SpeedUnit::EncoderTicksPer100ms) => {
                self.ticks_per_foot(UnitFamily::Speed)? / SPEED_PERIODS_PER_SEC
            }
        };
        Ok(factor)
    }

    /// ticks -> revolutions -> inches of travel -> feet, inverted
    fn ticks_per_foot(&self, family: UnitFamily) -> Result<f64> {
        let diameter = self
            .wheel_diameter
            .ok_or(UnitError::ConfigurationRequired { family })?;
        Ok(TICKS_PER_REV * INCHES_PER_FOOT / (PI * diameter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANGLES: [AngleUnit; 3] = [AngleUnit::Radians, AngleUnit::Degrees, AngleUnit::SensorNative];
    const POSITIONS: [PositionUnit; 2] = [PositionUnit::Feet, PositionUnit::EncoderTicks];
    const SPEEDS: [SpeedUnit; 2] = [SpeedUnit::FeetPerSecond, SpeedUnit::EncoderTicksPer100ms];
    const TIMES: [TimeUnit; 4] = [
        TimeUnit::Seconds,
        TimeUnit::Milliseconds,
        TimeUnit::Microseconds,
        TimeUnit::Nanoseconds,
    ];
    const SAMPLES: [f64; 6] = [0.0, 1.0, -2.5, 360.0, 12345.678, -0.001];

    fn assert_close(actual: f64, expected: f64) {
        let scale = expected.abs().max(1.0);
        assert!(
            (actual - expected).abs() <= 1e-9 * scale,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_round_trips(converter: &UnitConverter, units: &[Unit]) {
        for &a in units {
            for &b in units {
                for &v in &SAMPLES {
                    let there = converter.convert(a, v, b).unwrap();
                    let back = converter.convert(b, there, a).unwrap();
                    assert_close(back, v);
                }
            }
        }
    }

    #[test]
    fn test_round_trip_every_family() {
        let converter = UnitConverter::with_wheel_diameter(6.0).unwrap();
        assert_round_trips(&converter, &ANGLES.map(Unit::from));
        assert_round_trips(&converter, &POSITIONS.map(Unit::from));
        assert_round_trips(&converter, &SPEEDS.map(Unit::from));
        assert_round_trips(&converter, &TIMES.map(Unit::from));
    }

    #[test]
    fn test_angle_fixed_points() {
        let converter = UnitConverter::new();
        assert_eq!(
            converter.convert(AngleUnit::Degrees, 360.0, AngleUnit::Radians).unwrap(),
            2.0 * PI
        );
        assert_eq!(
            converter.convert(AngleUnit::Degrees, 360.0, AngleUnit::SensorNative).unwrap(),
            8192.0
        );
        assert_close(
            converter.convert(AngleUnit::SensorNative, 2048.0, AngleUnit::Degrees).unwrap(),
            90.0,
        );
    }

    #[test]
    fn test_time_scales() {
        let converter = UnitConverter::new();
        assert_close(converter.convert(TimeUnit::Seconds, 1.5, TimeUnit::Milliseconds).unwrap(), 1500.0);
        assert_close(converter.convert(TimeUnit::Nanoseconds, 2e6, TimeUnit::Milliseconds).unwrap(), 2.0);
        assert_close(converter.convert(TimeUnit::Microseconds, 20.0, TimeUnit::Nanoseconds).unwrap(), 20_000.0);
    }

    #[test]
    fn test_family_mismatch_is_rejected() {
        let converter = UnitConverter::with_wheel_diameter(4.0).unwrap();
        let err = converter
            .convert(AngleUnit::Degrees, 1.0, TimeUnit::Seconds)
            .unwrap_err();
        assert_eq!(
            err,
            UnitError::InvalidUnitFamily {
                from: UnitFamily::Angle,
                to: UnitFamily::Time
            }
        );
        assert!(converter
            .convert(PositionUnit::Feet, 1.0, SpeedUnit::FeetPerSecond)
            .is_err());
    }

    #[test]
    fn test_position_and_speed_require_wheel_diameter() {
        let converter = UnitConverter::new();
        assert_eq!(
            converter.convert(PositionUnit::EncoderTicks, 4096.0, PositionUnit::Feet),
            Err(UnitError::ConfigurationRequired { family: UnitFamily::Position })
        );
        assert_eq!(
            converter.convert(SpeedUnit::FeetPerSecond, 1.0, SpeedUnit::FeetPerSecond),
            Err(UnitError::ConfigurationRequired { family: UnitFamily::Speed })
        );
        assert_eq!(
            converter.convert(PositionUnit::Feet, 2.0, PositionUnit::Feet),
            Err(UnitError::ConfigurationRequired { family: UnitFamily::Position })
        );
        assert_eq!(
            converter.convert(SpeedUnit::EncoderTicksPer100ms, 1.0, SpeedUnit::FeetPerSecond),
            Err(UnitError::ConfigurationRequired { family: UnitFamily::Speed })
        );
        // Angle and time never need it
        assert!(converter.convert(AngleUnit::Radians, 1.0, AngleUnit::Degrees).is_ok());
    }

    #[test]
    fn test_one_revolution_in_feet() {
        let mut converter = UnitConverter::new();
        converter.set_wheel_diameter(4.0).unwrap();
        let feet = converter
            .convert(PositionUnit::EncoderTicks, 4096.0, PositionUnit::Feet)
            .unwrap();
        assert_close(feet, 4.0 * PI / 12.0);
        assert!((feet - 1.047).abs() < 1e-3);
    }

    #[test]
    fn test_speed_uses_100ms_period() {
        let converter = UnitConverter::with_wheel_diameter(4.0).unwrap();
        // One revolution per 100 ms is ten revolutions per second
        let fps = converter
            .convert(SpeedUnit::EncoderTicksPer100ms, 4096.0, SpeedUnit::FeetPerSecond)
            .unwrap();
        assert_close(fps, 10.0 * 4.0 * PI / 12.0);
    }

    #[test]
    fn test_wheel_diameter_can_be_overwritten() {
        let mut converter = UnitConverter::with_wheel_diameter(4.0).unwrap();
        converter.set_wheel_diameter(8.0).unwrap();
        let feet = converter
            .convert(PositionUnit::EncoderTicks, 4096.0, PositionUnit::Feet)
            .unwrap();
        assert_close(feet, 8.0 * PI / 12.0);
    }

    #[test]
    fn test_invalid_wheel_diameter() {
        let mut converter = UnitConverter::new();
        assert_eq!(
            converter.set_wheel_diameter(0.0),
            Err(UnitError::InvalidWheelDiameter(0.0))
        );
        assert!(converter.set_wheel_diameter(f64::NAN).is_err());
        assert_eq!(converter.wheel_diameter(), None);
    }
}
