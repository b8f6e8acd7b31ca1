// Differential (tank) drivetrain on top of a paired actuator
//
// Converts arcade-style (speed, turn) commands into left/right outputs and
// reports wheel travel in feet using the drivetrain's own wheel diameter.

use tracing::{info, warn};

use super::paired::{BroadcastReport, Followers, PairedActuator, Side, shared};
use crate::config::RobotConfig;
use crate::motor::{
    ControlMode, ControllerBuilder, ControllerError, FeedbackDevice, ImuError, ImuRef,
    MotorController,
};
use crate::units::{AngleUnit, PositionUnit, SpeedUnit, UnitConverter, UnitError};

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Imu(#[from] ImuError),

    #[error("No IMU attached to the drivetrain")]
    NoImu,
}

pub type Result<T> = std::result::Result<T, DriveError>;

/// Arcade mixing of a forward and a turn command into (left, right)
///
/// Turn is squared (sign kept) for finer control near center, then both sides
/// are scaled down together so neither leaves [-1, 1] for percent inputs.
pub fn arcade_mix(speed: f64, turn: f64) -> (f64, f64) {
    let turn_sq = turn * turn;
    let divisor = 1f64
        .max((speed + turn_sq).abs())
        .max((speed - turn_sq).abs());
    let curved = turn * turn.abs();
    ((speed + curved) / divisor, (speed - curved) / divisor)
}

pub struct Drivetrain {
    actuator: PairedActuator,
    converter: UnitConverter,
}

impl Drivetrain {
    /// `wheel_diameter` is in inches and must be positive
    pub fn new(actuator: PairedActuator, wheel_diameter: f64) -> Result<Self> {
        Ok(Self {
            actuator,
            converter: UnitConverter::with_wheel_diameter(wheel_diameter)?,
        })
    }

    /// Build and configure every drivetrain controller described by `config`
    ///
    /// `open` supplies the raw device for a CAN ID. Device failures during
    /// setup do not abort; they come back in the report.
    pub fn from_config<F>(config: &RobotConfig, mut open: F) -> Result<(Self, BroadcastReport)>
    where
        F: FnMut(u8) -> Box<dyn MotorController>,
    {
        let dt = &config.drivetrain;
        let builder = ControllerBuilder::new()
            .timeout(config.timeout())
            .neutral_mode(dt.neutral_mode);

        let mut report = BroadcastReport::default();
        let mut build = |id: u8| {
            let built = builder.build(open(id));
            report.failures.extend(built.errors);
            for (domain, code) in built.reset.failures {
                warn!("Controller {} reset {:?} failed: {}", id, domain, code);
                report.failures.push(ControllerError::Device {
                    device_id: id,
                    code,
                });
            }
            shared(built.controller)
        };

        let left = build(dt.left_master);
        let right = build(dt.right_master);
        let actuator = match dt.followers {
            Some((left_id, right_id)) => {
                let followers = Followers {
                    left: build(left_id),
                    right: build(right_id),
                };
                PairedActuator::with_followers(left, right, followers)
            }
            None => PairedActuator::new(left, right),
        };

        if let Some(limit) = dt.current_limit {
            report.merge(actuator.set_current_limit(
                limit.peak_amps,
                limit.peak_duration_ms,
                limit.continuous_amps,
                None,
            ));
        }
        report.merge(actuator.config_both_feedback_sensors(FeedbackDevice::QuadEncoder, 0)?);
        report.merge(actuator.config_closed_loop_constants(
            dt.velocity_slot,
            &dt.left_gains,
            &dt.right_gains,
        )?);
        report.merge(actuator.apply_to_masters(|c| c.select_profile_slot(dt.velocity_slot, 0)));

        info!(
            "Drivetrain ready: masters {}/{}, followers {:?}, wheel {} in",
            dt.left_master, dt.right_master, dt.followers, dt.wheel_diameter
        );
        Ok((Self::new(actuator, dt.wheel_diameter)?, report))
    }

    pub fn with_imu(self, imu: ImuRef) -> Self {
        Self {
            actuator: self.actuator.with_imu(imu),
            converter: self.converter,
        }
    }

    pub fn actuator(&self) -> &PairedActuator {
        &self.actuator
    }

    pub fn converter(&self) -> &UnitConverter {
        &self.converter
    }

    /// Arcade drive in percent output; both inputs in [-1, 1], positive turn
    /// is to the right
    pub fn arcade_drive_percent_output(&self, speed: f64, turn: f64) -> BroadcastReport {
        let (left, right) = arcade_mix(speed, turn);
        self.actuator.set_sides(ControlMode::PercentOutput, left, right)
    }

    /// Arcade drive in closed-loop velocity
    ///
    /// `speed` and `turn` are in [-1, 1] like the percent drive. The mixed
    /// sides are scaled by `max_velocity`, in ticks per 100 ms.
    pub fn arcade_drive_velocity(&self, speed: f64, turn: f64, max_velocity: f64) -> BroadcastReport {
        let (left, right) = arcade_mix(speed, turn);
        self.actuator.set_sides(
            ControlMode::Velocity,
            left * max_velocity,
            right * max_velocity,
        )
    }

    pub fn stop(&self) -> BroadcastReport {
        self.actuator.set_both(ControlMode::PercentOutput, 0.0)
    }

    /// Distance travelled by one side, in feet
    pub fn position_feet(&self, side: Side, pid_loop: u8) -> Result<f64> {
        let ticks = self.actuator.master(side).borrow_mut().sensor_position(pid_loop)?;
        Ok(self
            .converter
            .convert(PositionUnit::EncoderTicks, ticks, PositionUnit::Feet)?)
    }

    pub fn velocity_feet_per_second(&self, side: Side, pid_loop: u8) -> Result<f64> {
        let native = self.actuator.master(side).borrow_mut().sensor_velocity(pid_loop)?;
        Ok(self.converter.convert(
            SpeedUnit::EncoderTicksPer100ms,
            native,
            SpeedUnit::FeetPerSecond,
        )?)
    }

    /// Heading from the attached IMU
    pub fn heading(&self, unit: AngleUnit) -> Result<f64> {
        let imu = self.actuator.imu().ok_or(DriveError::NoImu)?;
        Ok(imu.borrow_mut().heading(unit)?)
    }
}
