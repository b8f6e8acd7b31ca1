// Factory-default reset for a motor controller
//
// Settings persist on the device across power cycles, so a controller coming
// out of a previous program can carry stale gains or limits. reset() writes
// every configuration domain back to a known state. A failed write does not
// stop the sequence; failures are collected into the report instead.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::controller::Controller;
use super::device::{
    ControlMode, Demand, DeviceResult, FeedbackDevice, LimitSwitchNormal, LimitSwitchSource,
    MotorController, NeutralMode, PidLoop, SensorTerm, Slot, StatusCode, VelocityMeasPeriod,
};

// === Factory defaults ===
pub const SENSOR: FeedbackDevice = FeedbackDevice::QuadEncoder;
pub const FEEDBACK_COEFFICIENT: f64 = 1.0;
pub const SENSOR_PHASE: bool = false;
pub const INVERTED: bool = false;
pub const NEUTRAL_MODE: NeutralMode = NeutralMode::Coast;
pub const SENSOR_POSITION: f64 = 0.0;

pub const VELOCITY_MEASUREMENT_PERIOD: VelocityMeasPeriod = VelocityMeasPeriod::Period100Ms;
pub const VELOCITY_MEASUREMENT_WINDOW: u32 = 64;

pub const NOMINAL_OUTPUT_FORWARD: f64 = 0.0;
pub const NOMINAL_OUTPUT_REVERSE: f64 = 0.0;
pub const PEAK_OUTPUT_FORWARD: f64 = 1.0;
pub const PEAK_OUTPUT_REVERSE: f64 = -1.0;
pub const NEUTRAL_DEADBAND: f64 = 0.04;
pub const OPEN_LOOP_RAMP: f64 = 0.0;
pub const CLOSED_LOOP_RAMP: f64 = 0.0;

pub const GAIN: f64 = 0.0;
pub const INTEGRAL_ZONE: f64 = 0.0;
pub const MAX_INTEGRAL_ACCUMULATOR: f64 = 0.0;
pub const ALLOWABLE_CLOSED_LOOP_ERROR: f64 = 0.0;
pub const CLOSED_LOOP_PEAK_OUTPUT: f64 = 1.0;
pub const CLOSED_LOOP_PERIOD_MS: u32 = 1;

pub const CRUISE_VELOCITY: f64 = 0.0;
pub const ACCELERATION: f64 = 0.0;
pub const TRAJECTORY_PERIOD_MS: u32 = 0;

pub const CURRENT_LIMIT_ENABLED: bool = false;
pub const PEAK_CURRENT_LIMIT: f64 = 0.0;
pub const PEAK_CURRENT_DURATION_MS: u32 = 0;
pub const CONTINUOUS_CURRENT_LIMIT: f64 = 0.0;

pub const VOLTAGE_COMP_ENABLED: bool = false;
pub const VOLTAGE_COMP_SATURATION: f64 = 0.0;
pub const VOLTAGE_MEASUREMENT_FILTER: u32 = 32;

pub const SOFT_LIMIT_THRESHOLD: f64 = 0.0;
pub const SOFT_LIMIT_ENABLED: bool = false;
pub const LIMIT_SOURCE: LimitSwitchSource = LimitSwitchSource::Deactivated;
pub const LIMIT_NORMAL: LimitSwitchNormal = LimitSwitchNormal::NormallyOpen;

pub const AUX_PID_POLARITY: bool = false;

/// Configuration domains, in the order reset() applies them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigDomain {
    FeedbackSensor,
    SensorPhase,
    NeutralMode,
    SensorPosition,
    VelocityMeasurement,
    OutputRange,
    NeutralDeadband,
    Ramp,
    GainSlot(Slot),
    MotionProfile,
    CurrentLimit,
    VoltageCompensation,
    SoftLimit,
    LimitSwitch,
    SensorTerm,
    AuxPidPolarity,
    ProfileSelection,
    NeutralOutput,
}

/// Per-call budget for a reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResetOptions {
    /// Overrides the controller's default timeout when set
    pub timeout: Option<Duration>,
    /// Extra attempts for a call that returns a failure status
    pub retries: u8,
}

/// Outcome of a reset: every call that still failed after its retries
#[derive(Debug, Clone, PartialEq)]
pub struct ResetReport {
    pub device_id: u8,
    pub failures: Vec<(ConfigDomain, StatusCode)>,
}

impl ResetReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Domains that had at least one failed write
    pub fn failed_domains(&self) -> Vec<ConfigDomain> {
        let mut domains: Vec<ConfigDomain> = Vec::new();
        for &(domain, _) in &self.failures {
            if !domains.contains(&domain) {
                domains.push(domain);
            }
        }
        domains
    }
}

/// Applies calls for one reset, retrying and recording failures
struct ResetRun<'a> {
    device: &'a mut dyn MotorController,
    timeout: Duration,
    retries: u8,
    failures: Vec<(ConfigDomain, StatusCode)>,
}

impl ResetRun<'_> {
    fn apply<F>(&mut self, domain: ConfigDomain, mut call: F)
    where
        F: FnMut(&mut dyn MotorController, Duration) -> DeviceResult,
    {
        let mut attempt = 0;
        loop {
            match call(&mut *self.device, self.timeout) {
                Ok(()) => return,
                Err(code) if attempt < self.retries => {
                    attempt += 1;
                    debug!(
                        "Controller {}: {:?} failed with {}, retry {}/{}",
                        self.device.device_id(),
                        domain,
                        code,
                        attempt,
                        self.retries
                    );
                }
                Err(code) => {
                    warn!(
                        "Controller {}: {:?} failed with {}",
                        self.device.device_id(),
                        domain,
                        code
                    );
                    self.failures.push((domain, code));
                    return;
                }
            }
        }
    }
}

impl Controller {
    /// Reset to factory defaults using the default timeout and no retries
    pub fn reset(&mut self) -> ResetReport {
        self.reset_with(ResetOptions::default())
    }

    /// Reset to factory defaults with an explicit call budget
    pub fn reset_with(&mut self, options: ResetOptions) -> ResetReport {
        let timeout = options.timeout.unwrap_or(self.default_timeout());
        let device_id = self.device_id();
        info!("Resetting controller {} to factory defaults", device_id);

        let mut run = ResetRun {
            device: self.device_mut(),
            timeout,
            retries: options.retries,
            failures: Vec::new(),
        };
        apply_defaults(&mut run);

        let report = ResetReport {
            device_id,
            failures: run.failures,
        };
        if report.is_success() {
            info!("Controller {} reset complete", device_id);
        } else {
            warn!(
                "Controller {} reset finished with {} failed writes in {:?}",
                device_id,
                report.failures.len(),
                report.failed_domains()
            );
        }
        report
    }
}

fn apply_defaults(run: &mut ResetRun<'_>) {
    use ConfigDomain as D;
    let primary = PidLoop::Primary;

    run.apply(D::FeedbackSensor, |d, t| {
        d.config_selected_feedback_sensor(SENSOR, primary, t)
    });
    run.apply(D::FeedbackSensor, |d, t| {
        d.config_selected_feedback_coefficient(FEEDBACK_COEFFICIENT, primary, t)
    });
    run.apply(D::SensorPhase, |d, _| d.set_sensor_phase(SENSOR_PHASE));
    run.apply(D::SensorPhase, |d, _| d.set_inverted(INVERTED));
    run.apply(D::NeutralMode, |d, _| d.set_neutral_mode(NEUTRAL_MODE));
    run.apply(D::SensorPosition, |d, t| {
        d.set_selected_sensor_position(SENSOR_POSITION, primary, t)
    });
    run.apply(D::VelocityMeasurement, |d, t| {
        d.config_velocity_measurement_period(VELOCITY_MEASUREMENT_PERIOD, t)
    });
    run.apply(D::VelocityMeasurement, |d, t| {
        d.config_velocity_measurement_window(VELOCITY_MEASUREMENT_WINDOW, t)
    });

    run.apply(D::OutputRange, |d, t| {
        d.config_nominal_output_forward(NOMINAL_OUTPUT_FORWARD, t)
    });
    run.apply(D::OutputRange, |d, t| {
        d.config_nominal_output_reverse(NOMINAL_OUTPUT_REVERSE, t)
    });
    run.apply(D::OutputRange, |d, t| d.config_peak_output_forward(PEAK_OUTPUT_FORWARD, t));
    run.apply(D::OutputRange, |d, t| d.config_peak_output_reverse(PEAK_OUTPUT_REVERSE, t));
    run.apply(D::NeutralDeadband, |d, t| d.config_neutral_deadband(NEUTRAL_DEADBAND, t));
    run.apply(D::Ramp, |d, t| d.config_open_loop_ramp(OPEN_LOOP_RAMP, t));
    run.apply(D::Ramp, |d, t| d.config_closed_loop_ramp(CLOSED_LOOP_RAMP, t));

    // Every slot, or stale gains survive in the ones we skipped
    for slot in Slot::ALL {
        let domain = D::GainSlot(slot);
        run.apply(domain, |d, t| d.config_kp(slot, GAIN, t));
        run.apply(domain, |d, t| d.config_ki(slot, GAIN, t));
        run.apply(domain, |d, t| d.config_kd(slot, GAIN, t));
        run.apply(domain, |d, t| d.config_kf(slot, GAIN, t));
        run.apply(domain, |d, t| d.config_integral_zone(slot, INTEGRAL_ZONE, t));
        run.apply(domain, |d, t| {
            d.config_max_integral_accumulator(slot, MAX_INTEGRAL_ACCUMULATOR, t)
        });
        run.apply(domain, |d, t| {
            d.config_allowable_closed_loop_error(slot, ALLOWABLE_CLOSED_LOOP_ERROR, t)
        });
        run.apply(domain, |d, _| d.select_profile_slot(slot, primary));
        run.apply(domain, |d, t| {
            d.config_closed_loop_peak_output(slot, CLOSED_LOOP_PEAK_OUTPUT, t)
        });
        run.apply(domain, |d, t| {
            d.config_closed_loop_period(slot, CLOSED_LOOP_PERIOD_MS, t)
        });
    }

    run.apply(D::MotionProfile, |d, t| d.config_motion_cruise_velocity(CRUISE_VELOCITY, t));
    run.apply(D::MotionProfile, |d, t| d.config_motion_acceleration(ACCELERATION, t));
    run.apply(D::MotionProfile, |d, t| {
        d.config_motion_profile_trajectory_period(TRAJECTORY_PERIOD_MS, t)
    });

    run.apply(D::CurrentLimit, |d, _| d.enable_current_limit(CURRENT_LIMIT_ENABLED));
    run.apply(D::CurrentLimit, |d, t| {
        d.config_peak_current_duration(PEAK_CURRENT_DURATION_MS, t)
    });
    run.apply(D::CurrentLimit, |d, t| d.config_peak_current_limit(PEAK_CURRENT_LIMIT, t));
    run.apply(D::CurrentLimit, |d, t| {
        d.config_continuous_current_limit(CONTINUOUS_CURRENT_LIMIT, t)
    });

    run.apply(D::VoltageCompensation, |d, _| {
        d.enable_voltage_compensation(VOLTAGE_COMP_ENABLED)
    });
    run.apply(D::VoltageCompensation, |d, t| {
        d.config_voltage_comp_saturation(VOLTAGE_COMP_SATURATION, t)
    });
    run.apply(D::VoltageCompensation, |d, t| {
        d.config_voltage_measurement_filter(VOLTAGE_MEASUREMENT_FILTER, t)
    });

    run.apply(D::SoftLimit, |d, t| {
        d.config_forward_soft_limit_threshold(SOFT_LIMIT_THRESHOLD, t)
    });
    run.apply(D::SoftLimit, |d, t| {
        d.config_reverse_soft_limit_threshold(SOFT_LIMIT_THRESHOLD, t)
    });
    run.apply(D::SoftLimit, |d, t| d.config_forward_soft_limit_enable(SOFT_LIMIT_ENABLED, t));
    run.apply(D::SoftLimit, |d, t| d.config_reverse_soft_limit_enable(SOFT_LIMIT_ENABLED, t));
    run.apply(D::LimitSwitch, |d, t| {
        d.config_forward_limit_switch_source(LIMIT_SOURCE, LIMIT_NORMAL, t)
    });
    run.apply(D::LimitSwitch, |d, t| {
        d.config_reverse_limit_switch_source(LIMIT_SOURCE, LIMIT_NORMAL, t)
    });

    for term in SensorTerm::ALL {
        run.apply(D::SensorTerm, |d, t| d.config_sensor_term(term, SENSOR, t));
    }

    run.apply(D::AuxPidPolarity, |d, t| d.config_aux_pid_polarity(AUX_PID_POLARITY, t));

    // The slot loop leaves the last slot selected
    run.apply(D::ProfileSelection, |d, _| {
        d.select_profile_slot(Slot::ALL[0], primary)
    });

    run.apply(D::NeutralOutput, |d, _| {
        d.set(ControlMode::Disabled, 0.0, Demand::Neutral)
    });
}
