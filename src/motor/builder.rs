// Builder for freshly configured motor controllers
//
// Collects the settings a subsystem usually wants, then resets the device and
// applies them on top of the factory state in one go.

use std::time::Duration;

use tracing::{info, warn};

use super::controller::{Controller, ControllerError, CurrentLimit};
use super::device::{MotorController, NeutralMode, StatusFrame, VelocityMeasPeriod};
use super::reset::{ResetOptions, ResetReport};
use crate::config::{DEFAULT_TIMEOUT, LOOP_PERIOD, MAX_VOLTAGE};

/// Result of building a controller: the controller itself plus what went
/// wrong along the way, if anything
pub struct Built {
    pub controller: Controller,
    pub reset: ResetReport,
    pub errors: Vec<ControllerError>,
}

impl Built {
    pub fn is_success(&self) -> bool {
        self.reset.is_success() && self.errors.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ControllerBuilder {
    timeout: Duration,
    reset: ResetOptions,
    neutral_mode: NeutralMode,
    inverted: bool,
    sensor_phase: bool,
    velocity_period: VelocityMeasPeriod,
    velocity_window: u32,
    voltage_filter: u32,
    voltage_compensation: Option<f64>,
    current_limit: Option<CurrentLimit>,
    fast_frame_ms: u32,
    slow_frame_ms: u32,
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        let fast_frame_ms = LOOP_PERIOD.as_millis() as u32;
        Self {
            timeout: DEFAULT_TIMEOUT,
            reset: ResetOptions::default(),
            neutral_mode: NeutralMode::Coast,
            inverted: false,
            sensor_phase: false,
            velocity_period: VelocityMeasPeriod::Period100Ms,
            velocity_window: 16,
            voltage_filter: 16,
            voltage_compensation: Some(MAX_VOLTAGE),
            current_limit: None,
            fast_frame_ms,
            slow_frame_ms: 2 * fast_frame_ms,
        }
    }
}

impl ControllerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn reset_retries(mut self, retries: u8) -> Self {
        self.reset.retries = retries;
        self
    }

    pub fn neutral_mode(mut self, mode: NeutralMode) -> Self {
        self.neutral_mode = mode;
        self
    }

    pub fn inverted(mut self, inverted: bool) -> Self {
        self.inverted = inverted;
        self
    }

    pub fn sensor_phase(mut self, phase: bool) -> Self {
        self.sensor_phase = phase;
        self
    }

    pub fn velocity_measurement_period(mut self, period: VelocityMeasPeriod) -> Self {
        self.velocity_period = period;
        self
    }

    pub fn velocity_window(mut self, window: u32) -> Self {
        self.velocity_window = window;
        self
    }

    pub fn voltage_filter(mut self, samples: u32) -> Self {
        self.voltage_filter = samples;
        self
    }

    /// Saturation voltage, or `None` to leave compensation off
    pub fn voltage_compensation(mut self, volts: Option<f64>) -> Self {
        self.voltage_compensation = volts;
        self
    }

    pub fn current_limit(mut self, limit: CurrentLimit) -> Self {
        self.current_limit = Some(limit);
        self
    }

    /// Periods for the feedback (fast) and telemetry (slow) status frames
    pub fn frame_periods(mut self, fast_ms: u32, slow_ms: u32) -> Self {
        self.fast_frame_ms = fast_ms;
        self.slow_frame_ms = slow_ms;
        self
    }

    pub fn build(&self, device: Box<dyn MotorController>) -> Built {
        let mut controller = Controller::with_timeout(device, self.timeout);
        let reset = controller.reset_with(self.reset);

        let mut errors = Vec::new();
        let mut record = |r: Result<(), ControllerError>| {
            if let Err(e) = r {
                errors.push(e);
            }
        };

        record(controller.set_neutral_mode(self.neutral_mode));
        record(controller.set_inverted(self.inverted));
        record(controller.set_sensor_phase(self.sensor_phase));
        record(controller.config_velocity_measurement_period(self.velocity_period));
        record(controller.config_velocity_measurement_window(self.velocity_window));
        record(controller.config_voltage_measurement_filter(self.voltage_filter));
        if let Some(volts) = self.voltage_compensation {
            record(controller.config_voltage_comp_saturation(volts));
            record(controller.enable_voltage_compensation(true));
        }
        if let Some(limit) = self.current_limit {
            record(controller.config_current_limit(limit, None));
        }
        record(controller.set_status_frame_period(StatusFrame::Feedback0, self.fast_frame_ms));
        record(controller.set_status_frame_period(StatusFrame::AnalogTempVbat, self.slow_frame_ms));

        if errors.is_empty() && reset.is_success() {
            info!("Controller {} built", controller.device_id());
        } else {
            warn!(
                "Controller {} built with {} reset failures and {} setting failures",
                controller.device_id(),
                reset.failures.len(),
                errors.len()
            );
        }

        Built {
            controller,
            reset,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::device::StatusCode;
    use crate::motor::sim::SimController;

    #[test]
    fn test_build_applies_settings_after_reset() {
        let sim = SimController::new(21);
        let built = ControllerBuilder::new()
            .neutral_mode(NeutralMode::Brake)
            .inverted(true)
            .current_limit(CurrentLimit {
                peak_amps: 40.0,
                peak_duration_ms: 20,
                continuous_amps: 30.0,
            })
            .build(Box::new(sim.clone()));

        assert!(built.is_success());
        let state = sim.state();
        assert_eq!(state.neutral_mode, NeutralMode::Brake);
        assert!(state.inverted);
        assert!(state.current_limit_enabled);
        assert_eq!(state.velocity_measurement_window, 16);
        assert!(state.voltage_comp_enabled);
        assert_eq!(state.voltage_comp_saturation, MAX_VOLTAGE);
        assert!(state.status_frame_periods.contains(&(StatusFrame::Feedback0, 20)));
        assert!(state.status_frame_periods.contains(&(StatusFrame::AnalogTempVbat, 40)));
    }

    #[test]
    fn test_build_uses_builder_timeout() {
        let sim = SimController::new(22);
        let built = ControllerBuilder::new()
            .timeout(Duration::from_millis(25))
            .voltage_compensation(None)
            .build(Box::new(sim.clone()));
        assert_eq!(built.controller.default_timeout(), Duration::from_millis(25));
        assert!(sim.timeouts().iter().all(|&t| t == Duration::from_millis(25)));
        assert!(!sim.state().voltage_comp_enabled);
    }

    #[test]
    fn test_build_reports_reset_failures() {
        let sim = SimController::new(23);
        sim.fail_next(1, StatusCode::Timeout);
        let built = ControllerBuilder::new().build(Box::new(sim));
        assert!(!built.is_success());
        assert_eq!(built.reset.failures.len(), 1);
        assert!(built.errors.is_empty());
    }
}
