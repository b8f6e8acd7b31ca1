// Motor controller facade
//
// Forwards every device operation with the controller's default timeout, so
// call sites only pass one when they really need a different budget. Slot and
// loop indices are range-checked here before anything reaches the bus.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::device::{
    ControlMode, Demand, DeviceResult, FeedbackDevice, LimitSwitchNormal, LimitSwitchSource,
    MotorController, NeutralMode, PidLoop, SensorTerm, Slot, SlotConfig, StatusCode, StatusFrame,
    VelocityMeasPeriod, PID_LOOP_COUNT, SLOT_COUNT,
};
use super::gains::{GainSet, GainTerm};
use crate::config::DEFAULT_TIMEOUT;

/// Error types for controller operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControllerError {
    #[error("Invalid {name} {value}: expected 0..{limit}")]
    InvalidArgument {
        name: &'static str,
        value: u8,
        limit: u8,
    },

    #[error("Controller {device_id} returned {code}")]
    Device { device_id: u8, code: StatusCode },
}

pub type Result<T = ()> = std::result::Result<T, ControllerError>;

/// Supply current limiting for one controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentLimit {
    pub peak_amps: f64,
    pub peak_duration_ms: u32,
    pub continuous_amps: f64,
}

/// Firmware-enforced travel limits in sensor units
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SoftLimits {
    pub forward: Option<f64>,
    pub reverse: Option<f64>,
}

/// A motor controller with a default timeout bound to it
pub struct Controller {
    device: Box<dyn MotorController>,
    timeout: Duration,
}

impl Controller {
    /// Wrap a device using the crate-wide default timeout
    pub fn new(device: Box<dyn MotorController>) -> Self {
        Self::with_timeout(device, DEFAULT_TIMEOUT)
    }

    /// Wrap a device with its own default timeout
    pub fn with_timeout(device: Box<dyn MotorController>, timeout: Duration) -> Self {
        Self { device, timeout }
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

    /// Raw device access, for calls that need an explicit timeout
    pub fn device_mut(&mut self) -> &mut dyn MotorController {
        self.device.as_mut()
    }

    /// Attach the device ID to a raw status
    pub(crate) fn check<T>(&self, result: DeviceResult<T>) -> Result<T> {
        result.map_err(|code| ControllerError::Device {
            device_id: self.device.device_id(),
            code,
        })
    }

    /// First failed status of a composite write, after all of them ran
    fn first_failure(&self, writes: impl IntoIterator<Item = DeviceResult>) -> Result {
        writes
            .into_iter()
            .find_map(|r| r.err())
            .map_or(Ok(()), |code| self.check(Err(code)))
    }

    // === Output ===

    pub fn set(&mut self, mode: ControlMode, output: f64) -> Result {
        self.set_with_demand(mode, output, Demand::Neutral)
    }

    pub fn set_with_demand(&mut self, mode: ControlMode, output: f64, demand: Demand) -> Result {
        let r = self.device.set(mode, output, demand);
        self.check(r)
    }

    pub fn neutral_output(&mut self) -> Result {
        self.set(ControlMode::Disabled, 0.0)
    }

    /// Mirror another controller's output
    pub fn follow(&mut self, master: &Controller) -> Result {
        debug!("Controller {} following {}", self.device_id(), master.device_id());
        let r = self.device.follow(master.device_id());
        self.check(r)
    }

    pub fn set_neutral_mode(&mut self, mode: NeutralMode) -> Result {
        let r = self.device.set_neutral_mode(mode);
        self.check(r)
    }

    pub fn set_inverted(&mut self, invert: bool) -> Result {
        let r = self.device.set_inverted(invert);
        self.check(r)
    }

    pub fn set_sensor_phase(&mut self, phase: bool) -> Result {
        let r = self.device.set_sensor_phase(phase);
        self.check(r)
    }

    // === Feedback sensors ===

    pub fn config_feedback_sensor(&mut self, sensor: FeedbackDevice, pid_loop: u8) -> Result {
        let pid_loop = pid_loop_arg(pid_loop)?;
        let r = self
            .device
            .config_selected_feedback_sensor(sensor, pid_loop, self.timeout);
        self.check(r)
    }

    pub fn config_feedback_coefficient(&mut self, coefficient: f64, pid_loop: u8) -> Result {
        let pid_loop = pid_loop_arg(pid_loop)?;
        let r = self
            .device
            .config_selected_feedback_coefficient(coefficient, pid_loop, self.timeout);
        self.check(r)
    }

    pub fn config_sensor_term(&mut self, term: SensorTerm, sensor: FeedbackDevice) -> Result {
        let r = self.device.config_sensor_term(term, sensor, self.timeout);
        self.check(r)
    }

    pub fn set_sensor_position(&mut self, position: f64, pid_loop: u8) -> Result {
        let pid_loop = pid_loop_arg(pid_loop)?;
        let r = self
            .device
            .set_selected_sensor_position(position, pid_loop, self.timeout);
        self.check(r)
    }

    pub fn config_velocity_measurement_period(&mut self, period: VelocityMeasPeriod) -> Result {
        let r = self
            .device
            .config_velocity_measurement_period(period, self.timeout);
        self.check(r)
    }

    pub fn config_velocity_measurement_window(&mut self, window: u32) -> Result {
        let r = self
            .device
            .config_velocity_measurement_window(window, self.timeout);
        self.check(r)
    }

    // === Output shaping ===

    pub fn config_nominal_output_forward(&mut self, percent: f64) -> Result {
        let r = self.device.config_nominal_output_forward(percent, self.timeout);
        self.check(r)
    }

    pub fn config_nominal_output_reverse(&mut self, percent: f64) -> Result {
        let r = self.device.config_nominal_output_reverse(percent, self.timeout);
        self.check(r)
    }

    pub fn config_peak_output_forward(&mut self, percent: f64) -> Result {
        let r = self.device.config_peak_output_forward(percent, self.timeout);
        self.check(r)
    }

    pub fn config_peak_output_reverse(&mut self, percent: f64) -> Result {
        let r = self.device.config_peak_output_reverse(percent, self.timeout);
        self.check(r)
    }

    pub fn config_neutral_deadband(&mut self, percent: f64) -> Result {
        let r = self.device.config_neutral_deadband(percent, self.timeout);
        self.check(r)
    }

    pub fn config_open_loop_ramp(&mut self, seconds: f64) -> Result {
        let r = self.device.config_open_loop_ramp(seconds, self.timeout);
        self.check(r)
    }

    pub fn config_closed_loop_ramp(&mut self, seconds: f64) -> Result {
        let r = self.device.config_closed_loop_ramp(seconds, self.timeout);
        self.check(r)
    }

    // === Closed-loop slots ===

    pub fn config_kp(&mut self, slot: u8, value: f64) -> Result {
        let slot = slot_arg(slot)?;
        let r = self.device.config_kp(slot, value, self.timeout);
        self.check(r)
    }

    pub fn config_ki(&mut self, slot: u8, value: f64) -> Result {
        let slot = slot_arg(slot)?;
        let r = self.device.config_ki(slot, value, self.timeout);
        self.check(r)
    }

    pub fn config_kd(&mut self, slot: u8, value: f64) -> Result {
        let slot = slot_arg(slot)?;
        let r = self.device.config_kd(slot, value, self.timeout);
        self.check(r)
    }

    pub fn config_kf(&mut self, slot: u8, value: f64) -> Result {
        let slot = slot_arg(slot)?;
        let r = self.device.config_kf(slot, value, self.timeout);
        self.check(r)
    }

    pub fn config_integral_zone(&mut self, slot: u8, zone: f64) -> Result {
        let slot = slot_arg(slot)?;
        let r = self.device.config_integral_zone(slot, zone, self.timeout);
        self.check(r)
    }

    pub fn config_max_integral_accumulator(&mut self, slot: u8, value: f64) -> Result {
        let slot = slot_arg(slot)?;
        let r = self
            .device
            .config_max_integral_accumulator(slot, value, self.timeout);
        self.check(r)
    }

    pub fn config_allowable_closed_loop_error(&mut self, slot: u8, value: f64) -> Result {
        let slot = slot_arg(slot)?;
        let r = self
            .device
            .config_allowable_closed_loop_error(slot, value, self.timeout);
        self.check(r)
    }

    pub fn config_closed_loop_peak_output(&mut self, slot: u8, percent: f64) -> Result {
        let slot = slot_arg(slot)?;
        let r = self
            .device
            .config_closed_loop_peak_output(slot, percent, self.timeout);
        self.check(r)
    }

    pub fn config_closed_loop_period(&mut self, slot: u8, period_ms: u32) -> Result {
        let slot = slot_arg(slot)?;
        let r = self
            .device
            .config_closed_loop_period(slot, period_ms, self.timeout);
        self.check(r)
    }

    pub fn select_profile_slot(&mut self, slot: u8, pid_loop: u8) -> Result {
        let slot = slot_arg(slot)?;
        let pid_loop = pid_loop_arg(pid_loop)?;
        let r = self.device.select_profile_slot(slot, pid_loop);
        self.check(r)
    }

    pub fn config_aux_pid_polarity(&mut self, invert: bool) -> Result {
        let r = self.device.config_aux_pid_polarity(invert, self.timeout);
        self.check(r)
    }

    /// Write a whole gain set into one slot
    ///
    /// All five terms are attempted even if one fails; the first failure is
    /// returned.
    pub fn config_closed_loop_constants(&mut self, slot: u8, gains: &GainSet) -> Result {
        let slot = slot_arg(slot)?;
        let timeout = self.timeout;
        let mut first_err = None;

        for (term, value) in gains.terms() {
            let r = match term {
                GainTerm::Kp => self.device.config_kp(slot, value, timeout),
                GainTerm::Ki => self.device.config_ki(slot, value, timeout),
                GainTerm::Kd => self.device.config_kd(slot, value, timeout),
                GainTerm::Kf => self.device.config_kf(slot, value, timeout),
                GainTerm::IntegralZone => self.device.config_integral_zone(slot, value, timeout),
            };
            first_err = first_err.or(self.check(r).err());
        }

        debug!(
            "Controller {} slot {} gains: {:?}",
            self.device_id(),
            slot.index(),
            gains
        );
        first_err.map_or(Ok(()), Err)
    }

    // === Motion profiling ===

    pub fn config_motion_cruise_velocity(&mut self, native_per_100ms: f64) -> Result {
        let r = self
            .device
            .config_motion_cruise_velocity(native_per_100ms, self.timeout);
        self.check(r)
    }

    pub fn config_motion_acceleration(&mut self, native_per_100ms_per_sec: f64) -> Result {
        let r = self
            .device
            .config_motion_acceleration(native_per_100ms_per_sec, self.timeout);
        self.check(r)
    }

    pub fn config_motion_profile_trajectory_period(&mut self, period_ms: u32) -> Result {
        let r = self
            .device
            .config_motion_profile_trajectory_period(period_ms, self.timeout);
        self.check(r)
    }

    // === Current and voltage ===

    /// Program and enable current limiting
    ///
    /// `timeout` of `None` uses this controller's default. Every write is
    /// attempted; the first failure is returned.
    pub fn config_current_limit(&mut self, limit: CurrentLimit, timeout: Option<Duration>) -> Result {
        let timeout = timeout.unwrap_or(self.timeout);
        let writes = [
            self.device.config_peak_current_limit(limit.peak_amps, timeout),
            self.device
                .config_peak_current_duration(limit.peak_duration_ms, timeout),
            self.device
                .config_continuous_current_limit(limit.continuous_amps, timeout),
            self.device.enable_current_limit(true),
        ];
        self.first_failure(writes)
    }

    pub fn enable_current_limit(&mut self, enable: bool) -> Result {
        let r = self.device.enable_current_limit(enable);
        self.check(r)
    }

    pub fn config_peak_current_limit(&mut self, amps: f64) -> Result {
        let r = self.device.config_peak_current_limit(amps, self.timeout);
        self.check(r)
    }

    pub fn config_peak_current_duration(&mut self, millis: u32) -> Result {
        let r = self.device.config_peak_current_duration(millis, self.timeout);
        self.check(r)
    }

    pub fn config_continuous_current_limit(&mut self, amps: f64) -> Result {
        let r = self.device.config_continuous_current_limit(amps, self.timeout);
        self.check(r)
    }

    pub fn enable_voltage_compensation(&mut self, enable: bool) -> Result {
        let r = self.device.enable_voltage_compensation(enable);
        self.check(r)
    }

    pub fn config_voltage_comp_saturation(&mut self, volts: f64) -> Result {
        let r = self.device.config_voltage_comp_saturation(volts, self.timeout);
        self.check(r)
    }

    pub fn config_voltage_measurement_filter(&mut self, samples: u32) -> Result {
        let r = self
            .device
            .config_voltage_measurement_filter(samples, self.timeout);
        self.check(r)
    }

    // === Limits ===

    /// Program both soft limits; a `None` side is disabled
    ///
    /// Every write is attempted; the first failure is returned.
    pub fn config_soft_limits(&mut self, limits: SoftLimits) -> Result {
        let timeout = self.timeout;
        let mut writes = Vec::with_capacity(4);
        if let Some(forward) = limits.forward {
            writes.push(self.device.config_forward_soft_limit_threshold(forward, timeout));
        }
        if let Some(reverse) = limits.reverse {
            writes.push(self.device.config_reverse_soft_limit_threshold(reverse, timeout));
        }
        writes.push(
            self.device
                .config_forward_soft_limit_enable(limits.forward.is_some(), timeout),
        );
        writes.push(
            self.device
                .config_reverse_soft_limit_enable(limits.reverse.is_some(), timeout),
        );
        self.first_failure(writes)
    }

    /// Use the same hard-limit switch wiring in both directions
    pub fn config_limit_switches(
        &mut self,
        source: LimitSwitchSource,
        normal: LimitSwitchNormal,
    ) -> Result {
        let writes = [
            self.device
                .config_forward_limit_switch_source(source, normal, self.timeout),
            self.device
                .config_reverse_limit_switch_source(source, normal, self.timeout),
        ];
        self.first_failure(writes)
    }

    // === Housekeeping ===

    pub fn set_status_frame_period(&mut self, frame: StatusFrame, period_ms: u32) -> Result {
        let r = self
            .device
            .set_status_frame_period(frame, period_ms, self.timeout);
        self.check(r)
    }

    pub fn clear_sticky_faults(&mut self) -> Result {
        let r = self.device.clear_sticky_faults(self.timeout);
        self.check(r)
    }

    // === Telemetry ===

    pub fn motor_output_percent(&mut self) -> Result<f64> {
        let r = self.device.motor_output_percent();
        self.check(r)
    }

    pub fn output_current(&mut self) -> Result<f64> {
        let r = self.device.output_current();
        self.check(r)
    }

    pub fn bus_voltage(&mut self) -> Result<f64> {
        let r = self.device.bus_voltage();
        self.check(r)
    }

    pub fn closed_loop_error(&mut self, pid_loop: u8) -> Result<f64> {
        let pid_loop = pid_loop_arg(pid_loop)?;
        let r = self.device.closed_loop_error(pid_loop);
        self.check(r)
    }

    pub fn sensor_position(&mut self, pid_loop: u8) -> Result<f64> {
        let pid_loop = pid_loop_arg(pid_loop)?;
        let r = self.device.selected_sensor_position(pid_loop);
        self.check(r)
    }

    pub fn sensor_velocity(&mut self, pid_loop: u8) -> Result<f64> {
        let pid_loop = pid_loop_arg(pid_loop)?;
        let r = self.device.selected_sensor_velocity(pid_loop);
        self.check(r)
    }

    pub fn selected_profile_slot(&mut self, pid_loop: u8) -> Result<u8> {
        let pid_loop = pid_loop_arg(pid_loop)?;
        let r = self.device.selected_profile_slot(pid_loop);
        self.check(r).map(Slot::index)
    }

    pub fn slot_config(&mut self, slot: u8) -> Result<SlotConfig> {
        let slot = slot_arg(slot)?;
        let r = self.device.slot_config(slot, self.timeout);
        self.check(r)
    }
}

pub(crate) fn slot_arg(index: u8) -> Result<Slot> {
    Slot::new(index).ok_or(ControllerError::InvalidArgument {
        name: "slot index",
        value: index,
        limit: SLOT_COUNT,
    })
}

pub(crate) fn pid_loop_arg(index: u8) -> Result<PidLoop> {
    PidLoop::new(index).ok_or(ControllerError::InvalidArgument {
        name: "PID loop index",
        value: index,
        limit: PID_LOOP_COUNT,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::sim::SimController;

    fn controller(id: u8) -> (Controller, SimController) {
        let sim = SimController::new(id);
        (Controller::new(Box::new(sim.clone())), sim)
    }

    #[test]
    fn test_default_timeout_is_forwarded() {
        let (mut talon, sim) = controller(1);
        talon.config_peak_output_forward(0.8).unwrap();
        assert_eq!(sim.last_timeout(), Some(DEFAULT_TIMEOUT));

        talon.set_default_timeout(Duration::from_millis(30));
        talon.config_neutral_deadband(0.01).unwrap();
        assert_eq!(sim.last_timeout(), Some(Duration::from_millis(30)));
        assert_eq!(sim.state().peak_output_forward, 0.8);
        assert_eq!(sim.state().neutral_deadband, 0.01);
    }

    #[test]
    fn test_slot_and_loop_are_validated() {
        let (mut talon, sim) = controller(2);
        assert_eq!(
            talon.config_kp(4, 1.0),
            Err(ControllerError::InvalidArgument {
                name: "slot index",
                value: 4,
                limit: 4
            })
        );
        assert!(matches!(
            talon.select_profile_slot(0, 2),
            Err(ControllerError::InvalidArgument { value: 2, .. })
        ));
        assert!(talon.closed_loop_error(5).is_err());
        // Nothing reached the device
        assert_eq!(sim.call_count(), 0);
    }

    #[test]
    fn test_closed_loop_constants_written_to_slot() {
        let (mut talon, sim) = controller(3);
        let gains = GainSet::new(0.2, 1.1, 0.001, 8.0, 150.0);
        talon.config_closed_loop_constants(2, &gains).unwrap();

        let slot = talon.slot_config(2).unwrap();
        assert_eq!(slot.kf, 0.2);
        assert_eq!(slot.kp, 1.1);
        assert_eq!(slot.ki, 0.001);
        assert_eq!(slot.kd, 8.0);
        assert_eq!(slot.integral_zone, 150.0);
        // Other slots untouched
        assert_eq!(sim.state().slots[0].kp, 0.0);
    }

    #[test]
    fn test_closed_loop_constants_attempts_every_term() {
        let (mut talon, sim) = controller(4);
        sim.fail_next(1, StatusCode::Timeout);
        let gains = GainSet::ZERO.with_kp(1.0).with_kd(3.0);
        let err = talon.config_closed_loop_constants(0, &gains).unwrap_err();
        assert_eq!(
            err,
            ControllerError::Device {
                device_id: 4,
                code: StatusCode::Timeout
            }
        );
        // kP was the failed write; kD still landed
        assert_eq!(sim.state().slots[0].kp, 0.0);
        assert_eq!(sim.state().slots[0].kd, 3.0);
    }

    #[test]
    fn test_current_limit_override_timeout() {
        let (mut talon, sim) = controller(5);
        let limit = CurrentLimit {
            peak_amps: 40.0,
            peak_duration_ms: 50,
            continuous_amps: 30.0,
        };
        talon
            .config_current_limit(limit, Some(Duration::from_millis(100)))
            .unwrap();
        let state = sim.state();
        assert!(state.current_limit_enabled);
        assert_eq!(state.peak_current_limit, 40.0);
        assert_eq!(state.peak_current_duration_ms, 50);
        assert_eq!(state.continuous_current_limit, 30.0);
        // enable_current_limit carries no timeout; the last timed call did
        assert!(sim.timeouts().contains(&Duration::from_millis(100)));
        assert!(!sim.timeouts().contains(&DEFAULT_TIMEOUT));
    }

    #[test]
    fn test_current_limit_attempts_every_write() {
        let (mut talon, sim) = controller(7);
        sim.fail_next(1, StatusCode::TxFailed);
        let limit = CurrentLimit {
            peak_amps: 40.0,
            peak_duration_ms: 50,
            continuous_amps: 30.0,
        };
        let err = talon.config_current_limit(limit, None).unwrap_err();
        assert_eq!(
            err,
            ControllerError::Device {
                device_id: 7,
                code: StatusCode::TxFailed
            }
        );
        // Peak amps was the failed write; the rest still landed
        let state = sim.state();
        assert_eq!(state.peak_current_limit, 0.0);
        assert_eq!(state.peak_current_duration_ms, 50);
        assert_eq!(state.continuous_current_limit, 30.0);
        assert!(state.current_limit_enabled);
    }

    #[test]
    fn test_soft_limits_attempt_every_write() {
        let (mut talon, sim) = controller(8);
        sim.fail_next(1, StatusCode::Timeout);
        let limits = SoftLimits {
            forward: Some(4000.0),
            reverse: Some(-4000.0),
        };
        assert!(talon.config_soft_limits(limits).is_err());
        let state = sim.state();
        assert_eq!(state.forward_soft_limit, 0.0);
        assert_eq!(state.reverse_soft_limit, -4000.0);
        assert!(state.forward_soft_limit_enabled);
        assert!(state.reverse_soft_limit_enabled);
    }

    #[test]
    fn test_soft_limits() {
        let (mut talon, sim) = controller(6);
        talon
            .config_soft_limits(SoftLimits {
                forward: Some(4000.0),
                reverse: None,
            })
            .unwrap();
        let state = sim.state();
        assert!(state.forward_soft_limit_enabled);
        assert!(!state.reverse_soft_limit_enabled);
        assert_eq!(state.forward_soft_limit, 4000.0);
    }
}
