// In-memory motor controller
//
// Mirrors the device-side register file so subsystems can run without a bus.
// Clones share the same registers: keep one clone as a probe after handing the
// other to a Controller.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use super::device::{
    ControlMode, Demand, DeviceResult, FeedbackDevice, LimitSwitchNormal, LimitSwitchSource,
    MotorController, NeutralMode, PidLoop, SensorTerm, Slot, SlotConfig, StatusCode, StatusFrame,
    VelocityMeasPeriod, SLOT_COUNT,
};

/// Register file of a simulated controller
#[derive(Debug, Clone, PartialEq)]
pub struct SimState {
    // Output
    pub mode: ControlMode,
    pub output: f64,
    pub demand: Demand,
    pub following: Option<u8>,
    pub neutral_mode: NeutralMode,
    pub inverted: bool,
    pub sensor_phase: bool,

    // Sensors
    pub feedback_sensor: [FeedbackDevice; 2],
    pub feedback_coefficient: [f64; 2],
    pub sensor_terms: [(SensorTerm, FeedbackDevice); 4],
    pub sensor_position: [f64; 2],
    pub sensor_velocity: [f64; 2],
    pub velocity_measurement_period: VelocityMeasPeriod,
    pub velocity_measurement_window: u32,

    // Output shaping
    pub nominal_output_forward: f64,
    pub nominal_output_reverse: f64,
    pub peak_output_forward: f64,
    pub peak_output_reverse: f64,
    pub neutral_deadband: f64,
    pub open_loop_ramp: f64,
    pub closed_loop_ramp: f64,

    // Closed loop
    pub slots: [SlotConfig; SLOT_COUNT as usize],
    pub selected_slot: [Slot; 2],
    pub aux_pid_polarity: bool,
    pub closed_loop_error: [f64; 2],

    // Motion profile
    pub cruise_velocity: f64,
    pub acceleration: f64,
    pub trajectory_period_ms: u32,

    // Current and voltage
    pub current_limit_enabled: bool,
    pub peak_current_limit: f64,
    pub peak_current_duration_ms: u32,
    pub continuous_current_limit: f64,
    pub voltage_comp_enabled: bool,
    pub voltage_comp_saturation: f64,
    pub voltage_measurement_filter: u32,
    pub output_current: f64,
    pub bus_voltage: f64,

    // Limits
    pub forward_soft_limit: f64,
    pub reverse_soft_limit: f64,
    pub forward_soft_limit_enabled: bool,
    pub reverse_soft_limit_enabled: bool,
    pub forward_limit_source: LimitSwitchSource,
    pub reverse_limit_source: LimitSwitchSource,
    pub forward_limit_normal: LimitSwitchNormal,
    pub reverse_limit_normal: LimitSwitchNormal,

    pub status_frame_periods: Vec<(StatusFrame, u32)>,
}

impl Default for SimState {
    /// Factory power-on state
    fn default() -> Self {
        let slot = SlotConfig {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            kf: 0.0,
            integral_zone: 0.0,
            max_integral_accumulator: 0.0,
            allowable_closed_loop_error: 0.0,
            closed_loop_peak_output: 1.0,
            closed_loop_period_ms: 1,
        };
        Self {
            mode: ControlMode::Disabled,
            output: 0.0,
            demand: Demand::Neutral,
            following: None,
            neutral_mode: NeutralMode::Coast,
            inverted: false,
            sensor_phase: false,
            feedback_sensor: [FeedbackDevice::QuadEncoder; 2],
            feedback_coefficient: [1.0; 2],
            sensor_terms: SensorTerm::ALL.map(|term| (term, FeedbackDevice::QuadEncoder)),
            sensor_position: [0.0; 2],
            sensor_velocity: [0.0; 2],
            velocity_measurement_period: VelocityMeasPeriod::Period100Ms,
            velocity_measurement_window: 64,
            nominal_output_forward: 0.0,
            nominal_output_reverse: 0.0,
            peak_output_forward: 1.0,
            peak_output_reverse: -1.0,
            neutral_deadband: 0.04,
            open_loop_ramp: 0.0,
            closed_loop_ramp: 0.0,
            slots: [slot; SLOT_COUNT as usize],
            selected_slot: [Slot::ALL[0]; 2],
            aux_pid_polarity: false,
            closed_loop_error: [0.0; 2],
            cruise_velocity: 0.0,
            acceleration: 0.0,
            trajectory_period_ms: 0,
            current_limit_enabled: false,
            peak_current_limit: 0.0,
            peak_current_duration_ms: 0,
            continuous_current_limit: 0.0,
            voltage_comp_enabled: false,
            voltage_comp_saturation: 0.0,
            voltage_measurement_filter: 32,
            output_current: 0.0,
            bus_voltage: 12.0,
            forward_soft_limit: 0.0,
            reverse_soft_limit: 0.0,
            forward_soft_limit_enabled: false,
            reverse_soft_limit_enabled: false,
            forward_limit_source: LimitSwitchSource::Deactivated,
            reverse_limit_source: LimitSwitchSource::Deactivated,
            forward_limit_normal: LimitSwitchNormal::NormallyOpen,
            reverse_limit_normal: LimitSwitchNormal::NormallyOpen,
            status_frame_periods: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct SimInner {
    state: SimState,
    calls: usize,
    timeouts: Vec<Duration>,
    fail_next: usize,
    fail_code: Option<StatusCode>,
}

/// A motor controller backed by an in-memory register file
#[derive(Debug, Clone)]
pub struct SimController {
    id: u8,
    inner: Rc<RefCell<SimInner>>,
}

impl SimController {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            inner: Rc::new(RefCell::new(SimInner::default())),
        }
    }

    /// Snapshot of the register file
    pub fn state(&self) -> SimState {
        self.inner.borrow().state.clone()
    }

    /// Number of device calls made so far
    pub fn call_count(&self) -> usize {
        self.inner.borrow().calls
    }

    /// Timeouts passed with every timed call, oldest first
    pub fn timeouts(&self) -> Vec<Duration> {
        self.inner.borrow().timeouts.clone()
    }

    pub fn last_timeout(&self) -> Option<Duration> {
        self.inner.borrow().timeouts.last().copied()
    }

    pub fn clear_timeouts(&self) {
        self.inner.borrow_mut().timeouts.clear();
    }

    /// Make the next `count` calls fail with `code` without touching registers
    pub fn fail_next(&self, count: usize, code: StatusCode) {
        let mut inner = self.inner.borrow_mut();
        inner.fail_next = count;
        inner.fail_code = Some(code);
    }

    // === Sensor feed, as the physical motor would report ===

    pub fn set_closed_loop_error(&self, pid_loop: PidLoop, error: f64) {
        self.inner.borrow_mut().state.closed_loop_error[pid_loop.index() as usize] = error;
    }

    pub fn set_sensor_position(&self, pid_loop: PidLoop, position: f64) {
        self.inner.borrow_mut().state.sensor_position[pid_loop.index() as usize] = position;
    }

    pub fn set_sensor_velocity(&self, pid_loop: PidLoop, velocity: f64) {
        self.inner.borrow_mut().state.sensor_velocity[pid_loop.index() as usize] = velocity;
    }

    pub fn set_output_current(&self, amps: f64) {
        self.inner.borrow_mut().state.output_current = amps;
    }

    /// Run one device call: count it, maybe fail it, otherwise apply `f`
    fn call<T>(&mut self, timeout: Option<Duration>, f: impl FnOnce(&mut SimState) -> T) -> DeviceResult<T> {
        let mut inner = self.inner.borrow_mut();
        inner.calls += 1;
        if let Some(timeout) = timeout {
            inner.timeouts.push(timeout);
        }
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            let code = inner.fail_code.unwrap_or(StatusCode::TxFailed);
            debug!("Sim controller {}: injected {}", self.id, code);
            return Err(code);
        }
        Ok(f(&mut inner.state))
    }

    fn write(&mut self, timeout: Duration, f: impl FnOnce(&mut SimState)) -> DeviceResult {
        self.call(Some(timeout), f)
    }

    fn write_untimed(&mut self, f: impl FnOnce(&mut SimState)) -> DeviceResult {
        self.call(None, f)
    }

    fn write_slot(&mut self, slot: Slot, timeout: Duration, f: impl FnOnce(&mut SlotConfig)) -> DeviceResult {
        self.write(timeout, |s| f(&mut s.slots[slot.index() as usize]))
    }
}

impl MotorController for SimController {
    fn device_id(&self) -> u8 {
        self.id
    }

    fn set(&mut self, mode: ControlMode, demand0: f64, demand1: Demand) -> DeviceResult {
        self.write_untimed(|s| {
            s.mode = mode;
            s.output = demand0;
            s.demand = demand1;
            s.following = None;
        })
    }

    fn follow(&mut self, master_id: u8) -> DeviceResult {
        self.write_untimed(|s| s.following = Some(master_id))
    }

    fn set_neutral_mode(&mut self, mode: NeutralMode) -> DeviceResult {
        self.write_untimed(|s| s.neutral_mode = mode)
    }

    fn set_inverted(&mut self, invert: bool) -> DeviceResult {
        self.write_untimed(|s| s.inverted = invert)
    }

    fn set_sensor_phase(&mut self, phase: bool) -> DeviceResult {
        self.write_untimed(|s| s.sensor_phase = phase)
    }

    fn config_selected_feedback_sensor(
        &mut self,
        sensor: FeedbackDevice,
        pid_loop: PidLoop,
        timeout: Duration,
    ) -> DeviceResult {
        self.write(timeout, |s| s.feedback_sensor[pid_loop.index() as usize] = sensor)
    }

    fn config_selected_feedback_coefficient(
        &mut self,
        coefficient: f64,
        pid_loop: PidLoop,
        timeout: Duration,
    ) -> DeviceResult {
        self.write(timeout, |s| {
            s.feedback_coefficient[pid_loop.index() as usize] = coefficient
        })
    }

    fn config_sensor_term(
        &mut self,
        term: SensorTerm,
        sensor: FeedbackDevice,
        timeout: Duration,
    ) -> DeviceResult {
        self.write(timeout, |s| {
            for entry in s.sensor_terms.iter_mut().filter(|(t, _)| *t == term) {
                entry.1 = sensor;
            }
        })
    }

    fn set_selected_sensor_position(
        &mut self,
        position: f64,
        pid_loop: PidLoop,
        timeout: Duration,
    ) -> DeviceResult {
        self.write(timeout, |s| s.sensor_position[pid_loop.index() as usize] = position)
    }

    fn config_velocity_measurement_period(
        &mut self,
        period: VelocityMeasPeriod,
        timeout: Duration,
    ) -> DeviceResult {
        self.write(timeout, |s| s.velocity_measurement_period = period)
    }

    fn config_velocity_measurement_window(&mut self, window: u32, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.velocity_measurement_window = window)
    }

    fn config_nominal_output_forward(&mut self, percent: f64, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.nominal_output_forward = percent)
    }

    fn config_nominal_output_reverse(&mut self, percent: f64, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.nominal_output_reverse = percent)
    }

    fn config_peak_output_forward(&mut self, percent: f64, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.peak_output_forward = percent)
    }

    fn config_peak_output_reverse(&mut self, percent: f64, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.peak_output_reverse = percent)
    }

    fn config_neutral_deadband(&mut self, percent: f64, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.neutral_deadband = percent)
    }

    fn config_open_loop_ramp(&mut self, seconds: f64, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.open_loop_ramp = seconds)
    }

    fn config_closed_loop_ramp(&mut self, seconds: f64, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.closed_loop_ramp = seconds)
    }

    fn config_kp(&mut self, slot: Slot, value: f64, timeout: Duration) -> DeviceResult {
        self.write_slot(slot, timeout, |c| c.kp = value)
    }

    fn config_ki(&mut self, slot: Slot, value: f64, timeout: Duration) -> DeviceResult {
        self.write_slot(slot, timeout, |c| c.ki = value)
    }

    fn config_kd(&mut self, slot: Slot, value: f64, timeout: Duration) -> DeviceResult {
        self.write_slot(slot, timeout, |c| c.kd = value)
    }

    fn config_kf(&mut self, slot: Slot, value: f64, timeout: Duration) -> DeviceResult {
        self.write_slot(slot, timeout, |c| c.kf = value)
    }

    fn config_integral_zone(&mut self, slot: Slot, zone: f64, timeout: Duration) -> DeviceResult {
        self.write_slot(slot, timeout, |c| c.integral_zone = zone)
    }

    fn config_max_integral_accumulator(
        &mut self,
        slot: Slot,
        value: f64,
        timeout: Duration,
    ) -> DeviceResult {
        self.write_slot(slot, timeout, |c| c.max_integral_accumulator = value)
    }

    fn config_allowable_closed_loop_error(
        &mut self,
        slot: Slot,
        value: f64,
        timeout: Duration,
    ) -> DeviceResult {
        self.write_slot(slot, timeout, |c| c.allowable_closed_loop_error = value)
    }

    fn config_closed_loop_peak_output(
        &mut self,
        slot: Slot,
        percent: f64,
        timeout: Duration,
    ) -> DeviceResult {
        self.write_slot(slot, timeout, |c| c.closed_loop_peak_output = percent)
    }

    fn config_closed_loop_period(&mut self, slot: Slot, period_ms: u32, timeout: Duration) -> DeviceResult {
        self.write_slot(slot, timeout, |c| c.closed_loop_period_ms = period_ms)
    }

    fn select_profile_slot(&mut self, slot: Slot, pid_loop: PidLoop) -> DeviceResult {
        self.write_untimed(|s| s.selected_slot[pid_loop.index() as usize] = slot)
    }

    fn config_aux_pid_polarity(&mut self, invert: bool, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.aux_pid_polarity = invert)
    }

    fn config_motion_cruise_velocity(&mut self, native_per_100ms: f64, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.cruise_velocity = native_per_100ms)
    }

    fn config_motion_acceleration(&mut self, native_per_100ms_per_sec: f64, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.acceleration = native_per_100ms_per_sec)
    }

    fn config_motion_profile_trajectory_period(&mut self, period_ms: u32, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.trajectory_period_ms = period_ms)
    }

    fn enable_current_limit(&mut self, enable: bool) -> DeviceResult {
        self.write_untimed(|s| s.current_limit_enabled = enable)
    }

    fn config_peak_current_limit(&mut self, amps: f64, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.peak_current_limit = amps)
    }

    fn config_peak_current_duration(&mut self, millis: u32, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.peak_current_duration_ms = millis)
    }

    fn config_continuous_current_limit(&mut self, amps: f64, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.continuous_current_limit = amps)
    }

    fn enable_voltage_compensation(&mut self, enable: bool) -> DeviceResult {
        self.write_untimed(|s| s.voltage_comp_enabled = enable)
    }

    fn config_voltage_comp_saturation(&mut self, volts: f64, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.voltage_comp_saturation = volts)
    }

    fn config_voltage_measurement_filter(&mut self, samples: u32, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.voltage_measurement_filter = samples)
    }

    fn config_forward_soft_limit_threshold(&mut self, native: f64, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.forward_soft_limit = native)
    }

    fn config_reverse_soft_limit_threshold(&mut self, native: f64, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.reverse_soft_limit = native)
    }

    fn config_forward_soft_limit_enable(&mut self, enable: bool, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.forward_soft_limit_enabled = enable)
    }

    fn config_reverse_soft_limit_enable(&mut self, enable: bool, timeout: Duration) -> DeviceResult {
        self.write(timeout, |s| s.reverse_soft_limit_enabled = enable)
    }

    fn config_forward_limit_switch_source(
        &mut self,
        source: LimitSwitchSource,
        normal: LimitSwitchNormal,
        timeout: Duration,
    ) -> DeviceResult {
        self.write(timeout, |s| {
            s.forward_limit_source = source;
            s.forward_limit_normal = normal;
        })
    }

    fn config_reverse_limit_switch_source(
        &mut self,
        source: LimitSwitchSource,
        normal: LimitSwitchNormal,
        timeout: Duration,
    ) -> DeviceResult {
        self.write(timeout, |s| {
            s.reverse_limit_source = source;
            s.reverse_limit_normal = normal;
        })
    }

    fn set_status_frame_period(
        &mut self,
        frame: StatusFrame,
        period_ms: u32,
        timeout: Duration,
    ) -> DeviceResult {
        self.write(timeout, |s| {
            s.status_frame_periods.retain(|&(f, _)| f != frame);
            s.status_frame_periods.push((frame, period_ms));
        })
    }

    fn clear_sticky_faults(&mut self, timeout: Duration) -> DeviceResult {
        self.write(timeout, |_| {})
    }

    fn motor_output_percent(&mut self) -> DeviceResult<f64> {
        self.call(None, |s| match s.mode {
            ControlMode::PercentOutput => s.output,
            _ => 0.0,
        })
    }

    fn output_current(&mut self) -> DeviceResult<f64> {
        self.call(None, |s| s.output_current)
    }

    fn bus_voltage(&mut self) -> DeviceResult<f64> {
        self.call(None, |s| s.bus_voltage)
    }

    fn closed_loop_error(&mut self, pid_loop: PidLoop) -> DeviceResult<f64> {
        self.call(None, |s| s.closed_loop_error[pid_loop.index() as usize])
    }

    fn selected_sensor_position(&mut self, pid_loop: PidLoop) -> DeviceResult<f64> {
        self.call(None, |s| s.sensor_position[pid_loop.index() as usize])
    }

    fn selected_sensor_velocity(&mut self, pid_loop: PidLoop) -> DeviceResult<f64> {
        self.call(None, |s| s.sensor_velocity[pid_loop.index() as usize])
    }

    fn selected_profile_slot(&mut self, pid_loop: PidLoop) -> DeviceResult<Slot> {
        self.call(None, |s| s.selected_slot[pid_loop.index() as usize])
    }

    fn slot_config(&mut self, slot: Slot, timeout: Duration) -> DeviceResult<SlotConfig> {
        self.call(Some(timeout), |s| s.slots[slot.index() as usize])
    }
}
