// Device boundary for smart motor controllers on the CAN bus
//
// The transport itself lives outside this crate. Every call crosses into the
// vendor API as (params..., timeout) -> status, and the status is passed
// through untouched. Nothing here caches device state: reads are live queries.

use std::time::Duration;

/// Number of closed-loop gain slots on a controller
pub const SLOT_COUNT: u8 = 4;
/// Number of feedback loops (primary + auxiliary)
pub const PID_LOOP_COUNT: u8 = 2;

/// Non-success status returned by the transport
///
/// The core never interprets these; it only reports which call produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StatusCode {
    #[error("CAN message transmit failed")]
    TxFailed,

    #[error("Device did not respond within the timeout")]
    Timeout,

    #[error("Device rejected the parameter")]
    InvalidParam,

    #[error("Device firmware is too old for this request")]
    FirmwareTooOld,

    #[error("Sensor not present")]
    SensorNotPresent,

    #[error("Vendor status code {0}")]
    Other(i32),
}

pub type DeviceResult<T = ()> = std::result::Result<T, StatusCode>;

/// A gain slot index in [0, 3]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(u8);

impl Slot {
    pub const ALL: [Slot; SLOT_COUNT as usize] = [Slot(0), Slot(1), Slot(2), Slot(3)];

    pub fn new(index: u8) -> Option<Self> {
        (index < SLOT_COUNT).then_some(Self(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

/// A feedback loop index: primary (0) or auxiliary (1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PidLoop {
    Primary = 0,
    Auxiliary = 1,
}

impl PidLoop {
    pub fn new(index: u8) -> Option<Self> {
        match index {
            0 => Some(PidLoop::Primary),
            1 => Some(PidLoop::Auxiliary),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    /// Suffix used in dashboard keys
    pub fn label(self) -> &'static str {
        match self {
            PidLoop::Primary => "Primary",
            PidLoop::Auxiliary => "Auxiliary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    PercentOutput,
    Position,
    Velocity,
    Current,
    MotionMagic,
    Disabled,
}

/// Secondary demand sent alongside the primary output
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Demand {
    #[default]
    Neutral,
    AuxPid(f64),
    ArbitraryFeedForward(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeutralMode {
    #[default]
    Coast,
    Brake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackDevice {
    QuadEncoder,
    Analog,
    PulseWidthEncodedPosition,
    CtreMagEncoderRelative,
    CtreMagEncoderAbsolute,
    SensorSum,
    SensorDifference,
    RemoteSensor0,
    RemoteSensor1,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorTerm {
    Sum0,
    Sum1,
    Diff0,
    Diff1,
}

impl SensorTerm {
    pub const ALL: [SensorTerm; 4] = [
        SensorTerm::Diff0,
        SensorTerm::Diff1,
        SensorTerm::Sum0,
        SensorTerm::Sum1,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VelocityMeasPeriod {
    Period1Ms = 1,
    Period2Ms = 2,
    Period5Ms = 5,
    Period10Ms = 10,
    Period20Ms = 20,
    Period25Ms = 25,
    Period50Ms = 50,
    Period100Ms = 100,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitSwitchSource {
    FeedbackConnector,
    RemoteController,
    Deactivated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitSwitchNormal {
    NormallyOpen,
    NormallyClosed,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFrame {
    General,
    Feedback0,
    Feedback1,
    AnalogTempVbat,
    PulseWidth,
}

/// Per-slot closed-loop parameters as stored on the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub kf: f64,
    pub integral_zone: f64,
    pub max_integral_accumulator: f64,
    pub allowable_closed_loop_error: f64,
    pub closed_loop_peak_output: f64,
    pub closed_loop_period_ms: u32,
}

/// Raw operations of a smart motor controller
///
/// `timeout` is handed to the transport as-is; the core never waits on it.
/// Calls without a timeout are fire-and-forget frames on the device.
pub trait MotorController {
    /// CAN device ID, unique per bus
    fn device_id(&self) -> u8;

    // === Output ===
    fn set(&mut self, mode: ControlMode, demand0: f64, demand1: Demand) -> DeviceResult;
    fn follow(&mut self, master_id: u8) -> DeviceResult;
    fn set_neutral_mode(&mut self, mode: NeutralMode) -> DeviceResult;
    fn set_inverted(&mut self, invert: bool) -> DeviceResult;
    fn set_sensor_phase(&mut self, phase: bool) -> DeviceResult;

    // === Feedback sensors ===
    fn config_selected_feedback_sensor(
        &mut self,
        sensor: FeedbackDevice,
        pid_loop: PidLoop,
        timeout: Duration,
    ) -> DeviceResult;
    fn config_selected_feedback_coefficient(
        &mut self,
        coefficient: f64,
        pid_loop: PidLoop,
        timeout: Duration,
    ) -> DeviceResult;
    fn config_sensor_term(
        &mut self,
        term: SensorTerm,
        sensor: FeedbackDevice,
        timeout: Duration,
    ) -> DeviceResult;
    fn set_selected_sensor_position(
        &mut self,
        position: f64,
        pid_loop: PidLoop,
        timeout: Duration,
    ) -> DeviceResult;
    fn config_velocity_measurement_period(
        &mut self,
        period: VelocityMeasPeriod,
        timeout: Duration,
    ) -> DeviceResult;
    fn config_velocity_measurement_window(&mut self, window: u32, timeout: Duration) -> DeviceResult;

    // === Output shaping ===
    fn config_nominal_output_forward(&mut self, percent: f64, timeout: Duration) -> DeviceResult;
    fn config_nominal_output_reverse(&mut self, percent: f64, timeout: Duration) -> DeviceResult;
    fn config_peak_output_forward(&mut self, percent: f64, timeout: Duration) -> DeviceResult;
    fn config_peak_output_reverse(&mut self, percent: f64, timeout: Duration) -> DeviceResult;
    fn config_neutral_deadband(&mut self, percent: f64, timeout: Duration) -> DeviceResult;
    fn config_open_loop_ramp(&mut self, seconds: f64, timeout: Duration) -> DeviceResult;
    fn config_closed_loop_ramp(&mut self, seconds: f64, timeout: Duration) -> DeviceResult;

    // === Closed-loop slots ===
    fn config_kp(&mut self, slot: Slot, value: f64, timeout: Duration) -> DeviceResult;
    fn config_ki(&mut self, slot: Slot, value: f64, timeout: Duration) -> DeviceResult;
    fn config_kd(&mut self, slot: Slot, value: f64, timeout: Duration) -> DeviceResult;
    fn config_kf(&mut self, slot: Slot, value: f64, timeout: Duration) -> DeviceResult;
    fn config_integral_zone(&mut self, slot: Slot, zone: f64, timeout: Duration) -> DeviceResult;
    fn config_max_integral_accumulator(
        &mut self,
        slot: Slot,
        value: f64,
        timeout: Duration,
    ) -> DeviceResult;
    fn config_allowable_closed_loop_error(
        &mut self,
        slot: Slot,
        value: f64,
        timeout: Duration,
    ) -> DeviceResult;
    fn config_closed_loop_peak_output(
        &mut self,
        slot: Slot,
        percent: f64,
        timeout: Duration,
    ) -> DeviceResult;
    fn config_closed_loop_period(&mut self, slot: Slot, period_ms: u32, timeout: Duration) -> DeviceResult;
    fn select_profile_slot(&mut self, slot: Slot, pid_loop: PidLoop) -> DeviceResult;
    fn config_aux_pid_polarity(&mut self, invert: bool, timeout: Duration) -> DeviceResult;

    // === Motion profiling ===
    fn config_motion_cruise_velocity(&mut self, native_per_100ms: f64, timeout: Duration) -> DeviceResult;
    fn config_motion_acceleration(&mut self, native_per_100ms_per_sec: f64, timeout: Duration) -> DeviceResult;
    fn config_motion_profile_trajectory_period(&mut self, period_ms: u32, timeout: Duration) -> DeviceResult;

    // === Current and voltage ===
    fn enable_current_limit(&mut self, enable: bool) -> DeviceResult;
    fn config_peak_current_limit(&mut self, amps: f64, timeout: Duration) -> DeviceResult;
    fn config_peak_current_duration(&mut self, millis: u32, timeout: Duration) -> DeviceResult;
    fn config_continuous_current_limit(&mut self, amps: f64, timeout: Duration) -> DeviceResult;
    fn enable_voltage_compensation(&mut self, enable: bool) -> DeviceResult;
    fn config_voltage_comp_saturation(&mut self, volts: f64, timeout: Duration) -> DeviceResult;
    fn config_voltage_measurement_filter(&mut self, samples: u32, timeout: Duration) -> DeviceResult;

    // === Limits ===
    fn config_forward_soft_limit_threshold(&mut self, native: f64, timeout: Duration) -> DeviceResult;
    fn config_reverse_soft_limit_threshold(&mut self, native: f64, timeout: Duration) -> DeviceResult;
    fn config_forward_soft_limit_enable(&mut self, enable: bool, timeout: Duration) -> DeviceResult;
    fn config_reverse_soft_limit_enable(&mut self, enable: bool, timeout: Duration) -> DeviceResult;
    fn config_forward_limit_switch_source(
        &mut self,
        source: LimitSwitchSource,
        normal: LimitSwitchNormal,
        timeout: Duration,
    ) -> DeviceResult;
    fn config_reverse_limit_switch_source(
        &mut self,
        source: LimitSwitchSource,
        normal: LimitSwitchNormal,
        timeout: Duration,
    ) -> DeviceResult;

    // === Housekeeping ===
    fn set_status_frame_period(
        &mut self,
        frame: StatusFrame,
        period_ms: u32,
        timeout: Duration,
    ) -> DeviceResult;
    fn clear_sticky_faults(&mut self, timeout: Duration) -> DeviceResult;

    // === Telemetry (live queries) ===
    fn motor_output_percent(&mut self) -> DeviceResult<f64>;
    fn output_current(&mut self) -> DeviceResult<f64>;
    fn bus_voltage(&mut self) -> DeviceResult<f64>;
    fn closed_loop_error(&mut self, pid_loop: PidLoop) -> DeviceResult<f64>;
    fn selected_sensor_position(&mut self, pid_loop: PidLoop) -> DeviceResult<f64>;
    fn selected_sensor_velocity(&mut self, pid_loop: PidLoop) -> DeviceResult<f64>;
    fn selected_profile_slot(&mut self, pid_loop: PidLoop) -> DeviceResult<Slot>;
    fn slot_config(&mut self, slot: Slot, timeout: Duration) -> DeviceResult<SlotConfig>;
}
