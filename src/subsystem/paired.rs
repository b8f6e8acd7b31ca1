// Two-sided actuator built from a pair of master controllers
//
// Coordinates a left and a right master, optionally with one follower per
// side and a gyro, as a single logical actuator. Controllers are shared
// handles: the actuator drives them but does not own their construction.
// Device failures are collected into reports, never retried here.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::messages::{TelemetryEntry, TelemetrySink};
use crate::motor::{
    ControlMode, Controller, ControllerError, CurrentLimit, FeedbackDevice, GainSet, ImuRef,
    NeutralMode, PidLoop, ResetReport, pid_loop_arg, slot_arg,
};

/// Shared handle to a controller
pub type ControllerRef = Rc<RefCell<Controller>>;

/// Wrap a controller in a shared handle
pub fn shared(controller: Controller) -> ControllerRef {
    Rc::new(RefCell::new(controller))
}

/// A follower per side; both are always present together
pub struct Followers {
    pub left: ControllerRef,
    pub right: ControllerRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn label(self) -> &'static str {
        match self {
            Side::Left => "Left",
            Side::Right => "Right",
        }
    }
}

/// A semantic direction with a signed output multiplier
pub trait Direction: Copy {
    fn sign(self) -> f64;
}

/// Failures collected while applying one operation to several controllers
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BroadcastReport {
    pub failures: Vec<ControllerError>,
}

impl BroadcastReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn record(&mut self, result: Result<(), ControllerError>) {
        if let Err(e) = result {
            warn!("{}", e);
            self.failures.push(e);
        }
    }

    pub(crate) fn merge(&mut self, other: BroadcastReport) {
        self.failures.extend(other.failures);
    }
}

pub struct PairedActuator {
    left: ControllerRef,
    right: ControllerRef,
    followers: Option<Followers>,
    imu: Option<ImuRef>,
}

impl PairedActuator {
    /// Two masters, no followers
    pub fn new(left: ControllerRef, right: ControllerRef) -> Self {
        Self {
            left,
            right,
            followers: None,
            imu: None,
        }
    }

    /// Two masters with a follower on each side; followers are wired here
    pub fn with_followers(left: ControllerRef, right: ControllerRef, followers: Followers) -> Self {
        let actuator = Self {
            left,
            right,
            followers: Some(followers),
            imu: None,
        };
        let report = actuator.wire_followers();
        if !report.is_success() {
            warn!(
                "Follower wiring finished with {} failures",
                report.failures.len()
            );
        }
        actuator
    }

    /// Attach a gyro
    pub fn with_imu(mut self, imu: ImuRef) -> Self {
        self.imu = Some(imu);
        self
    }

    pub fn left(&self) -> &ControllerRef {
        &self.left
    }

    pub fn right(&self) -> &ControllerRef {
        &self.right
    }

    pub fn master(&self, side: Side) -> &ControllerRef {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn followers(&self) -> Option<&Followers> {
        self.followers.as_ref()
    }

    pub fn has_followers(&self) -> bool {
        self.followers.is_some()
    }

    pub fn imu(&self) -> Option<&ImuRef> {
        self.imu.as_ref()
    }

    /// Make each follower follow the master on its side
    ///
    /// Safe to call again; does nothing without followers.
    pub fn wire_followers(&self) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        if let Some(followers) = &self.followers {
            report.record(followers.left.borrow_mut().follow(&self.left.borrow()));
            report.record(followers.right.borrow_mut().follow(&self.right.borrow()));
        }
        report
    }

    /// Apply `op` to the left master, then the right master
    pub fn apply_to_masters<F>(&self, mut op: F) -> BroadcastReport
    where
        F: FnMut(&mut Controller) -> Result<(), ControllerError>,
    {
        let mut report = BroadcastReport::default();
        report.record(op(&mut self.left.borrow_mut()));
        report.record(op(&mut self.right.borrow_mut()));
        report
    }

    /// Apply `op` to both masters, then to both followers if present
    pub fn apply_to_all<F>(&self, mut op: F) -> BroadcastReport
    where
        F: FnMut(&mut Controller) -> Result<(), ControllerError>,
    {
        let mut report = self.apply_to_masters(&mut op);
        if let Some(followers) = &self.followers {
            report.record(op(&mut followers.left.borrow_mut()));
            report.record(op(&mut followers.right.borrow_mut()));
        }
        report
    }

    /// Brake or coast on every controller
    pub fn set_neutral_mode(&self, mode: NeutralMode) -> BroadcastReport {
        debug!("Setting neutral mode {:?}", mode);
        self.apply_to_all(|c| c.set_neutral_mode(mode))
    }

    /// Current-limit both masters; followers inherit through the follow
    ///
    /// With `timeout` of `None` each master uses its own default timeout.
    pub fn set_current_limit(
        &self,
        peak_amps: f64,
        peak_duration_ms: u32,
        continuous_amps: f64,
        timeout: Option<Duration>,
    ) -> BroadcastReport {
        let limit = CurrentLimit {
            peak_amps,
            peak_duration_ms,
            continuous_amps,
        };
        self.apply_to_masters(|c| c.config_current_limit(limit, timeout))
    }

    /// Same mode and output on both masters
    pub fn set_both(&self, mode: ControlMode, output: f64) -> BroadcastReport {
        self.apply_to_masters(|c| c.set(mode, output))
    }

    /// Independent outputs per side in one mode
    pub fn set_sides(&self, mode: ControlMode, left: f64, right: f64) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        report.record(self.left.borrow_mut().set(mode, left));
        report.record(self.right.borrow_mut().set(mode, right));
        report
    }

    /// Drive mirrored sides: left gets `sign * magnitude`, right the negation
    pub fn set_mirrored<D: Direction>(
        &self,
        mode: ControlMode,
        magnitude: f64,
        direction: D,
    ) -> BroadcastReport {
        let left = direction.sign() * magnitude;
        self.set_sides(mode, left, -left)
    }

    /// Write per-side gains into `slot` on each master
    pub fn config_closed_loop_constants(
        &self,
        slot: u8,
        left: &GainSet,
        right: &GainSet,
    ) -> Result<BroadcastReport, ControllerError> {
        slot_arg(slot)?;
        let mut report = BroadcastReport::default();
        report.record(self.left.borrow_mut().config_closed_loop_constants(slot, left));
        report.record(self.right.borrow_mut().config_closed_loop_constants(slot, right));
        Ok(report)
    }

    /// Point both masters at the same sensor for a loop
    pub fn config_both_feedback_sensors(
        &self,
        sensor: FeedbackDevice,
        pid_loop: u8,
    ) -> Result<BroadcastReport, ControllerError> {
        pid_loop_arg(pid_loop)?;
        Ok(self.apply_to_masters(|c| c.config_feedback_sensor(sensor, pid_loop)))
    }

    /// Both masters' closed-loop error strictly under `tolerance`
    pub fn is_closed_loop_error_within(
        &self,
        pid_loop: u8,
        tolerance: f64,
    ) -> Result<bool, ControllerError> {
        let left = self.left.borrow_mut().closed_loop_error(pid_loop)?;
        let right = self.right.borrow_mut().closed_loop_error(pid_loop)?;
        Ok(left.abs() < tolerance && right.abs() < tolerance)
    }

    /// Factory-reset both masters
    pub fn reset_masters(&self) -> [ResetReport; 2] {
        [self.left.borrow_mut().reset(), self.right.borrow_mut().reset()]
    }

    /// Invert the masters only
    pub fn invert(&self, left: bool, right: bool) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        report.record(self.left.borrow_mut().set_inverted(left));
        report.record(self.right.borrow_mut().set_inverted(right));
        report
    }

    /// Invert masters, and followers when present
    pub fn invert_all(
        &self,
        left_master: bool,
        right_master: bool,
        left_follower: bool,
        right_follower: bool,
    ) -> BroadcastReport {
        let mut report = self.invert(left_master, right_master);
        if let Some(followers) = &self.followers {
            report.record(followers.left.borrow_mut().set_inverted(left_follower));
            report.record(followers.right.borrow_mut().set_inverted(right_follower));
        }
        report
    }

    // === Telemetry ===

    /// Read one value from each master; unreadable sides are skipped
    fn read_both<F>(&self, label: &str, mut read: F) -> Vec<TelemetryEntry>
    where
        F: FnMut(&mut Controller) -> Result<f64, ControllerError>,
    {
        let mut entries = Vec::with_capacity(2);
        for side in [Side::Left, Side::Right] {
            match read(&mut self.master(side).borrow_mut()) {
                Ok(value) => entries.push(TelemetryEntry::new(
                    format!("{} Controller {}", side.label(), label),
                    value,
                )),
                Err(e) => warn!("Telemetry read {:?} {} failed: {}", side, label, e),
            }
        }
        entries
    }

    pub fn output_telemetry(&self) -> Vec<TelemetryEntry> {
        self.read_both("Output Percentage", |c| c.motor_output_percent())
    }

    pub fn closed_loop_error_telemetry(&self, pid_loop: PidLoop) -> Vec<TelemetryEntry> {
        let label = format!("Closed Loop Error {}", pid_loop.label());
        self.read_both(&label, |c| c.closed_loop_error(pid_loop.index()))
    }

    pub fn sensor_position_telemetry(&self, pid_loop: PidLoop) -> Vec<TelemetryEntry> {
        let label = format!("Position {}", pid_loop.label());
        self.read_both(&label, |c| c.sensor_position(pid_loop.index()))
    }

    /// Everything above for both loops
    pub fn telemetry(&self) -> Vec<TelemetryEntry> {
        let mut entries = self.output_telemetry();
        for pid_loop in [PidLoop::Primary, PidLoop::Auxiliary] {
            entries.extend(self.closed_loop_error_telemetry(pid_loop));
            entries.extend(self.sensor_position_telemetry(pid_loop));
        }
        entries
    }

    pub fn publish(&self, sink: &mut dyn TelemetrySink) {
        sink.put_all(&self.telemetry());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Dashboard;
    use crate::motor::{SimController, StatusCode};

    struct Rig {
        actuator: PairedActuator,
        sims: Vec<SimController>,
    }

    fn controller(id: u8) -> (ControllerRef, SimController) {
        let sim = SimController::new(id);
        (shared(Controller::new(Box::new(sim.clone()))), sim)
    }

    fn masters_only() -> Rig {
        let (left, l) = controller(1);
        let (right, r) = controller(2);
        Rig {
            actuator: PairedActuator::new(left, right),
            sims: vec![l, r],
        }
    }

    fn with_followers() -> Rig {
        let (left, l) = controller(1);
        let (right, r) = controller(2);
        let (lf, lfs) = controller(3);
        let (rf, rfs) = controller(4);
        Rig {
            actuator: PairedActuator::with_followers(
                left,
                right,
                Followers {
                    left: lf,
                    right: rf,
                },
            ),
            sims: vec![l, r, lfs, rfs],
        }
    }

    #[derive(Clone, Copy)]
    enum Way {
        In,
        Out,
    }

    impl Direction for Way {
        fn sign(self) -> f64 {
            match self {
                Way::In => 1.0,
                Way::Out => -1.0,
            }
        }
    }

    #[test]
    fn test_followers_wired_at_construction() {
        let rig = with_followers();
        assert_eq!(rig.sims[2].state().following, Some(1));
        assert_eq!(rig.sims[3].state().following, Some(2));
    }

    #[test]
    fn test_wire_followers_idempotent() {
        let rig = with_followers();
        let once = (rig.sims[2].state(), rig.sims[3].state());
        assert!(rig.actuator.wire_followers().is_success());
        assert_eq!((rig.sims[2].state(), rig.sims[3].state()), once);
    }

    #[test]
    fn test_wire_followers_without_followers_is_noop() {
        let rig = masters_only();
        assert!(rig.actuator.wire_followers().is_success());
        assert_eq!(rig.sims[0].call_count(), 0);
        assert_eq!(rig.sims[1].call_count(), 0);
    }

    #[test]
    fn test_apply_to_all_order() {
        let rig = with_followers();
        let mut seen = Vec::new();
        rig.actuator.apply_to_all(|c| {
            seen.push(c.device_id());
            Ok(())
        });
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_apply_to_all_without_followers_touches_masters() {
        let rig = masters_only();
        let mut seen = Vec::new();
        rig.actuator.apply_to_all(|c| {
            seen.push(c.device_id());
            Ok(())
        });
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_neutral_mode_reaches_followers() {
        let rig = with_followers();
        assert!(rig.actuator.set_neutral_mode(NeutralMode::Brake).is_success());
        for sim in &rig.sims {
            assert_eq!(sim.state().neutral_mode, NeutralMode::Brake);
        }
    }

    #[test]
    fn test_current_limit_masters_only() {
        let rig = with_followers();
        rig.actuator.set_current_limit(40.0, 50, 30.0, None);
        assert!(rig.sims[0].state().current_limit_enabled);
        assert!(rig.sims[1].state().current_limit_enabled);
        assert!(!rig.sims[2].state().current_limit_enabled);
        assert!(!rig.sims[3].state().current_limit_enabled);
    }

    #[test]
    fn test_current_limit_uses_each_masters_timeout() {
        let rig = masters_only();
        rig.actuator
            .right()
            .borrow_mut()
            .set_default_timeout(Duration::from_millis(40));
        rig.actuator.set_current_limit(40.0, 50, 30.0, None);
        assert_eq!(rig.sims[0].last_timeout(), Some(Duration::from_millis(10)));
        assert_eq!(rig.sims[1].last_timeout(), Some(Duration::from_millis(40)));

        rig.actuator
            .set_current_limit(35.0, 50, 25.0, Some(Duration::from_millis(5)));
        assert_eq!(rig.sims[0].last_timeout(), Some(Duration::from_millis(5)));
        assert_eq!(rig.sims[1].last_timeout(), Some(Duration::from_millis(5)));
    }

    #[test]
    fn test_set_both_is_symmetric() {
        let rig = masters_only();
        rig.actuator.set_both(ControlMode::Velocity, 300.0);
        for sim in &rig.sims {
            assert_eq!(sim.state().mode, ControlMode::Velocity);
            assert_eq!(sim.state().output, 300.0);
        }
    }

    #[test]
    fn test_mirrored_output() {
        let rig = masters_only();
        rig.actuator.set_mirrored(ControlMode::PercentOutput, 0.5, Way::In);
        assert_eq!(rig.sims[0].state().output, 0.5);
        assert_eq!(rig.sims[1].state().output, -0.5);

        rig.actuator.set_mirrored(ControlMode::PercentOutput, 0.5, Way::Out);
        assert_eq!(rig.sims[0].state().output, -0.5);
        assert_eq!(rig.sims[1].state().output, 0.5);
    }

    #[test]
    fn test_gains_per_side() {
        let rig = masters_only();
        let left = GainSet::ZERO.with_kp(1.0);
        let right = GainSet::ZERO.with_kp(1.2).with_kf(0.1);
        let report = rig
            .actuator
            .config_closed_loop_constants(1, &left, &right)
            .unwrap();
        assert!(report.is_success());
        assert_eq!(rig.sims[0].state().slots[1].kp, 1.0);
        assert_eq!(rig.sims[1].state().slots[1].kp, 1.2);
        assert_eq!(rig.sims[1].state().slots[1].kf, 0.1);
    }

    #[test]
    fn test_gains_reject_bad_slot() {
        let rig = masters_only();
        assert!(matches!(
            rig.actuator
                .config_closed_loop_constants(7, &GainSet::ZERO, &GainSet::ZERO),
            Err(ControllerError::InvalidArgument { value: 7, .. })
        ));
        assert_eq!(rig.sims[0].call_count(), 0);
    }

    #[test]
    fn test_closed_loop_error_conjunction() {
        let rig = masters_only();
        let (l, r) = (&rig.sims[0], &rig.sims[1]);

        l.set_closed_loop_error(PidLoop::Primary, 4.999);
        r.set_closed_loop_error(PidLoop::Primary, -4.999);
        assert!(rig.actuator.is_closed_loop_error_within(0, 5.0).unwrap());

        // Exactly on the tolerance is not within it
        r.set_closed_loop_error(PidLoop::Primary, 5.0);
        assert!(!rig.actuator.is_closed_loop_error_within(0, 5.0).unwrap());

        l.set_closed_loop_error(PidLoop::Primary, 12.0);
        r.set_closed_loop_error(PidLoop::Primary, 0.0);
        assert!(!rig.actuator.is_closed_loop_error_within(0, 5.0).unwrap());

        // Auxiliary loop is independent
        assert!(rig.actuator.is_closed_loop_error_within(1, 5.0).unwrap());
        assert!(rig.actuator.is_closed_loop_error_within(2, 5.0).is_err());
    }

    #[test]
    fn test_failures_are_aggregated() {
        let rig = with_followers();
        rig.sims[1].fail_next(1, StatusCode::Timeout);
        let report = rig.actuator.set_neutral_mode(NeutralMode::Brake);
        assert_eq!(
            report.failures,
            vec![ControllerError::Device {
                device_id: 2,
                code: StatusCode::Timeout
            }]
        );
        // Everyone else still got the command
        assert_eq!(rig.sims[3].state().neutral_mode, NeutralMode::Brake);
    }

    #[test]
    fn test_invert_all() {
        let rig = with_followers();
        rig.actuator.invert_all(false, true, false, true);
        let inverted: Vec<bool> = rig.sims.iter().map(|s| s.state().inverted).collect();
        assert_eq!(inverted, vec![false, true, false, true]);
    }

    #[test]
    fn test_telemetry_keys() {
        let rig = masters_only();
        rig.actuator.set_sides(ControlMode::PercentOutput, 0.25, -0.75);
        rig.sims[1].set_closed_loop_error(PidLoop::Auxiliary, 3.0);
        rig.sims[0].set_sensor_position(PidLoop::Primary, 1024.0);

        let mut dashboard = Dashboard::new();
        rig.actuator.publish(&mut dashboard);

        assert_eq!(dashboard.len(), 10);
        assert_eq!(dashboard.get("Left Controller Output Percentage"), Some(0.25));
        assert_eq!(dashboard.get("Right Controller Output Percentage"), Some(-0.75));
        assert_eq!(
            dashboard.get("Right Controller Closed Loop Error Auxiliary"),
            Some(3.0)
        );
        assert_eq!(dashboard.get("Left Controller Position Primary"), Some(1024.0));
    }

    #[test]
    fn test_reset_masters() {
        let rig = with_followers();
        rig.actuator.set_current_limit(40.0, 50, 30.0, None);
        let [left, right] = rig.actuator.reset_masters();
        assert!(left.is_success() && right.is_success());
        assert_eq!(left.device_id, 1);
        assert!(!rig.sims[0].state().current_limit_enabled);
    }
}
