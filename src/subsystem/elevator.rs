// Elevator driven by one master and any number of followers
//
// Every output carries a gravity feed-forward. With a slow-down configured,
// downward travel below the soft limit is scaled back as the carriage nears
// the bottom, harder when it is already moving fast.

use std::time::Duration;

use tracing::{debug, warn};

use super::paired::{BroadcastReport, ControllerRef};
use crate::motor::{ControlMode, Controller, ControllerError, CurrentLimit, Demand, NeutralMode};

/// Output factor bounds, reached at the bottom (`min`) and at the soft limit (`max`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorRange {
    pub min: f64,
    pub max: f64,
}

impl FactorRange {
    /// Linear in position over [0, soft_limit], clamped to the range
    fn at(self, position: f64, soft_limit: f64) -> f64 {
        if soft_limit <= 0.0 {
            return self.min;
        }
        let factor = self.min + position * (self.max - self.min) / soft_limit;
        factor.clamp(self.min.min(self.max), self.min.max(self.max))
    }
}

/// Downward slow-down below a soft limit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlowDown {
    /// PID loop whose sensor tracks the carriage
    pub pid_loop: u8,
    /// Position, in native units, below which downward output is scaled
    pub soft_limit: f64,
    /// Top carriage speed in native units per 100 ms; must be positive
    pub max_speed: f64,
    /// Fraction of `max_speed` separating the two factor ranges
    pub slow_down_percent: f64,
    /// Used while slower than `slow_down_percent` of `max_speed`
    pub slow: FactorRange,
    /// Used at or above it
    pub fast: FactorRange,
}

pub struct Elevator {
    master: ControllerRef,
    followers: Vec<ControllerRef>,
    gravity_feed_forward: f64,
    slow_down: Option<SlowDown>,
}

impl Elevator {
    /// Every follower is wired to the master on construction
    pub fn new(master: ControllerRef, followers: Vec<ControllerRef>, gravity_feed_forward: f64) -> Self {
        let elevator = Self {
            master,
            followers,
            gravity_feed_forward,
            slow_down: None,
        };
        let report = elevator.follow_master();
        if !report.is_success() {
            warn!(
                "Elevator follower wiring finished with {} failures",
                report.failures.len()
            );
        }
        elevator
    }

    pub fn with_slow_down(mut self, slow_down: SlowDown) -> Self {
        self.slow_down = Some(slow_down);
        self
    }

    pub fn master(&self) -> &ControllerRef {
        &self.master
    }

    pub fn followers(&self) -> &[ControllerRef] {
        &self.followers
    }

    pub fn gravity_feed_forward(&self) -> f64 {
        self.gravity_feed_forward
    }

    /// Point every follower at the master again
    pub fn follow_master(&self) -> BroadcastReport {
        let master = self.master.borrow();
        let mut report = BroadcastReport::default();
        for follower in &self.followers {
            report.record(follower.borrow_mut().follow(&master));
        }
        report
    }

    /// Apply `op` to each follower in order
    pub fn apply_to_followers<F>(&self, mut op: F) -> BroadcastReport
    where
        F: FnMut(&mut Controller) -> Result<(), ControllerError>,
    {
        let mut report = BroadcastReport::default();
        for follower in &self.followers {
            report.record(op(&mut follower.borrow_mut()));
        }
        report
    }

    /// Apply `op` to the master, then to each follower
    pub fn apply_to_all<F>(&self, mut op: F) -> BroadcastReport
    where
        F: FnMut(&mut Controller) -> Result<(), ControllerError>,
    {
        let mut report = BroadcastReport::default();
        report.record(op(&mut self.master.borrow_mut()));
        report.merge(self.apply_to_followers(op));
        report
    }

    pub fn set_neutral_mode(&self, mode: NeutralMode) -> BroadcastReport {
        debug!("Elevator neutral mode {:?}", mode);
        self.apply_to_all(|c| c.set_neutral_mode(mode))
    }

    /// Invert the master, and each follower by position in `followers`
    ///
    /// Followers are left alone when `followers` does not have one entry per
    /// follower.
    pub fn set_inverted(&self, master: bool, followers: &[bool]) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        report.record(self.master.borrow_mut().set_inverted(master));
        if followers.len() != self.followers.len() {
            warn!(
                "Elevator has {} followers, got {} inversion flags",
                self.followers.len(),
                followers.len()
            );
            return report;
        }
        for (follower, &invert) in self.followers.iter().zip(followers) {
            report.record(follower.borrow_mut().set_inverted(invert));
        }
        report
    }

    /// Current-limit the master; followers mirror its output
    pub fn set_current_limit(
        &self,
        peak_amps: f64,
        peak_duration_ms: u32,
        continuous_amps: f64,
        timeout: Option<Duration>,
    ) -> Result<(), ControllerError> {
        let limit = CurrentLimit {
            peak_amps,
            peak_duration_ms,
            continuous_amps,
        };
        self.master.borrow_mut().config_current_limit(limit, timeout)
    }

    /// Signed percent output, slowed near the bottom, plus the gravity
    /// feed-forward
    pub fn set_percent_output(&self, output: f64) -> Result<(), ControllerError> {
        let output = match self.slow_down {
            Some(slow_down) => output * self.output_factor(&slow_down, output)?,
            None => output,
        };
        self.master.borrow_mut().set_with_demand(
            ControlMode::PercentOutput,
            output,
            Demand::ArbitraryFeedForward(self.gravity_feed_forward),
        )
    }

    /// Scale for a requested output; 1 unless moving down below the soft limit
    fn output_factor(&self, slow_down: &SlowDown, output: f64) -> Result<f64, ControllerError> {
        if output >= 0.0 {
            return Ok(1.0);
        }
        let mut master = self.master.borrow_mut();
        let position = master.sensor_position(slow_down.pid_loop)?;
        if position > slow_down.soft_limit {
            return Ok(1.0);
        }
        let velocity = master.sensor_velocity(slow_down.pid_loop)?;
        let range = if velocity.abs() / slow_down.max_speed < slow_down.slow_down_percent {
            slow_down.slow
        } else {
            slow_down.fast
        };
        Ok(range.at(position, slow_down.soft_limit))
    }

    pub fn current(&self) -> Result<f64, ControllerError> {
        self.master.borrow_mut().output_current()
    }
}
