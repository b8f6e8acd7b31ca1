// Timeouts, loop timing, topics and robot configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::motor::{CurrentLimit, GainSet, NeutralMode};

// Default per-call budget for device configuration
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10);

// Control loop frequency (20 ms robot cycle)
pub const LOOP_HZ: u64 = 50;
pub const LOOP_PERIOD: Duration = Duration::from_millis(1000 / LOOP_HZ);
// Fastest loop the runtime accepts; one tick per millisecond
pub const MAX_LOOP_HZ: u64 = 1000;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Voltage compensation saturation used by the controller builder
pub const MAX_VOLTAGE: f64 = 10.0;

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "robot/cmd/drive"; // commands
pub const TOPIC_TELEMETRY: &str = "robot/state/telemetry"; // dashboard values
pub const TOPIC_HEALTH: &str = "robot/state/health"; // health status

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Device IDs and tuning for the drivetrain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivetrainConfig {
    pub left_master: u8,
    pub right_master: u8,
    /// Left and right follower IDs; both or neither
    pub followers: Option<(u8, u8)>,
    /// Wheel diameter in inches
    pub wheel_diameter: f64,
    pub neutral_mode: NeutralMode,
    pub current_limit: Option<CurrentLimit>,
    pub velocity_slot: u8,
    pub left_gains: GainSet,
    pub right_gains: GainSet,
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        Self {
            left_master: 1,
            right_master: 2,
            followers: Some((3, 4)),
            wheel_diameter: 4.0,
            neutral_mode: NeutralMode::Brake,
            current_limit: Some(CurrentLimit {
                peak_amps: 40.0,
                peak_duration_ms: 50,
                continuous_amps: 30.0,
            }),
            velocity_slot: 0,
            left_gains: GainSet::ZERO.with_kf(0.25).with_kp(0.4),
            right_gains: GainSet::ZERO.with_kf(0.25).with_kp(0.4),
        }
    }
}

/// Top-level robot configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Default device timeout in milliseconds
    pub timeout_ms: Option<u64>,
    pub drivetrain: DrivetrainConfig,
    pub imu_id: Option<u8>,
}

impl RobotConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_period() {
        assert_eq!(LOOP_PERIOD, Duration::from_millis(20));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RobotConfig = serde_json::from_str(
            r#"{
                "timeout_ms": 25,
                "drivetrain": { "wheel_diameter": 6.0, "followers": null, "neutral_mode": "coast" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(25));
        assert_eq!(config.drivetrain.wheel_diameter, 6.0);
        assert_eq!(config.drivetrain.followers, None);
        assert_eq!(config.drivetrain.neutral_mode, NeutralMode::Coast);
        assert_eq!(config.drivetrain.left_master, 1);
        assert_eq!(config.imu_id, None);
    }

    #[test]
    fn test_empty_config() {
        let config: RobotConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RobotConfig::default());
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
    }
}
