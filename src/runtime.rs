// 50 Hz drive loop with watchdog
// Note: the watchdog stops the drivetrain when drive commands stop arriving,
// e.g. when the teleop process crashes mid-drive

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{CMD_TIMEOUT, MAX_LOOP_HZ, RobotConfig, TOPIC_CMD_DRIVE, TOPIC_HEALTH, TOPIC_TELEMETRY};
use crate::messages::{Dashboard, DriveCommand, RuntimeHealth, TelemetryEntry};
use crate::motor::{Imu, MotorController, SimController, SimImu};
use crate::subsystem::Drivetrain;

pub struct Runtime {
    drivetrain: Drivetrain,
    latest_cmd: Option<DriveCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
    dashboard: Dashboard,
}

impl Runtime {
    pub fn new(drivetrain: Drivetrain) -> Self {
        Self {
            drivetrain,
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
            dashboard: Dashboard::new(),
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn drivetrain(&self) -> &Drivetrain {
        &self.drivetrain
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: DriveCommand) {
        self.on_command_at(cmd, Instant::now());
    }

    fn on_command_at(&mut self, cmd: DriveCommand, now: Instant) {
        if !(cmd.speed.is_finite() && cmd.turn.is_finite()) {
            warn!("Ignoring non-finite command: {:?}", cmd);
            return;
        }
        info!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(DriveCommand {
            speed: cmd.speed.clamp(-1.0, 1.0),
            turn: cmd.turn.clamp(-1.0, 1.0),
        });
        self.cmd_received_at = now;
    }

    /// Command to apply this tick (includes watchdog logic)
    fn compute_command(&mut self, now: Instant) -> Option<DriveCommand> {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);

        if cmd_age > CMD_TIMEOUT {
            // Watchdog triggered - stop the robot
            if self.health != RuntimeHealth::CmdStale {
                warn!("Command stale ({:?} old), stopping drivetrain", cmd_age);
            }
            self.health = RuntimeHealth::CmdStale;
            None
        } else if let Some(cmd) = self.latest_cmd {
            self.health = RuntimeHealth::Ok;
            Some(cmd)
        } else {
            // No command ever received
            self.health = RuntimeHealth::CmdStale;
            None
        }
    }

    /// One loop iteration: drive, then collect telemetry
    pub fn step(&mut self) -> Vec<TelemetryEntry> {
        self.step_at(Instant::now())
    }

    fn step_at(&mut self, now: Instant) -> Vec<TelemetryEntry> {
        let report = match self.compute_command(now) {
            Some(cmd) => self.drivetrain.arcade_drive_percent_output(cmd.speed, cmd.turn),
            None => self.drivetrain.stop(),
        };
        if !report.is_success() {
            self.health = RuntimeHealth::DeviceFault;
        }

        self.drivetrain.actuator().publish(&mut self.dashboard);
        self.dashboard.entries()
    }
}

/// Drivetrain over simulated controllers, with a simulated gyro if configured
pub fn sim_drivetrain(config: &RobotConfig) -> Result<Drivetrain, Box<dyn std::error::Error + Send + Sync>> {
    let (drivetrain, report) = Drivetrain::from_config(config, |id| {
        Box::new(SimController::new(id)) as Box<dyn MotorController>
    })?;
    if !report.is_success() {
        warn!("Drivetrain setup had {} failures", report.failures.len());
    }

    Ok(match config.imu_id {
        Some(id) => {
            let imu = Imu::with_timeout(Box::new(SimImu::new(id)), config.timeout());
            drivetrain.with_imu(std::rc::Rc::new(std::cell::RefCell::new(imu)))
        }
        None => drivetrain,
    })
}

/// Tick period for a loop rate, clamped to [1, MAX_LOOP_HZ] Hz
pub fn loop_period(loop_hz: u64) -> Duration {
    Duration::from_micros(1_000_000 / loop_hz.clamp(1, MAX_LOOP_HZ))
}

pub async fn run(
    config: RobotConfig,
    loop_hz: u64,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut runtime = Runtime::new(sim_drivetrain(&config)?);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_TELEMETRY).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut tick = interval(loop_period(loop_hz));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        loop_hz,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_DRIVE);
    info!("Publishing to: {}, {}", TOPIC_TELEMETRY, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DriveCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. Drive the robot and read back telemetry
        let telemetry = runtime.step();

        // 3. Publish telemetry
        let telemetry_json = serde_json::to_string(&telemetry)?;
        pub_telemetry.put(telemetry_json).await?;

        // 4. Publish health
        let health_json = serde_json::to_string(&runtime.health)?;
        pub_health.put(health_json).await?;
    }
}
