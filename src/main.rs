use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use paired_actuator_hal::config::{LOOP_HZ, MAX_LOOP_HZ, RobotConfig};

/// Drivetrain runtime over zenoh, backed by simulated controllers
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON robot config; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Control loop frequency in Hz
    #[arg(
        long,
        default_value_t = LOOP_HZ,
        value_parser = clap::value_parser!(u64).range(1..=MAX_LOOP_HZ)
    )]
    loop_hz: u64,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match RobotConfig::load(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                eprintln!("Config error: {}", e);
                std::process::exit(2);
            }
        },
        None => RobotConfig::default(),
    };

    if let Err(e) = paired_actuator_hal::runtime::run(config, args.loop_hz).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_hz_range() {
        let args = Args::try_parse_from(["runtime"]).unwrap();
        assert_eq!(args.loop_hz, LOOP_HZ);
        assert_eq!(
            Args::try_parse_from(["runtime", "--loop-hz", "1000"]).unwrap().loop_hz,
            1000
        );
        assert!(Args::try_parse_from(["runtime", "--loop-hz", "0"]).is_err());
        assert!(Args::try_parse_from(["runtime", "--loop-hz", "1001"]).is_err());
    }
}
