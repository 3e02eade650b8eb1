//! telsim phone simulator
//!
//! Runs the data-connection and registration state machines against a
//! simulated radio:
//! - CLI argument parsing
//! - Configuration loading and validation
//! - Task spawning and lifecycle management
//! - Graceful shutdown handling
//!
//! # Usage
//!
//! ```bash
//! telsim-phone -c config/phone.yaml
//! telsim-phone -c config/phone.yaml --log-level debug --duration-secs 30
//! ```

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{debug, error, info, warn};

use telsim_common::{init_logging, LogLevel, PhoneConfig};
use telsim_phone::app::load_and_validate_phone_config;
use telsim_phone::{DataEvent, Phone, PhoneEvents};

/// telsim phone - cellular data connection simulator
#[derive(Parser, Debug)]
#[command(name = "telsim-phone")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the phone configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config_file: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(short = 'd', long = "duration-secs", value_name = "SECS")]
    duration_secs: Option<u64>,
}

/// Parsed and validated CLI options
#[derive(Debug, Clone)]
struct PhoneOptions {
    config_file: String,
    log_level: LogLevel,
    duration: Option<Duration>,
}

impl TryFrom<Args> for PhoneOptions {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self> {
        let log_level: LogLevel = args.log_level.parse()?;

        let duration = match args.duration_secs {
            Some(0) => bail!("Duration must be at least 1 second"),
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        Ok(PhoneOptions {
            config_file: args.config_file,
            log_level,
            duration,
        })
    }
}

fn load_config(path: &str) -> Result<PhoneConfig> {
    load_and_validate_phone_config(path)
        .with_context(|| format!("Failed to load configuration file: {path}"))
}

/// Logs data events until the stream closes.
async fn log_data_events(mut events: PhoneEvents) {
    loop {
        tokio::select! {
            event = events.data.recv() => match event {
                Some(DataEvent::Connected { apn_type, bearer, link }) => {
                    info!("[{}] connected on bearer {}: {}", apn_type, bearer, link);
                }
                Some(DataEvent::Disconnected { apn_type, reason }) => {
                    info!("[{}] disconnected ({})", apn_type, reason);
                }
                Some(event) => debug!("Data event {:?}", event),
                None => break,
            },
            Some(event) = events.registration.recv() => info!("Registration: {}", event),
            Some(signal) = events.signal.recv() => debug!("Signal level {}", signal.level()),
        }
    }
}

async fn run_phone(options: PhoneOptions) -> Result<()> {
    info!("Loading configuration from: {}", options.config_file);
    let config = load_config(&options.config_file)?;

    let (phone, events) = Phone::start(config);
    let logger = tokio::spawn(log_data_events(events));

    match options.duration {
        Some(duration) => {
            tokio::select! {
                _ = signal::ctrl_c() => info!("Received Ctrl+C, initiating shutdown..."),
                _ = tokio::time::sleep(duration) => info!("Run time of {:?} elapsed", duration),
            }
        }
        None => {
            signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, initiating shutdown...");
        }
    }

    if let Err(e) = phone.shutdown().await {
        warn!("Some tasks failed during shutdown: {}", e);
    }
    logger.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let options = match PhoneOptions::try_from(args) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("Invalid arguments: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(options.log_level);

    match run_phone(options).await {
        Ok(()) => {
            info!("Phone exited successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Phone failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
