//! Logging setup and radio traffic tracing
//!
//! `init_logging` applies the chosen level to the telsim crates only and
//! leaves dependencies at `warn`. `RUST_LOG` replaces the whole filter.
//! Radio interface layer traffic is traced under its own target so it can
//! be switched on separately:
//!
//! ```text
//! RUST_LOG=info,telsim::ril=debug telsim-phone -c phone.yaml
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Target used for radio interface layer traffic.
pub const RIL_TARGET: &str = "telsim::ril";

const TELSIM_CRATES: [&str; 3] = ["telsim_common", "telsim_ril", "telsim_phone"];

/// Verbosity of the telsim crates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Filter directive enabling this level for telsim and `warn` elsewhere.
    pub fn directive(self) -> String {
        let mut directive = String::from("warn");
        for krate in TELSIM_CRATES {
            directive.push_str(&format!(",{krate}={}", self.as_str()));
        }
        directive.push_str(&format!(",{RIL_TARGET}={}", self.as_str()));
        directive
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized log level name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log level '{0}', expected one of trace, debug, info, warn, error")]
pub struct UnknownLogLevel(pub String);

impl FromStr for LogLevel {
    type Err = UnknownLogLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if lower == "warning" {
            return Ok(LogLevel::Warn);
        }
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == lower)
            .ok_or_else(|| UnknownLogLevel(s.to_string()))
    }
}

/// Installs the global subscriber at `level`.
///
/// Call once at startup; later calls are ignored.
pub fn init_logging(level: LogLevel) {
    init_logging_with_filter(&level.directive());
}

/// Installs the global subscriber with an explicit filter directive.
///
/// ```
/// use telsim_common::logging::init_logging_with_filter;
///
/// init_logging_with_filter("info,telsim_phone::dc=trace");
/// ```
pub fn init_logging_with_filter(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Which way a radio message travels, seen from the phone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Response or indication from the radio
    Rx,
    /// Request to the radio
    Tx,
}

impl Direction {
    fn arrow(self) -> &'static str {
        match self {
            Direction::Rx => "<-",
            Direction::Tx => "->",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.arrow())
    }
}

/// Traces one radio request, response or indication.
///
/// `token` is the request token, or `-` for unsolicited indications.
pub fn log_ril_message(direction: Direction, msg_type: &str, token: &str) {
    tracing::debug!(target: RIL_TARGET, token, "{} {}", direction, msg_type);
}
