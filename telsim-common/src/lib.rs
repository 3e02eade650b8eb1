//! Common types and utilities for telsim
//!
//! This crate provides shared functionality used across the telsim crates:
//! - Network types (PLMN, service state, radio technology, APN types)
//! - Configuration structures
//! - Error types
//! - Logging setup

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{
    ApnConfig, AuthType, NetworkFamilyKind, PdpProtocol, PhoneConfig, RadioConfig,
    SimRegistration,
};
pub use error::{Error, Result};
pub use logging::{
    init_logging, init_logging_with_filter, log_ril_message, Direction, LogLevel, UnknownLogLevel,
};
pub use types::{ApnType, Plmn, RadioState, RadioTechnology, ServiceState};
