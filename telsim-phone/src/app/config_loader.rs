//! Configuration Loading for the Phone
//!
//! Wraps [`PhoneConfig`] from `telsim-common` with the validation the phone
//! needs before any task starts.
//!
//! # Example
//!
//! ```rust,ignore
//! use telsim_phone::app::load_and_validate_phone_config;
//!
//! let config = load_and_validate_phone_config("config/phone.yaml")?;
//! ```

use std::path::Path;

use telsim_common::{PhoneConfig, Plmn};
use thiserror::Error;

use crate::dc::{ApnSetting, RetryPolicy};

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Configuration validation error
    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ConfigValidationError),
}

/// Errors that can occur during configuration validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("Invalid home PLMN: {0}")]
    InvalidHomePlmn(String),

    #[error("No APN configured: at least one entry must be present in apns")]
    NoApnConfigured,

    #[error("Invalid APN: {0}")]
    InvalidApn(String),

    /// An enabled APN type that no configured APN can serve
    #[error("No APN serves enabled type {0}")]
    UnservedApnType(String),

    #[error("Invalid retry configuration: {0}")]
    InvalidRetryConfig(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),
}

/// Loads a phone configuration from a YAML file.
///
/// Only parses; call [`validate_phone_config`] afterwards or use
/// [`load_and_validate_phone_config`].
pub fn load_phone_config<P: AsRef<Path>>(path: P) -> Result<PhoneConfig, ConfigError> {
    Ok(PhoneConfig::from_yaml_file(path)?)
}

/// Loads a phone configuration from a YAML string.
pub fn load_phone_config_from_str(yaml: &str) -> Result<PhoneConfig, ConfigError> {
    Ok(PhoneConfig::from_yaml(yaml)?)
}

impl From<telsim_common::Error> for ConfigError {
    fn from(e: telsim_common::Error) -> Self {
        match e {
            telsim_common::Error::Io(e) => ConfigError::IoError(e),
            other => ConfigError::ParseError(other.to_string()),
        }
    }
}

/// Validates a phone configuration.
///
/// # Validation Rules
///
/// - Home PLMN MCC must be 001-999 and MNC 00-999
/// - At least one APN, each with a name and at least one type
/// - Every enabled APN type must be served by some APN
/// - The retry schedule must parse
/// - `max_bearers` and `signal_poll_interval_ms` must be non-zero
pub fn validate_phone_config(config: &PhoneConfig) -> Result<(), ConfigValidationError> {
    validate_home_plmn(&config.home_plmn)?;

    if config.apns.is_empty() {
        return Err(ConfigValidationError::NoApnConfigured);
    }
    for (i, apn) in config.apns.iter().enumerate() {
        if apn.apn.trim().is_empty() {
            return Err(ConfigValidationError::InvalidApn(format!(
                "APN {i} has an empty name"
            )));
        }
        if apn.types.is_empty() {
            return Err(ConfigValidationError::InvalidApn(format!(
                "APN '{}' has no types",
                apn.apn
            )));
        }
    }

    let settings: Vec<ApnSetting> = config
        .apns
        .iter()
        .enumerate()
        .map(|(i, apn)| ApnSetting::from_config(i as u32, apn))
        .collect();
    for apn_type in &config.enabled_apn_types {
        if !settings.iter().any(|s| s.can_handle_type(*apn_type)) {
            return Err(ConfigValidationError::UnservedApnType(apn_type.to_string()));
        }
    }

    RetryPolicy::new()
        .configure_str(&config.retry_config)
        .map_err(|e| ConfigValidationError::InvalidRetryConfig(e.to_string()))?;

    if config.max_bearers == 0 {
        return Err(ConfigValidationError::InvalidLimit(
            "max_bearers must be at least 1".to_string(),
        ));
    }
    if config.signal_poll_interval_ms == 0 {
        return Err(ConfigValidationError::InvalidLimit(
            "signal_poll_interval_ms must be non-zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_home_plmn(plmn: &Plmn) -> Result<(), ConfigValidationError> {
    if plmn.mcc == 0 || plmn.mcc > 999 {
        return Err(ConfigValidationError::InvalidHomePlmn(format!(
            "MCC {} must be between 001 and 999",
            plmn.mcc
        )));
    }
    if plmn.mnc > 999 {
        return Err(ConfigValidationError::InvalidHomePlmn(format!(
            "MNC {} must be between 00 and 999",
            plmn.mnc
        )));
    }
    Ok(())
}

/// Loads and validates a phone configuration in one step.
pub fn load_and_validate_phone_config<P: AsRef<Path>>(
    path: P,
) -> Result<PhoneConfig, ConfigError> {
    let config = load_phone_config(path)?;
    validate_phone_config(&config)?;
    Ok(config)
}
