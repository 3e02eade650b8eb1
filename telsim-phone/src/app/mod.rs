//! Phone Application
//!
//! This module handles:
//! - Configuration loading and validation
//! - Assembling and starting the phone tasks on a simulated radio

mod config_loader;
mod phone;

pub use config_loader::{
    load_and_validate_phone_config, load_phone_config, load_phone_config_from_str,
    validate_phone_config, ConfigError, ConfigValidationError,
};
pub use phone::{Phone, PhoneEvents};
