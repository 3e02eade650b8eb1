//! Integration test framework for telsim
#![allow(missing_docs)]
//!
//! Runs the whole phone (radio router, service state and data tasks) on top
//! of the simulated radio and observes it through its event streams.
//!
//! # Components
//!
//! - [`test_fixtures`] - Phone configuration builders
//! - [`test_utils`] - Logging setup, waiting helpers and event collectors
//!
//! # Test Categories
//!
//! 1. **Data Connection Tests** - bring-up, retry, teardown and recovery
//! 2. **Registration Tests** - attach edges, roaming, restriction, radio power

pub mod test_fixtures;
pub mod test_utils;

pub use test_fixtures::TestPhoneConfig;
pub use test_utils::{
    collect_for, drain, expect_data_event, expect_registration_event, init_test_logging,
    TestResult, DEFAULT_TEST_TIMEOUT,
};
