//! Service state tracking
//!
//! Registration polling, signal strength and radio power.
//!
//! # Modules
//!
//! - [`tracker`]: poll cycles, edge detection, two-phase power-off
//! - [`snapshot`]: merged registration state of both domains
//! - [`events`]: edge notifications published to listeners
//! - [`task`]: the service state task driving the tracker

pub mod events;
pub mod snapshot;
pub mod task;
pub mod tracker;

pub use events::RegistrationEvent;
pub use snapshot::{service_state_for, RegistrationSnapshot};
pub use task::ServiceStateTask;
pub use tracker::{DataControl, PendingPowerOff, PollContext, RegistrationTracker};
