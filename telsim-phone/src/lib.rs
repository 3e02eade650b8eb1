//! telsim phone
//!
//! Cellular data-connection and registration state machines, run as a set
//! of message-passing tasks on top of a radio interface layer.
//!
//! # Architecture
//!
//! - **Radio Task**: routes radio responses and indications
//! - **Service State Task**: registration polling, signal strength, radio power
//! - **Data Task**: APN contexts, bearers, reconnect scheduling
//!
//! # Modules
//!
//! - [`tasks`]: task framework (messages, handles, lifecycle management)
//! - [`dc`]: bearer state machine, connection registry, retry and failure classification
//! - [`sst`]: registration tracker
//! - [`radio`]: radio message routing
//! - [`app`]: configuration loading and phone assembly
//! - [`registrants`]: event fan-out to subscribers

pub mod app;
pub mod dc;
pub mod radio;
pub mod registrants;
pub mod sst;
pub mod tasks;

pub use app::{Phone, PhoneEvents};
pub use dc::{
    ApnContext, ApnContextState, ApnSetting, BearerConnection, BearerState, ConnectionRegistry,
    DataEvent, DataTask, DataTaskControl, FailCause, RetryPolicy,
};
pub use radio::RadioTask;
pub use registrants::Registrants;
pub use sst::{
    DataControl, RegistrationEvent, RegistrationSnapshot, RegistrationTracker, ServiceStateTask,
};
pub use tasks::{
    DataMessage, PhoneTaskBase, RadioMessage, SstMessage, Task, TaskError, TaskHandle, TaskId,
    TaskInfo, TaskManager, TaskMessage, TaskState, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_SHUTDOWN_TIMEOUT_MS,
};
