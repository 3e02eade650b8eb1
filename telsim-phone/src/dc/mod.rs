//! Data connection management
//!
//! Bearers, the APN contexts that share them, and the registry that maps one
//! onto the other.
//!
//! # Modules
//!
//! - [`bearer`]: per-bearer state machine
//! - [`registry`]: APN context to bearer mapping, reconnect scheduling
//! - [`retry`]: retry bookkeeping and backoff schedule
//! - [`fail_cause`]: radio failure classification
//! - [`family`]: 3GPP / 3GPP2 specific behaviour
//! - [`task`]: the data task driving the registry

pub mod apn;
pub mod bearer;
pub mod envelope;
pub mod fail_cause;
pub mod family;
pub mod link;
pub mod registry;
pub mod retry;
pub mod task;

pub use apn::{ApnContext, ApnContextState, ApnSetting};
pub use bearer::{BearerConnection, BearerEvent, BearerNotice, BearerState};
pub use envelope::{
    BearerCompletion, CompletionHandle, CompletionOutcome, OperationKind, PendingOperationEnvelope,
};
pub use fail_cause::{FailCause, RetryDisposition};
pub use family::{family_for, CdmaFamily, GsmFamily, NetworkFamily};
pub use link::{LinkAddress, LinkCapabilities, LinkError, LinkProperties};
pub use registry::{ConnectionRegistry, DataEvent};
pub use retry::{RetryConfigError, RetryPolicy};
pub use task::{DataTask, DataTaskControl};

/// Reasons attached to connect and disconnect requests.
pub mod reason {
    pub const DATA_ATTACHED: &str = "dataAttached";
    pub const DATA_DETACHED: &str = "dataDetached";
    pub const DATA_ENABLED: &str = "dataEnabled";
    pub const DATA_DISABLED: &str = "dataDisabled";
    pub const APN_ENABLED: &str = "apnEnabled";
    pub const APN_DISABLED: &str = "apnDisabled";
    pub const ROAMING_ON: &str = "roamingOn";
    pub const ROAMING_OFF: &str = "roamingOff";
    pub const PS_RESTRICT_ENABLED: &str = "psRestrictEnabled";
    pub const PS_RESTRICT_DISABLED: &str = "psRestrictDisabled";
    pub const RADIO_TURNED_OFF: &str = "radioTurnedOff";
    pub const NW_TYPE_CHANGED: &str = "nwTypeChanged";
    pub const LOST_DATA_CONNECTION: &str = "lostDataConnection";
    pub const RETRY: &str = "retry";
}
