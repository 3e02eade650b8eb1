//! Radio interface layer (RIL) command contract
//!
//! This crate defines how the phone talks to its radio: requests keyed by
//! opaque completion tokens, asynchronous responses, and unsolicited
//! indications. The radio itself is external; a scripted simulated radio is
//! provided so the phone can run without hardware.
//!
//! # Modules
//!
//! - [`protocol`]: request, response and indication types
//! - [`channel`]: the [`RadioCommandChannel`] trait and its implementations
//! - [`sim`]: simulated radio task
//!
//! # Example
//!
//! ```rust
//! use telsim_ril::channel::{RadioCapabilities, RadioCommandChannel, RecordingRadio};
//! use telsim_ril::protocol::{RequestOwner, RequestToken, RilRequest};
//!
//! let radio = RecordingRadio::new(RadioCapabilities::default());
//! let token = RequestToken::new(RequestOwner::Registration, 1, 1);
//! radio.send(token, RilRequest::Operator);
//!
//! assert_eq!(radio.sent()[0].token, token);
//! ```

pub mod channel;
pub mod protocol;
pub mod sim;

pub use channel::{
    RadioCapabilities, RadioCommandChannel, RecordingRadio, RilClient, RilCommand,
    RilMessageSender,
};
pub use protocol::{
    BearerId, CallActivity, DataCallResponse, DeactivateReason, OperatorInfo, RegistrationState,
    RequestOwner, RequestToken, RestrictedState, RilError, RilIndication, RilMessage, RilPayload,
    RilRequest, RilResponse, SetupDataCallParams, SignalStrength, NO_SUGGESTED_RETRY,
    RSSI_UNKNOWN,
};
pub use sim::{SimControl, SimHandles, SimulatedRadio};
