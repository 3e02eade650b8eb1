//! RIL message types
//!
//! This module defines the requests the phone sends to the radio interface
//! layer, the responses it gets back, and the unsolicited indications the
//! radio pushes on its own. Every request carries a [`RequestToken`] that the
//! radio echoes verbatim in its response.

use std::fmt;

use serde::{Deserialize, Serialize};
use telsim_common::{RadioState, RadioTechnology};
use thiserror::Error;

/// Bearer identifier, unique per connection registry
pub type BearerId = u32;

/// Sentinel for "no retry hint" in setup responses
pub const NO_SUGGESTED_RETRY: i32 = -1;

/// GSM rssi value meaning "not known or not detectable"
pub const RSSI_UNKNOWN: i32 = 99;

// ============================================================================
// Request tokens
// ============================================================================

/// State machine a radio request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestOwner {
    /// A bearer connection
    Bearer(BearerId),
    /// The registration tracker (registration polls, signal, radio power)
    Registration,
}

impl fmt::Display for RequestOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestOwner::Bearer(id) => write!(f, "bearer#{id}"),
            RequestOwner::Registration => write!(f, "registration"),
        }
    }
}

/// Opaque completion token echoed by the radio.
///
/// The owner routes the response, the generation identifies the owner's
/// lifecycle at issue time, and the serial identifies the request within
/// the owner's outstanding-request table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken {
    pub owner: RequestOwner,
    pub generation: u32,
    pub serial: u64,
}

impl RequestToken {
    pub const fn new(owner: RequestOwner, generation: u32, serial: u64) -> Self {
        Self {
            owner,
            generation,
            serial,
        }
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} gen={} serial={}",
            self.owner, self.generation, self.serial
        )
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Parameters of a data call setup request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupDataCallParams {
    /// Radio technology the call is set up on
    pub radio_tech: RadioTechnology,
    /// Data profile identifier
    pub profile: u32,
    pub apn: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// PAP/CHAP selector
    pub auth_type: u8,
    /// "IP", "IPV6" or "IPV4V6"
    pub protocol: String,
}

/// Reason code for deactivating a data call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum DeactivateReason {
    #[default]
    NoReason = 0,
    RadioShutdown = 1,
}

/// Request sent to the radio interface layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RilRequest {
    SetupDataCall(SetupDataCallParams),
    DeactivateDataCall { cid: i32, reason: DeactivateReason },
    LastDataCallFailCause,
    VoiceRegistrationState,
    DataRegistrationState,
    Operator,
    NetworkSelectionMode,
    SignalStrength,
    SetRadioPower(bool),
}

impl RilRequest {
    /// Request name as it appears in radio logs.
    pub fn name(&self) -> &'static str {
        match self {
            RilRequest::SetupDataCall(_) => "SETUP_DATA_CALL",
            RilRequest::DeactivateDataCall { .. } => "DEACTIVATE_DATA_CALL",
            RilRequest::LastDataCallFailCause => "LAST_DATA_CALL_FAIL_CAUSE",
            RilRequest::VoiceRegistrationState => "VOICE_REGISTRATION_STATE",
            RilRequest::DataRegistrationState => "DATA_REGISTRATION_STATE",
            RilRequest::Operator => "OPERATOR",
            RilRequest::NetworkSelectionMode => "QUERY_NETWORK_SELECTION_MODE",
            RilRequest::SignalStrength => "SIGNAL_STRENGTH",
            RilRequest::SetRadioPower(_) => "RADIO_POWER",
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Radio exception returned instead of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RilError {
    #[error("radio not available")]
    RadioNotAvailable,
    #[error("generic failure")]
    GenericFailure,
    #[error("request not supported")]
    RequestNotSupported,
    #[error("operation not allowed before registering to network")]
    OpNotAllowedBeforeRegToNw,
    #[error("operation not allowed during voice call")]
    OpNotAllowedDuringVoiceCall,
    #[error("request cancelled")]
    Cancelled,
    #[error("malformed response")]
    InvalidResponse,
}

/// Link state of a data call as reported by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallActivity {
    #[default]
    Inactive,
    Dormant,
    Up,
}

/// One data call, as returned by setup or listed in a data call list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataCallResponse {
    /// Failure cause code, 0 on success
    pub status: i32,
    /// Radio's retry hint in milliseconds, negative when absent
    pub suggested_retry_ms: i32,
    pub cid: i32,
    pub active: CallActivity,
    pub pdp_type: String,
    pub ifname: String,
    /// Addresses with optional prefix length ("10.0.0.2/24")
    pub addresses: Vec<String>,
    pub dnses: Vec<String>,
    pub gateways: Vec<String>,
    pub mtu: u32,
}

impl DataCallResponse {
    /// A failed setup carrying only a cause code.
    pub fn failure(status: i32, suggested_retry_ms: i32) -> Self {
        Self {
            status,
            suggested_retry_ms,
            cid: -1,
            ..Default::default()
        }
    }
}

/// Registration state of one domain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistrationState {
    /// 27.007 status: 0 not registered, 1 home, 2 searching, 3 denied, 4 unknown, 5 roaming
    pub status: u8,
    pub lac: Option<u32>,
    pub cell_id: Option<u32>,
    pub rat: RadioTechnology,
    /// Concurrent service support (CDMA)
    pub css_indicator: bool,
    pub reason_denied: Option<i32>,
}

impl RegistrationState {
    pub const NOT_REGISTERED: u8 = 0;
    pub const HOME: u8 = 1;
    pub const SEARCHING: u8 = 2;
    pub const DENIED: u8 = 3;
    pub const UNKNOWN: u8 = 4;
    pub const ROAMING: u8 = 5;

    pub fn is_registered(&self) -> bool {
        self.status == Self::HOME || self.status == Self::ROAMING
    }

    pub fn is_roaming(&self) -> bool {
        self.status == Self::ROAMING
    }
}

/// Operator identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OperatorInfo {
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    /// MCC+MNC digits
    pub numeric: Option<String>,
}

/// Signal strength report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalStrength {
    /// GSM rssi 0..31, 99 when unknown
    pub gsm_rssi: i32,
    /// Bit error rate 0..7, 99 when unknown
    pub gsm_ber: i32,
    /// CDMA rssi in negative dBm
    pub cdma_dbm: i32,
    /// LTE reference signal received power in dBm
    pub lte_rsrp: Option<i32>,
}

impl Default for SignalStrength {
    fn default() -> Self {
        Self {
            gsm_rssi: RSSI_UNKNOWN,
            gsm_ber: RSSI_UNKNOWN,
            cdma_dbm: -1,
            lte_rsrp: None,
        }
    }
}

impl SignalStrength {
    pub fn gsm(rssi: i32) -> Self {
        Self {
            gsm_rssi: rssi,
            ..Default::default()
        }
    }

    /// True when the GSM reading is the "unknown" sentinel.
    pub fn is_gsm_unknown(&self) -> bool {
        self.gsm_rssi == RSSI_UNKNOWN
    }

    /// Bar level 0..4 from the GSM rssi.
    pub fn level(&self) -> u8 {
        match self.gsm_rssi {
            r if r <= 2 || r == RSSI_UNKNOWN => 0,
            r if r >= 12 => 4,
            r if r >= 8 => 3,
            r if r >= 5 => 2,
            _ => 1,
        }
    }
}

/// Successful response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RilPayload {
    Ack,
    SetupDataCall(DataCallResponse),
    LastFailCause(i32),
    Registration(RegistrationState),
    Operator(OperatorInfo),
    NetworkSelectionMode { manual: bool },
    SignalStrength(SignalStrength),
}

/// Response to a request, keyed by the request's token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RilResponse {
    pub token: RequestToken,
    pub result: Result<RilPayload, RilError>,
}

impl RilResponse {
    pub fn ok(token: RequestToken, payload: RilPayload) -> Self {
        Self {
            token,
            result: Ok(payload),
        }
    }

    pub fn err(token: RequestToken, error: RilError) -> Self {
        Self {
            token,
            result: Err(error),
        }
    }
}

// ============================================================================
// Indications
// ============================================================================

/// Restricted state bits reported by the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestrictedState {
    pub cs_restricted: bool,
    pub ps_restricted: bool,
}

/// Unsolicited message from the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RilIndication {
    RadioStateChanged(RadioState),
    NetworkStateChanged,
    SignalStrength(SignalStrength),
    DataCallListChanged(Vec<DataCallResponse>),
    RestrictedStateChanged(RestrictedState),
}

impl RilIndication {
    pub fn name(&self) -> &'static str {
        match self {
            RilIndication::RadioStateChanged(_) => "UNSOL_RADIO_STATE_CHANGED",
            RilIndication::NetworkStateChanged => "UNSOL_NETWORK_STATE_CHANGED",
            RilIndication::SignalStrength(_) => "UNSOL_SIGNAL_STRENGTH",
            RilIndication::DataCallListChanged(_) => "UNSOL_DATA_CALL_LIST_CHANGED",
            RilIndication::RestrictedStateChanged(_) => "UNSOL_RESTRICTED_STATE_CHANGED",
        }
    }
}

/// Anything the radio delivers to the phone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RilMessage {
    Response(RilResponse),
    Indication(RilIndication),
}
