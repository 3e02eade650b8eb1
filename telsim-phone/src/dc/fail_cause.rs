//! Data call failure causes
//!
//! Maps radio failure codes to typed causes and classifies them for retry.
//!
//! # Reference
//!
//! 3GPP TS 24.008 Section 10.5.6.6 (SM cause) plus locally generated causes.

use std::fmt;

/// Retry disposition of a failure cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    /// Transient, retry per the retry schedule
    Retry,
    /// Permanent, do not retry without an explicit trigger
    NoRetry,
    /// Radio is gone; stop retrying until it comes back
    RadioUnavailable,
}

/// Cause of a failed or lost data call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailCause {
    None,
    // 3GPP SM causes
    OperatorBarred,
    InsufficientResources,
    MissingUnknownApn,
    UnknownPdpAddressType,
    UserAuthentication,
    ActivationRejectGgsn,
    ActivationRejectUnspecified,
    ServiceOptionNotSupported,
    ServiceOptionNotSubscribed,
    ServiceOptionOutOfOrder,
    NsapiInUse,
    OnlyIpv4Allowed,
    OnlyIpv6Allowed,
    OnlySingleBearerAllowed,
    ProtocolErrors,
    // Local causes
    RegistrationFail,
    GprsRegistrationFail,
    SignalLost,
    PrefRadioTechChanged,
    RadioPowerOff,
    TetheredCallActive,
    ErrorUnspecified,
    // Internal sentinels
    Unknown,
    RadioNotAvailable,
    UnacceptableNetworkParameter,
    ConnectionToDatacallLost,
    LostConnection,
    Reset,
}

impl FailCause {
    /// Maps a radio failure code; unrecognised codes map to [`FailCause::Unknown`].
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => FailCause::None,
            0x08 => FailCause::OperatorBarred,
            0x1A => FailCause::InsufficientResources,
            0x1B => FailCause::MissingUnknownApn,
            0x1C => FailCause::UnknownPdpAddressType,
            0x1D => FailCause::UserAuthentication,
            0x1E => FailCause::ActivationRejectGgsn,
            0x1F => FailCause::ActivationRejectUnspecified,
            0x20 => FailCause::ServiceOptionNotSupported,
            0x21 => FailCause::ServiceOptionNotSubscribed,
            0x22 => FailCause::ServiceOptionOutOfOrder,
            0x23 => FailCause::NsapiInUse,
            0x32 => FailCause::OnlyIpv4Allowed,
            0x33 => FailCause::OnlyIpv6Allowed,
            0x34 => FailCause::OnlySingleBearerAllowed,
            0x6F => FailCause::ProtocolErrors,
            -1 => FailCause::RegistrationFail,
            -2 => FailCause::GprsRegistrationFail,
            -3 => FailCause::SignalLost,
            -4 => FailCause::PrefRadioTechChanged,
            -5 => FailCause::RadioPowerOff,
            -6 => FailCause::TetheredCallActive,
            0xFFFF => FailCause::ErrorUnspecified,
            0x10001 => FailCause::RadioNotAvailable,
            0x10002 => FailCause::UnacceptableNetworkParameter,
            0x10003 => FailCause::ConnectionToDatacallLost,
            0x10004 => FailCause::LostConnection,
            0x10005 => FailCause::Reset,
            _ => FailCause::Unknown,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            FailCause::None => 0,
            FailCause::OperatorBarred => 0x08,
            FailCause::InsufficientResources => 0x1A,
            FailCause::MissingUnknownApn => 0x1B,
            FailCause::UnknownPdpAddressType => 0x1C,
            FailCause::UserAuthentication => 0x1D,
            FailCause::ActivationRejectGgsn => 0x1E,
            FailCause::ActivationRejectUnspecified => 0x1F,
            FailCause::ServiceOptionNotSupported => 0x20,
            FailCause::ServiceOptionNotSubscribed => 0x21,
            FailCause::ServiceOptionOutOfOrder => 0x22,
            FailCause::NsapiInUse => 0x23,
            FailCause::OnlyIpv4Allowed => 0x32,
            FailCause::OnlyIpv6Allowed => 0x33,
            FailCause::OnlySingleBearerAllowed => 0x34,
            FailCause::ProtocolErrors => 0x6F,
            FailCause::RegistrationFail => -1,
            FailCause::GprsRegistrationFail => -2,
            FailCause::SignalLost => -3,
            FailCause::PrefRadioTechChanged => -4,
            FailCause::RadioPowerOff => -5,
            FailCause::TetheredCallActive => -6,
            FailCause::ErrorUnspecified => 0xFFFF,
            FailCause::Unknown => 0x10000,
            FailCause::RadioNotAvailable => 0x10001,
            FailCause::UnacceptableNetworkParameter => 0x10002,
            FailCause::ConnectionToDatacallLost => 0x10003,
            FailCause::LostConnection => 0x10004,
            FailCause::Reset => 0x10005,
        }
    }

    /// Failures that retrying will not fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            FailCause::OperatorBarred
                | FailCause::MissingUnknownApn
                | FailCause::UnknownPdpAddressType
                | FailCause::UserAuthentication
                | FailCause::ActivationRejectGgsn
                | FailCause::ServiceOptionNotSupported
                | FailCause::ServiceOptionNotSubscribed
                | FailCause::NsapiInUse
                | FailCause::OnlyIpv4Allowed
                | FailCause::OnlyIpv6Allowed
                | FailCause::ProtocolErrors
        )
    }

    /// Failures worth recording in the event log.
    pub fn is_loggable(&self) -> bool {
        matches!(
            self,
            FailCause::OperatorBarred
                | FailCause::InsufficientResources
                | FailCause::UnknownPdpAddressType
                | FailCause::UserAuthentication
                | FailCause::ActivationRejectGgsn
                | FailCause::ActivationRejectUnspecified
                | FailCause::ServiceOptionNotSubscribed
                | FailCause::ServiceOptionNotSupported
                | FailCause::ServiceOptionOutOfOrder
                | FailCause::NsapiInUse
                | FailCause::ProtocolErrors
                | FailCause::UnacceptableNetworkParameter
        )
    }

    pub fn retry_disposition(&self) -> RetryDisposition {
        if *self == FailCause::RadioNotAvailable {
            RetryDisposition::RadioUnavailable
        } else if self.is_permanent() {
            RetryDisposition::NoRetry
        } else {
            RetryDisposition::Retry
        }
    }

    pub fn is_success(&self) -> bool {
        *self == FailCause::None
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailCause::None => "NONE",
            FailCause::OperatorBarred => "OPERATOR_BARRED",
            FailCause::InsufficientResources => "INSUFFICIENT_RESOURCES",
            FailCause::MissingUnknownApn => "MISSING_UNKNOWN_APN",
            FailCause::UnknownPdpAddressType => "UNKNOWN_PDP_ADDRESS_TYPE",
            FailCause::UserAuthentication => "USER_AUTHENTICATION",
            FailCause::ActivationRejectGgsn => "ACTIVATION_REJECT_GGSN",
            FailCause::ActivationRejectUnspecified => "ACTIVATION_REJECT_UNSPECIFIED",
            FailCause::ServiceOptionNotSupported => "SERVICE_OPTION_NOT_SUPPORTED",
            FailCause::ServiceOptionNotSubscribed => "SERVICE_OPTION_NOT_SUBSCRIBED",
            FailCause::ServiceOptionOutOfOrder => "SERVICE_OPTION_OUT_OF_ORDER",
            FailCause::NsapiInUse => "NSAPI_IN_USE",
            FailCause::OnlyIpv4Allowed => "ONLY_IPV4_ALLOWED",
            FailCause::OnlyIpv6Allowed => "ONLY_IPV6_ALLOWED",
            FailCause::OnlySingleBearerAllowed => "ONLY_SINGLE_BEARER_ALLOWED",
            FailCause::ProtocolErrors => "PROTOCOL_ERRORS",
            FailCause::RegistrationFail => "REGISTRATION_FAIL",
            FailCause::GprsRegistrationFail => "GPRS_REGISTRATION_FAIL",
            FailCause::SignalLost => "SIGNAL_LOST",
            FailCause::PrefRadioTechChanged => "PREF_RADIO_TECH_CHANGED",
            FailCause::RadioPowerOff => "RADIO_POWER_OFF",
            FailCause::TetheredCallActive => "TETHERED_CALL_ACTIVE",
            FailCause::ErrorUnspecified => "ERROR_UNSPECIFIED",
            FailCause::Unknown => "UNKNOWN",
            FailCause::RadioNotAvailable => "RADIO_NOT_AVAILABLE",
            FailCause::UnacceptableNetworkParameter => "UNACCEPTABLE_NETWORK_PARAMETER",
            FailCause::ConnectionToDatacallLost => "CONNECTION_TO_DATACALL_LOST",
            FailCause::LostConnection => "LOST_CONNECTION",
            FailCause::Reset => "RESET_BY_FRAMEWORK",
        }
    }
}

impl fmt::Display for FailCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
