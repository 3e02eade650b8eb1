//! Registration edge notifications

use std::fmt;

use telsim_common::RadioTechnology;
use telsim_ril::OperatorInfo;

/// Published when the registration snapshot changes in a way listeners care
/// about. Each fires once per transition, never on an unchanged poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    /// Voice domain went into service
    NetworkAttached,
    DataAttached,
    DataDetached,
    RoamingOn,
    RoamingOff,
    RadioTechChanged(RadioTechnology),
    OperatorChanged(OperatorInfo),
    PsRestrictedEnabled,
    PsRestrictedDisabled,
}

impl fmt::Display for RegistrationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationEvent::NetworkAttached => write!(f, "NETWORK_ATTACHED"),
            RegistrationEvent::DataAttached => write!(f, "DATA_ATTACHED"),
            RegistrationEvent::DataDetached => write!(f, "DATA_DETACHED"),
            RegistrationEvent::RoamingOn => write!(f, "ROAMING_ON"),
            RegistrationEvent::RoamingOff => write!(f, "ROAMING_OFF"),
            RegistrationEvent::RadioTechChanged(rat) => write!(f, "RADIO_TECH_CHANGED({rat})"),
            RegistrationEvent::OperatorChanged(op) => write!(
                f,
                "OPERATOR_CHANGED({})",
                op.numeric.as_deref().unwrap_or("-")
            ),
            RegistrationEvent::PsRestrictedEnabled => write!(f, "PS_RESTRICTED_ENABLED"),
            RegistrationEvent::PsRestrictedDisabled => write!(f, "PS_RESTRICTED_DISABLED"),
        }
    }
}
