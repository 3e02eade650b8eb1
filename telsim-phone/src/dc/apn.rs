//! Access point settings and per-type APN contexts
//!
//! An [`ApnSetting`] is one provisioned access point. An [`ApnContext`] is the
//! registry's record of one requested APN type: whether it is wanted, which
//! settings are still worth trying, and which bearer currently serves it.

use std::fmt;

use telsim_common::{ApnConfig, ApnType, AuthType, PdpProtocol, RadioTechnology};
use telsim_ril::BearerId;

/// A provisioned access point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApnSetting {
    /// Index in the provisioned list
    pub id: u32,
    pub carrier: String,
    pub apn: String,
    pub types: Vec<ApnType>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub auth_type: AuthType,
    pub protocol: PdpProtocol,
    pub roaming_protocol: PdpProtocol,
    pub mms_proxy: Option<String>,
    /// Radio technology restriction, `None` for any
    pub bearer: Option<RadioTechnology>,
}

impl ApnSetting {
    pub fn from_config(id: u32, config: &ApnConfig) -> Self {
        Self {
            id,
            carrier: config.carrier.clone(),
            apn: config.apn.clone(),
            types: config.types.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            auth_type: config.auth_type,
            protocol: config.protocol,
            roaming_protocol: config.roaming_protocol,
            mms_proxy: config.mms_proxy.clone(),
            bearer: config.bearer,
        }
    }

    /// True when this access point can serve the given type.
    ///
    /// A default access point also serves high-priority requests.
    pub fn can_handle_type(&self, apn_type: ApnType) -> bool {
        self.types
            .iter()
            .any(|t| *t == apn_type || (*t == ApnType::Default && apn_type == ApnType::Hipri))
    }

    /// True when the access point may be used on the given radio technology.
    pub fn matches_rat(&self, rat: RadioTechnology) -> bool {
        self.bearer.map_or(true, |b| b == rat)
    }

    /// Protocol to request, depending on whether the phone is roaming.
    pub fn protocol_for(&self, roaming: bool) -> PdpProtocol {
        if roaming {
            self.roaming_protocol
        } else {
            self.protocol
        }
    }
}

impl fmt::Display for ApnSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<&str> = self.types.iter().map(|t| t.as_str()).collect();
        write!(f, "[ApnSetting] {}, {}, {}, {}", self.id, self.carrier, self.apn, types.join("|"))
    }
}

/// Connection state of an APN context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApnContextState {
    #[default]
    Idle,
    /// Bring-up in progress
    Connecting,
    /// Waiting for the next retry after a failed attempt
    Scanning,
    Connected,
    Disconnecting,
    /// Every candidate access point failed permanently
    Failed,
}

impl fmt::Display for ApnContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApnContextState::Idle => write!(f, "IDLE"),
            ApnContextState::Connecting => write!(f, "CONNECTING"),
            ApnContextState::Scanning => write!(f, "SCANNING"),
            ApnContextState::Connected => write!(f, "CONNECTED"),
            ApnContextState::Disconnecting => write!(f, "DISCONNECTING"),
            ApnContextState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Registry record of one requested APN type.
#[derive(Debug, Clone)]
pub struct ApnContext {
    pub apn_type: ApnType,
    /// Reason of the last state change request
    pub reason: String,
    pub state: ApnContextState,
    pub enabled: bool,
    /// Bearer currently serving this context
    pub bearer: Option<BearerId>,
    /// Candidate access points, in preference order
    pub waiting_apns: Vec<ApnSetting>,
    /// Access point of the current or last attempt
    pub active_apn: Option<ApnSetting>,
    /// Bumped whenever a scheduled reconnect must be invalidated
    pub generation: u32,
}

impl ApnContext {
    pub fn new(apn_type: ApnType) -> Self {
        Self {
            apn_type,
            reason: String::new(),
            state: ApnContextState::Idle,
            enabled: false,
            bearer: None,
            waiting_apns: Vec::new(),
            active_apn: None,
            generation: 0,
        }
    }

    /// Enabled and not already being served.
    pub fn is_ready_for_setup(&self) -> bool {
        self.enabled
            && matches!(
                self.state,
                ApnContextState::Idle | ApnContextState::Scanning | ApnContextState::Failed
            )
    }

    /// Not connected and nothing in flight.
    pub fn is_disconnected(&self) -> bool {
        matches!(self.state, ApnContextState::Idle | ApnContextState::Failed)
    }

    pub fn set_state(&mut self, state: ApnContextState) {
        if self.state != state {
            tracing::debug!("ApnContext {}: {} -> {}", self.apn_type, self.state, state);
            self.state = state;
        }
    }

    /// Drops a candidate after a permanent failure. Returns true if any remain.
    pub fn remove_waiting_apn(&mut self, id: u32) -> bool {
        self.waiting_apns.retain(|a| a.id != id);
        !self.waiting_apns.is_empty()
    }

    /// Invalidates any scheduled reconnect.
    pub fn bump_generation(&mut self) -> u32 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setting(id: u32, types: Vec<ApnType>) -> ApnSetting {
        ApnSetting {
            id,
            carrier: "Test".to_string(),
            apn: format!("apn{id}"),
            types,
            user: None,
            password: None,
            auth_type: AuthType::None,
            protocol: PdpProtocol::Ip,
            roaming_protocol: PdpProtocol::Ipv4v6,
            mms_proxy: None,
            bearer: None,
        }
    }

    #[test]
    fn test_can_handle_type() {
        let apn = setting(0, vec![ApnType::Default, ApnType::Supl]);
        assert!(apn.can_handle_type(ApnType::Default));
        assert!(apn.can_handle_type(ApnType::Supl));
        assert!(apn.can_handle_type(ApnType::Hipri));
        assert!(!apn.can_handle_type(ApnType::Mms));

        let mms = setting(1, vec![ApnType::Mms]);
        assert!(!mms.can_handle_type(ApnType::Hipri));
    }

    #[test]
    fn test_matches_rat_and_protocol() {
        let mut apn = setting(0, vec![ApnType::Default]);
        assert!(apn.matches_rat(RadioTechnology::Umts));
        apn.bearer = Some(RadioTechnology::Lte);
        assert!(apn.matches_rat(RadioTechnology::Lte));
        assert!(!apn.matches_rat(RadioTechnology::Umts));
        assert_eq!(apn.protocol_for(false), PdpProtocol::Ip);
        assert_eq!(apn.protocol_for(true), PdpProtocol::Ipv4v6);
    }

    #[test]
    fn test_context_readiness() {
        let mut ctx = ApnContext::new(ApnType::Default);
        assert!(!ctx.is_ready_for_setup());
        ctx.enabled = true;
        assert!(ctx.is_ready_for_setup());
        ctx.set_state(ApnContextState::Connecting);
        assert!(!ctx.is_ready_for_setup());
        ctx.set_state(ApnContextState::Scanning);
        assert!(ctx.is_ready_for_setup());
        assert!(!ctx.is_disconnected());
    }

    #[test]
    fn test_remove_waiting_apn() {
        let mut ctx = ApnContext::new(ApnType::Default);
        ctx.waiting_apns = vec![
            setting(0, vec![ApnType::Default]),
            setting(1, vec![ApnType::Default]),
        ];
        assert!(ctx.remove_waiting_apn(0));
        assert_eq!(ctx.waiting_apns[0].id, 1);
        assert!(!ctx.remove_waiting_apn(1));
    }

    #[test]
    fn test_from_config() {
        let config = telsim_common::PhoneConfig::default();
        let apn = ApnSetting::from_config(3, &config.apns[0]);
        assert_eq!(apn.id, 3);
        assert_eq!(apn.apn, "internet");
        assert!(apn.to_string().contains("default|supl|hipri"));
    }
}
