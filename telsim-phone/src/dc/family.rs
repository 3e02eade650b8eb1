//! Network family capabilities
//!
//! The bearer state machine is family-agnostic; everything that differs
//! between 3GPP and 3GPP2 data calls goes through [`NetworkFamily`].

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use telsim_common::{ApnType, AuthType, NetworkFamilyKind, PdpProtocol, RadioTechnology};
use telsim_ril::SetupDataCallParams;

use super::apn::ApnSetting;
use super::fail_cause::FailCause;

/// Default data profile
pub const DATA_PROFILE_DEFAULT: u32 = 0;
/// Data profile for tethered (DUN) calls
pub const DATA_PROFILE_TETHERED: u32 = 1;

/// Family-specific behaviour of data calls.
pub trait NetworkFamily: Send + Sync + fmt::Debug {
    fn kind(&self) -> NetworkFamilyKind;

    /// Builds the setup request for an access point.
    fn setup_params(
        &self,
        apn: &ApnSetting,
        rat: RadioTechnology,
        roaming: bool,
    ) -> SetupDataCallParams;

    /// Whether the DNS servers returned for a call are usable.
    fn is_dns_acceptable(&self, apn: &ApnSetting, servers: &[IpAddr]) -> bool;

    fn classify_failure(&self, code: i32) -> FailCause {
        FailCause::from_code(code)
    }
}

/// True when no usable server was returned.
fn all_unspecified(servers: &[IpAddr]) -> bool {
    servers.iter().all(|s| s.is_unspecified())
}

/// 3GPP data calls.
#[derive(Debug, Default)]
pub struct GsmFamily;

impl NetworkFamily for GsmFamily {
    fn kind(&self) -> NetworkFamilyKind {
        NetworkFamilyKind::Gsm
    }

    fn setup_params(
        &self,
        apn: &ApnSetting,
        rat: RadioTechnology,
        roaming: bool,
    ) -> SetupDataCallParams {
        let auth_type = match apn.auth_type {
            AuthType::None if apn.user.as_deref().is_some_and(|u| !u.is_empty()) => {
                AuthType::PapOrChap
            }
            other => other,
        };
        SetupDataCallParams {
            radio_tech: rat,
            profile: DATA_PROFILE_DEFAULT,
            apn: apn.apn.clone(),
            user: apn.user.clone(),
            password: apn.password.clone(),
            auth_type: auth_type.code(),
            protocol: apn.protocol_for(roaming).as_str().to_string(),
        }
    }

    /// Some modems leave DNS empty; that is only tolerated for an MMS-only
    /// access point whose proxy is an IP literal.
    fn is_dns_acceptable(&self, apn: &ApnSetting, servers: &[IpAddr]) -> bool {
        if !all_unspecified(servers) {
            return true;
        }
        apn.types.first() == Some(&ApnType::Mms)
            && apn
                .mms_proxy
                .as_deref()
                .is_some_and(|p| p.trim().parse::<IpAddr>().is_ok())
    }
}

/// 3GPP2 data calls.
#[derive(Debug, Default)]
pub struct CdmaFamily;

impl NetworkFamily for CdmaFamily {
    fn kind(&self) -> NetworkFamilyKind {
        NetworkFamilyKind::Cdma
    }

    fn setup_params(
        &self,
        apn: &ApnSetting,
        rat: RadioTechnology,
        _roaming: bool,
    ) -> SetupDataCallParams {
        let profile = if apn.can_handle_type(ApnType::Dun) {
            DATA_PROFILE_TETHERED
        } else {
            DATA_PROFILE_DEFAULT
        };
        SetupDataCallParams {
            radio_tech: rat,
            profile,
            apn: String::new(),
            user: None,
            password: None,
            auth_type: AuthType::PapOrChap.code(),
            protocol: PdpProtocol::Ip.as_str().to_string(),
        }
    }

    fn is_dns_acceptable(&self, _apn: &ApnSetting, servers: &[IpAddr]) -> bool {
        !all_unspecified(servers)
    }
}

/// Returns the capability object for a configured family.
pub fn family_for(kind: NetworkFamilyKind) -> Arc<dyn NetworkFamily> {
    match kind {
        NetworkFamilyKind::Gsm => Arc::new(GsmFamily),
        NetworkFamilyKind::Cdma => Arc::new(CdmaFamily),
    }
}
