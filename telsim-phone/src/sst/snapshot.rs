//! Registration snapshot
//!
//! Everything a poll cycle learns about the network, merged into one value.
//! The tracker fills a pending snapshot and swaps it in once the cycle is
//! complete; edges are derived by comparing the two.

use std::fmt;

use telsim_common::{Plmn, RadioTechnology, ServiceState};
use telsim_ril::{OperatorInfo, RegistrationState};

/// Registration status codes at or above this value report emergency-only
/// service.
const EMERGENCY_STATUS_BASE: u8 = 10;

/// Merged registration state of both domains.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistrationSnapshot {
    pub voice: ServiceState,
    pub data: ServiceState,
    pub roaming: bool,
    /// Data RAT when data is in service, else voice RAT
    pub rat: RadioTechnology,
    pub operator: OperatorInfo,
    /// Concurrent voice and data supported
    pub css_indicator: bool,
    pub manual_selection: bool,
    pub ps_restricted: bool,

    voice_reg: RegistrationState,
    data_reg: RegistrationState,
}

impl RegistrationSnapshot {
    /// Snapshot used while the radio is unavailable.
    pub fn out_of_service() -> Self {
        Self::default()
    }

    /// Snapshot used while the radio is off.
    pub fn power_off() -> Self {
        Self {
            voice: ServiceState::PowerOff,
            data: ServiceState::PowerOff,
            ..Self::default()
        }
    }

    pub fn set_voice_registration(&mut self, reg: RegistrationState) {
        self.voice = service_state_for(&reg);
        self.css_indicator = reg.css_indicator;
        self.voice_reg = reg;
    }

    pub fn set_data_registration(&mut self, reg: RegistrationState) {
        self.data = service_state_for(&reg);
        self.data_reg = reg;
    }

    pub fn voice_registration(&self) -> &RegistrationState {
        &self.voice_reg
    }

    pub fn data_registration(&self) -> &RegistrationState {
        &self.data_reg
    }

    /// Fills in the fields derived from the raw query results.
    ///
    /// Roaming is reported by the registration status or inferred from an
    /// operator whose country code differs from the home network.
    pub fn finalize(&mut self, home: &Plmn) {
        self.rat = if self.data.is_in_service() {
            self.data_reg.rat
        } else {
            self.voice_reg.rat
        };

        let status_roaming = self.voice_reg.is_roaming() || self.data_reg.is_roaming();
        let foreign_mcc = self
            .operator
            .numeric
            .as_deref()
            .and_then(Plmn::from_numeric)
            .is_some_and(|plmn| home.has_value() && plmn.mcc != home.mcc);
        let in_service = self.voice.is_in_service() || self.data.is_in_service();
        self.roaming = in_service && (status_roaming || foreign_mcc);
    }

    pub fn is_in_service(&self) -> bool {
        self.voice.is_in_service()
    }
}

impl fmt::Display for RegistrationSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "voice={} data={} rat={} roaming={} operator={}",
            self.voice,
            self.data,
            self.rat,
            self.roaming,
            self.operator.numeric.as_deref().unwrap_or("-")
        )
    }
}

/// Maps a registration status code to a service state.
pub fn service_state_for(reg: &RegistrationState) -> ServiceState {
    if reg.is_registered() {
        ServiceState::InService
    } else if reg.status >= EMERGENCY_STATUS_BASE {
        ServiceState::EmergencyOnly
    } else {
        ServiceState::OutOfService
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(status: u8, rat: RadioTechnology) -> RegistrationState {
        RegistrationState {
            status,
            rat,
            ..Default::default()
        }
    }

    fn operator(numeric: &str) -> OperatorInfo {
        OperatorInfo {
            long_name: Some("Test Network".to_string()),
            short_name: Some("Test".to_string()),
            numeric: Some(numeric.to_string()),
        }
    }

    #[test]
    fn test_service_state_for() {
        assert_eq!(
            service_state_for(&reg(RegistrationState::HOME, RadioTechnology::Lte)),
            ServiceState::InService
        );
        assert_eq!(
            service_state_for(&reg(RegistrationState::ROAMING, RadioTechnology::Lte)),
            ServiceState::InService
        );
        assert_eq!(
            service_state_for(&reg(RegistrationState::SEARCHING, RadioTechnology::Unknown)),
            ServiceState::OutOfService
        );
        assert_eq!(
            service_state_for(&reg(12, RadioTechnology::Unknown)),
            ServiceState::EmergencyOnly
        );
    }

    #[test]
    fn test_roaming_from_status() {
        let home = Plmn::new(1, 1, false);
        let mut snap = RegistrationSnapshot::default();
        snap.set_voice_registration(reg(RegistrationState::ROAMING, RadioTechnology::Umts));
        snap.operator = operator("00101");
        snap.finalize(&home);
        assert!(snap.roaming);
        assert_eq!(snap.rat, RadioTechnology::Umts);
    }

    #[test]
    fn test_roaming_from_foreign_mcc() {
        let home = Plmn::new(310, 410, true);
        let mut snap = RegistrationSnapshot::default();
        snap.set_voice_registration(reg(RegistrationState::HOME, RadioTechnology::Lte));
        snap.set_data_registration(reg(RegistrationState::HOME, RadioTechnology::Lte));
        snap.operator = operator("23415");
        snap.finalize(&home);
        assert!(snap.roaming);

        snap.operator = operator("310260");
        snap.finalize(&home);
        assert!(!snap.roaming);
    }

    #[test]
    fn test_out_of_service_never_roams() {
        let home = Plmn::new(310, 410, true);
        let mut snap = RegistrationSnapshot::default();
        snap.operator = operator("23415");
        snap.finalize(&home);
        assert!(!snap.roaming);
    }

    #[test]
    fn test_power_off_snapshot() {
        let snap = RegistrationSnapshot::power_off();
        assert_eq!(snap.voice, ServiceState::PowerOff);
        assert_eq!(snap.data, ServiceState::PowerOff);
        assert!(!snap.is_in_service());
        assert_eq!(RegistrationSnapshot::out_of_service().voice, ServiceState::OutOfService);
    }
}
