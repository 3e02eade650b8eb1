//! Test fixtures and configuration helpers
//!
//! Provides pre-configured phone setups for the scenario tests.

use telsim_common::{
    ApnConfig, ApnType, AuthType, PdpProtocol, PhoneConfig, Plmn, RadioConfig, RadioTechnology,
    SimRegistration,
};

/// Retry schedule short enough for tests to walk through
pub const FAST_RETRY_CONFIG: &str = "max_retries=3,50,100,200";

/// Builder for phone configurations used by the tests.
#[derive(Debug, Clone)]
pub struct TestPhoneConfig {
    config: PhoneConfig,
}

impl Default for TestPhoneConfig {
    fn default() -> Self {
        let config = PhoneConfig {
            home_plmn: Plmn::new(1, 1, false),
            apns: vec![apn("internet", &[ApnType::Default, ApnType::Supl, ApnType::Hipri])],
            enabled_apn_types: vec![ApnType::Default],
            retry_config: FAST_RETRY_CONFIG.to_string(),
            power_off_timeout_ms: 2_000,
            signal_poll_interval_ms: 200,
            radio: RadioConfig {
                response_delay_ms: 5,
                ..RadioConfig::default()
            },
            ..PhoneConfig::default()
        };
        Self { config }
    }
}

impl TestPhoneConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an MMS-only access point and enables the MMS type.
    pub fn with_mms(mut self) -> Self {
        self.config.apns.push(apn("mms", &[ApnType::Mms]));
        self.config.enabled_apn_types.push(ApnType::Mms);
        self
    }

    /// Failure causes the radio answers the first setups with.
    pub fn with_setup_failures(mut self, causes: &[i32]) -> Self {
        self.config.radio.setup_failures = causes.to_vec();
        self
    }

    /// Radio that needs a follow-up query for the failure cause.
    pub fn without_inline_fail_cause(mut self) -> Self {
        self.config.radio.inline_fail_cause = false;
        self
    }

    /// Registration status the radio reports for both domains.
    pub fn with_registration(mut self, status: u8) -> Self {
        self.config.radio.voice_registration = SimRegistration {
            status,
            rat: RadioTechnology::Lte,
        };
        self.config.radio.data_registration = SimRegistration {
            status,
            rat: RadioTechnology::Lte,
        };
        self
    }

    pub fn with_roaming_allowed(mut self, allowed: bool) -> Self {
        self.config.data_roaming_enabled = allowed;
        self
    }

    pub fn with_unsolicited_signal(mut self) -> Self {
        self.config.radio.unsolicited_signal = true;
        self
    }

    pub fn with_power_off_timeout_ms(mut self, ms: u64) -> Self {
        self.config.power_off_timeout_ms = ms;
        self
    }

    pub fn build(self) -> PhoneConfig {
        self.config
    }
}

fn apn(name: &str, types: &[ApnType]) -> ApnConfig {
    ApnConfig {
        carrier: "Test".to_string(),
        apn: name.to_string(),
        types: types.to_vec(),
        user: None,
        password: None,
        auth_type: AuthType::None,
        protocol: PdpProtocol::Ip,
        roaming_protocol: PdpProtocol::Ip,
        mms_proxy: None,
        bearer: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telsim_phone::app::validate_phone_config;

    #[test]
    fn test_default_fixture_is_valid() {
        assert!(validate_phone_config(&TestPhoneConfig::new().build()).is_ok());
    }

    #[test]
    fn test_mms_fixture_is_valid() {
        let config = TestPhoneConfig::new().with_mms().build();
        assert_eq!(config.apns.len(), 2);
        assert!(validate_phone_config(&config).is_ok());
    }
}
