//! Configuration structures for the phone and its simulated radio
//!
//! The phone configuration lists the APN settings provisioned on the device,
//! which APN types are requested at start-up, data/roaming switches, retry
//! schedule, and the timing knobs of the registration tracker. The radio
//! section drives the simulated radio interface layer.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ApnType, Plmn, RadioTechnology};

/// Default retry schedule for bearer setup, in the radio stack's retry string format.
pub const DEFAULT_DATA_RETRY_CONFIG: &str = "default_randomization=2000,\
5000,10000,20000,40000,80000:5000,160000:5000,320000:5000,640000:5000,1280000:5000,1800000:5000";

/// Default time to wait for data teardown before powering the radio off.
pub const DEFAULT_POWER_OFF_TIMEOUT_MS: u64 = 30_000;

/// Default interval between signal strength polls.
pub const DEFAULT_SIGNAL_POLL_INTERVAL_MS: u64 = 20_000;

/// Default number of bearers the modem can hold at once.
pub const DEFAULT_MAX_BEARERS: usize = 4;

/// Which network family's data-call conventions apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkFamilyKind {
    /// 3GPP (GPRS/UMTS/LTE)
    #[default]
    Gsm,
    /// 3GPP2 (1x/EvDo/eHRPD)
    Cdma,
}

/// PDP authentication type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    None,
    Pap,
    Chap,
    PapOrChap,
}

impl AuthType {
    /// Value passed to the radio in setup requests.
    pub fn code(&self) -> u8 {
        match self {
            AuthType::None => 0,
            AuthType::Pap => 1,
            AuthType::Chap => 2,
            AuthType::PapOrChap => 3,
        }
    }
}

/// PDP protocol requested for a bearer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdpProtocol {
    #[default]
    Ip,
    Ipv6,
    Ipv4v6,
}

impl PdpProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdpProtocol::Ip => "IP",
            PdpProtocol::Ipv6 => "IPV6",
            PdpProtocol::Ipv4v6 => "IPV4V6",
        }
    }
}

/// One provisioned access point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApnConfig {
    /// Human readable carrier label
    #[serde(default)]
    pub carrier: String,
    /// Access point name sent to the network
    pub apn: String,
    /// APN types served by this access point
    pub types: Vec<ApnType>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(default)]
    pub protocol: PdpProtocol,
    #[serde(default)]
    pub roaming_protocol: PdpProtocol,
    /// MMS proxy, used to relax DNS checks for MMS-only access points
    #[serde(default)]
    pub mms_proxy: Option<String>,
    /// Restrict this access point to one radio technology
    #[serde(default)]
    pub bearer: Option<RadioTechnology>,
}

/// Registration answer the simulated radio reports for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimRegistration {
    /// 27.007 registration status (0 not registered, 1 home, 2 searching, 3 denied, 5 roaming)
    pub status: u8,
    /// Radio technology code
    #[serde(default)]
    pub rat: RadioTechnology,
}

impl Default for SimRegistration {
    fn default() -> Self {
        Self {
            status: 1,
            rat: RadioTechnology::Lte,
        }
    }
}

/// Behaviour of the simulated radio interface layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Whether failed setup responses embed the failure cause
    #[serde(default = "default_true")]
    pub inline_fail_cause: bool,
    /// Whether the radio pushes signal strength on its own
    #[serde(default)]
    pub unsolicited_signal: bool,
    /// Delay applied to every response
    #[serde(default = "default_response_delay_ms")]
    pub response_delay_ms: u64,
    #[serde(default)]
    pub voice_registration: SimRegistration,
    #[serde(default)]
    pub data_registration: SimRegistration,
    /// Operator long name, short name and numeric identity
    #[serde(default = "default_operator")]
    pub operator: (String, String, String),
    /// Failure causes returned by successive setup requests before setups succeed
    #[serde(default)]
    pub setup_failures: Vec<i32>,
    /// Signal strength (GSM rssi 0-31, 99 unknown)
    #[serde(default = "default_rssi")]
    pub rssi: i32,
}

fn default_true() -> bool {
    true
}

fn default_response_delay_ms() -> u64 {
    20
}

fn default_operator() -> (String, String, String) {
    ("Test Network".to_string(), "Test".to_string(), "00101".to_string())
}

fn default_rssi() -> i32 {
    20
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            inline_fail_cause: true,
            unsolicited_signal: false,
            response_delay_ms: default_response_delay_ms(),
            voice_registration: SimRegistration::default(),
            data_registration: SimRegistration::default(),
            operator: default_operator(),
            setup_failures: Vec::new(),
            rssi: default_rssi(),
        }
    }
}

/// Phone configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneConfig {
    /// Home network, used to detect roaming when the radio does not flag it
    pub home_plmn: Plmn,
    #[serde(default)]
    pub network_family: NetworkFamilyKind,
    /// Provisioned access points
    #[serde(default)]
    pub apns: Vec<ApnConfig>,
    /// APN types requested as soon as the phone starts
    #[serde(default = "default_enabled_apn_types")]
    pub enabled_apn_types: Vec<ApnType>,
    #[serde(default = "default_true")]
    pub data_enabled: bool,
    #[serde(default)]
    pub data_roaming_enabled: bool,
    #[serde(default = "default_max_bearers")]
    pub max_bearers: usize,
    /// Bearer setup retry schedule
    #[serde(default = "default_retry_config")]
    pub retry_config: String,
    #[serde(default = "default_power_off_timeout_ms")]
    pub power_off_timeout_ms: u64,
    #[serde(default = "default_signal_poll_interval_ms")]
    pub signal_poll_interval_ms: u64,
    /// Whether the radio should be powered on at start-up
    #[serde(default = "default_true")]
    pub desired_radio_power: bool,
    #[serde(default)]
    pub radio: RadioConfig,
}

fn default_enabled_apn_types() -> Vec<ApnType> {
    vec![ApnType::Default]
}

fn default_max_bearers() -> usize {
    DEFAULT_MAX_BEARERS
}

fn default_retry_config() -> String {
    DEFAULT_DATA_RETRY_CONFIG.to_string()
}

fn default_power_off_timeout_ms() -> u64 {
    DEFAULT_POWER_OFF_TIMEOUT_MS
}

fn default_signal_poll_interval_ms() -> u64 {
    DEFAULT_SIGNAL_POLL_INTERVAL_MS
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            home_plmn: Plmn::new(1, 1, false),
            network_family: NetworkFamilyKind::Gsm,
            apns: vec![ApnConfig {
                carrier: "Test".to_string(),
                apn: "internet".to_string(),
                types: vec![ApnType::Default, ApnType::Supl, ApnType::Hipri],
                user: None,
                password: None,
                auth_type: AuthType::None,
                protocol: PdpProtocol::Ip,
                roaming_protocol: PdpProtocol::Ip,
                mms_proxy: None,
                bearer: None,
            }],
            enabled_apn_types: default_enabled_apn_types(),
            data_enabled: true,
            data_roaming_enabled: false,
            max_bearers: DEFAULT_MAX_BEARERS,
            retry_config: default_retry_config(),
            power_off_timeout_ms: DEFAULT_POWER_OFF_TIMEOUT_MS,
            signal_poll_interval_ms: DEFAULT_SIGNAL_POLL_INTERVAL_MS,
            desired_radio_power: true,
            radio: RadioConfig::default(),
        }
    }
}

impl PhoneConfig {
    /// Parses a phone configuration from a YAML string.
    ///
    /// # Example
    /// ```
    /// use telsim_common::PhoneConfig;
    ///
    /// let yaml = r#"
    /// home_plmn:
    ///   mcc: 310
    ///   mnc: 410
    ///   long_mnc: true
    /// apns:
    ///   - apn: internet
    ///     types: [default, supl]
    /// "#;
    ///
    /// let config = PhoneConfig::from_yaml(yaml).unwrap();
    /// assert_eq!(config.apns.len(), 1);
    /// assert!(config.data_enabled);
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Loads a phone configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Serializes the configuration to a YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
