//! Shared network types
//!
//! PLMN identity, service state, radio access technology and APN types used
//! by the radio interface layer and by the phone state machines.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Public Land Mobile Network identity.
///
/// - MCC (Mobile Country Code): 3 decimal digits (001-999)
/// - MNC (Mobile Network Code): 2 or 3 decimal digits
///
/// The `long_mnc` field indicates whether the MNC uses 3 digits (true) or 2 digits (false).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Plmn {
    /// Mobile Country Code (3 digits, range 0-999)
    pub mcc: u16,
    /// Mobile Network Code (2-3 digits, range 0-999)
    pub mnc: u16,
    /// True if MNC is 3 digits, false if 2 digits
    pub long_mnc: bool,
}

impl Plmn {
    /// Creates a new PLMN with the given MCC and MNC.
    pub const fn new(mcc: u16, mnc: u16, long_mnc: bool) -> Self {
        Self { mcc, mnc, long_mnc }
    }

    /// Returns true if this PLMN has valid values set.
    pub fn has_value(&self) -> bool {
        self.mcc > 0 || self.mnc > 0
    }

    /// Parses the numeric operator form reported by the radio ("310410", "23415").
    ///
    /// Returns `None` unless the string is 5 or 6 ASCII digits.
    pub fn from_numeric(numeric: &str) -> Option<Self> {
        if !(5..=6).contains(&numeric.len()) || !numeric.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let mcc = numeric[..3].parse().ok()?;
        let mnc = numeric[3..].parse().ok()?;
        Some(Self::new(mcc, mnc, numeric.len() == 6))
    }
}

impl fmt::Debug for Plmn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.long_mnc {
            write!(f, "Plmn({:03}-{:03})", self.mcc, self.mnc)
        } else {
            write!(f, "Plmn({:03}-{:02})", self.mcc, self.mnc)
        }
    }
}

impl fmt::Display for Plmn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.long_mnc {
            write!(f, "{:03}{:03}", self.mcc, self.mnc)
        } else {
            write!(f, "{:03}{:02}", self.mcc, self.mnc)
        }
    }
}

/// Registration service state of the voice or packet domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ServiceState {
    /// Registered on a network (home or roaming)
    InService,
    /// Not registered, searching or denied
    #[default]
    OutOfService,
    /// Only emergency calls are possible
    EmergencyOnly,
    /// Radio is explicitly powered off
    PowerOff,
}

impl ServiceState {
    /// Returns true if the domain is registered.
    pub fn is_in_service(&self) -> bool {
        matches!(self, ServiceState::InService)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::InService => write!(f, "IN_SERVICE"),
            ServiceState::OutOfService => write!(f, "OUT_OF_SERVICE"),
            ServiceState::EmergencyOnly => write!(f, "EMERGENCY_ONLY"),
            ServiceState::PowerOff => write!(f, "POWER_OFF"),
        }
    }
}

/// Radio access technology reported in registration responses.
///
/// Numeric values follow the radio interface layer's `RADIO_TECH_*` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RadioTechnology {
    #[default]
    Unknown,
    Gprs,
    Edge,
    Umts,
    Is95A,
    Is95B,
    OneXRtt,
    Evdo0,
    EvdoA,
    Hsdpa,
    Hsupa,
    Hspa,
    EvdoB,
    Ehrpd,
    Lte,
    HspaPlus,
    Nr,
}

impl RadioTechnology {
    /// Maps a `RADIO_TECH_*` code; unknown codes map to `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => RadioTechnology::Gprs,
            2 => RadioTechnology::Edge,
            3 => RadioTechnology::Umts,
            4 => RadioTechnology::Is95A,
            5 => RadioTechnology::Is95B,
            6 => RadioTechnology::OneXRtt,
            7 => RadioTechnology::Evdo0,
            8 => RadioTechnology::EvdoA,
            9 => RadioTechnology::Hsdpa,
            10 => RadioTechnology::Hsupa,
            11 => RadioTechnology::Hspa,
            12 => RadioTechnology::EvdoB,
            13 => RadioTechnology::Ehrpd,
            14 => RadioTechnology::Lte,
            15 => RadioTechnology::HspaPlus,
            20 => RadioTechnology::Nr,
            _ => RadioTechnology::Unknown,
        }
    }

    /// Returns the `RADIO_TECH_*` code.
    pub fn code(&self) -> i32 {
        match self {
            RadioTechnology::Unknown => 0,
            RadioTechnology::Gprs => 1,
            RadioTechnology::Edge => 2,
            RadioTechnology::Umts => 3,
            RadioTechnology::Is95A => 4,
            RadioTechnology::Is95B => 5,
            RadioTechnology::OneXRtt => 6,
            RadioTechnology::Evdo0 => 7,
            RadioTechnology::EvdoA => 8,
            RadioTechnology::Hsdpa => 9,
            RadioTechnology::Hsupa => 10,
            RadioTechnology::Hspa => 11,
            RadioTechnology::EvdoB => 12,
            RadioTechnology::Ehrpd => 13,
            RadioTechnology::Lte => 14,
            RadioTechnology::HspaPlus => 15,
            RadioTechnology::Nr => 20,
        }
    }

    /// True for the 3GPP2 family.
    pub fn is_cdma(&self) -> bool {
        matches!(
            self,
            RadioTechnology::Is95A
                | RadioTechnology::Is95B
                | RadioTechnology::OneXRtt
                | RadioTechnology::Evdo0
                | RadioTechnology::EvdoA
                | RadioTechnology::EvdoB
                | RadioTechnology::Ehrpd
        )
    }
}

impl fmt::Display for RadioTechnology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RadioTechnology::Unknown => "Unknown",
            RadioTechnology::Gprs => "GPRS",
            RadioTechnology::Edge => "EDGE",
            RadioTechnology::Umts => "UMTS",
            RadioTechnology::Is95A => "IS95A",
            RadioTechnology::Is95B => "IS95B",
            RadioTechnology::OneXRtt => "1xRTT",
            RadioTechnology::Evdo0 => "EvDo-rev.0",
            RadioTechnology::EvdoA => "EvDo-rev.A",
            RadioTechnology::Hsdpa => "HSDPA",
            RadioTechnology::Hsupa => "HSUPA",
            RadioTechnology::Hspa => "HSPA",
            RadioTechnology::EvdoB => "EvDo-rev.B",
            RadioTechnology::Ehrpd => "eHRPD",
            RadioTechnology::Lte => "LTE",
            RadioTechnology::HspaPlus => "HSPAP",
            RadioTechnology::Nr => "NR",
        };
        write!(f, "{name}")
    }
}

/// Power state of the modem as reported by the radio interface layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RadioState {
    /// Radio is powered off
    Off,
    /// Radio is not reachable (modem reset, not yet connected)
    #[default]
    Unavailable,
    /// Radio is powered on
    On,
}

impl RadioState {
    pub fn is_on(&self) -> bool {
        matches!(self, RadioState::On)
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, RadioState::Unavailable)
    }
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioState::Off => write!(f, "RADIO_OFF"),
            RadioState::Unavailable => write!(f, "RADIO_UNAVAILABLE"),
            RadioState::On => write!(f, "RADIO_ON"),
        }
    }
}

/// Class of network usage requested by a client (the "APN type").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApnType {
    Default,
    Mms,
    Supl,
    Dun,
    Hipri,
    Fota,
    Ims,
    Cbs,
}

impl ApnType {
    pub const ALL: [ApnType; 8] = [
        ApnType::Default,
        ApnType::Mms,
        ApnType::Supl,
        ApnType::Dun,
        ApnType::Hipri,
        ApnType::Fota,
        ApnType::Ims,
        ApnType::Cbs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApnType::Default => "default",
            ApnType::Mms => "mms",
            ApnType::Supl => "supl",
            ApnType::Dun => "dun",
            ApnType::Hipri => "hipri",
            ApnType::Fota => "fota",
            ApnType::Ims => "ims",
            ApnType::Cbs => "cbs",
        }
    }
}

impl fmt::Display for ApnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ApnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApnType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown APN type: {s}"))
    }
}
