//! Link properties negotiated for a bearer
//!
//! Built from a radio [`DataCallResponse`]; a bearer replaces its copy
//! wholesale on every successful setup or link update.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use telsim_common::RadioTechnology;
use telsim_ril::DataCallResponse;
use thiserror::Error;

/// Reason a data call response cannot be turned into link properties.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("no addresses assigned")]
    NoAddresses,
    #[error("unparsable address '{0}'")]
    BadAddress(String),
    #[error("unparsable DNS server '{0}'")]
    BadDns(String),
    #[error("unparsable gateway '{0}'")]
    BadGateway(String),
}

/// Address with prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkAddress {
    pub address: IpAddr,
    pub prefix_len: u8,
}

impl LinkAddress {
    /// Parses "a.b.c.d[/len]" or an IPv6 equivalent.
    pub fn parse(s: &str) -> Option<Self> {
        let (addr, len) = match s.split_once('/') {
            Some((a, l)) => (a, Some(l)),
            None => (s, None),
        };
        let address: IpAddr = addr.trim().parse().ok()?;
        let max: u8 = if address.is_ipv4() { 32 } else { 128 };
        let prefix_len = match len {
            Some(l) => l.trim().parse::<u8>().ok().filter(|l| *l <= max)?,
            None => max,
        };
        Some(Self {
            address,
            prefix_len,
        })
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

/// Negotiated network parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkProperties {
    pub interface_name: String,
    pub addresses: Vec<LinkAddress>,
    pub dnses: Vec<IpAddr>,
    pub gateways: Vec<IpAddr>,
    pub mtu: u32,
}

impl LinkProperties {
    /// Builds link properties from a successful data call.
    ///
    /// A response without gateways gets the unspecified address of its
    /// first address family.
    pub fn from_response(response: &DataCallResponse) -> Result<Self, LinkError> {
        let addresses = response
            .addresses
            .iter()
            .map(|a| LinkAddress::parse(a).ok_or_else(|| LinkError::BadAddress(a.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        let first = addresses.first().ok_or(LinkError::NoAddresses)?;

        let dnses = response
            .dnses
            .iter()
            .map(|d| d.trim().parse().map_err(|_| LinkError::BadDns(d.clone())))
            .collect::<Result<Vec<IpAddr>, _>>()?;

        let mut gateways = response
            .gateways
            .iter()
            .map(|g| g.trim().parse().map_err(|_| LinkError::BadGateway(g.clone())))
            .collect::<Result<Vec<IpAddr>, _>>()?;
        if gateways.is_empty() {
            gateways.push(if first.address.is_ipv4() {
                IpAddr::V4(Ipv4Addr::UNSPECIFIED)
            } else {
                IpAddr::V6(Ipv6Addr::UNSPECIFIED)
            });
        }

        Ok(Self {
            interface_name: response.ifname.clone(),
            addresses,
            dnses,
            gateways,
            mtu: response.mtu,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl fmt::Display for LinkProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addrs: Vec<String> = self.addresses.iter().map(|a| a.to_string()).collect();
        write!(
            f,
            "{{iface={} addrs=[{}] dns={:?} gw={:?} mtu={}}}",
            self.interface_name,
            addrs.join(","),
            self.dnses,
            self.gateways,
            self.mtu
        )
    }
}

/// Capabilities advertised for an active bearer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkCapabilities {
    pub radio_tech: RadioTechnology,
    pub roaming: bool,
    pub metered: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(addresses: &[&str], dnses: &[&str], gateways: &[&str]) -> DataCallResponse {
        DataCallResponse {
            cid: 1,
            ifname: "rmnet0".to_string(),
            addresses: addresses.iter().map(|s| s.to_string()).collect(),
            dnses: dnses.iter().map(|s| s.to_string()).collect(),
            gateways: gateways.iter().map(|s| s.to_string()).collect(),
            mtu: 1400,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_address() {
        let a = LinkAddress::parse("10.0.0.2/24").unwrap();
        assert_eq!(a.prefix_len, 24);
        assert_eq!(LinkAddress::parse("10.0.0.2").unwrap().prefix_len, 32);
        assert_eq!(LinkAddress::parse("2001:db8::1").unwrap().prefix_len, 128);
        assert!(LinkAddress::parse("10.0.0.2/33").is_none());
        assert!(LinkAddress::parse("not-an-ip").is_none());
    }

    #[test]
    fn test_from_response() {
        let lp =
            LinkProperties::from_response(&response(&["10.0.0.2/24"], &["8.8.8.8"], &["10.0.0.1"]))
                .unwrap();
        assert_eq!(lp.interface_name, "rmnet0");
        assert_eq!(lp.dnses, vec!["8.8.8.8".parse::<IpAddr>().unwrap()]);
        assert_eq!(lp.mtu, 1400);
        assert!(lp.to_string().contains("10.0.0.2/24"));
    }

    #[test]
    fn test_default_gateway() {
        let lp = LinkProperties::from_response(&response(&["10.0.0.2"], &[], &[])).unwrap();
        assert_eq!(lp.gateways, vec![IpAddr::V4(Ipv4Addr::UNSPECIFIED)]);
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(
            LinkProperties::from_response(&response(&[], &[], &[])),
            Err(LinkError::NoAddresses)
        );
        assert_eq!(
            LinkProperties::from_response(&response(&["bogus"], &[], &[])),
            Err(LinkError::BadAddress("bogus".to_string()))
        );
        assert_eq!(
            LinkProperties::from_response(&response(&["10.0.0.2"], &["x"], &[])),
            Err(LinkError::BadDns("x".to_string()))
        );
    }
}
