// Routing module - kernel policy-routing semantics over parsed `ip` output

pub mod decision;
pub mod manager;
pub mod policy;
pub mod route;
pub mod table;

use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::AppError;

/// Address family a rule, route or packet belongs to. Cross-family
/// comparison is never performed; the manager keeps one state per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    pub fn of(addr: IpAddr) -> IpFamily {
        match addr {
            IpAddr::V4(_) => IpFamily::V4,
            IpAddr::V6(_) => IpFamily::V6,
        }
    }

    pub fn of_network(network: IpNetwork) -> IpFamily {
        match network {
            IpNetwork::V4(_) => IpFamily::V4,
            IpNetwork::V6(_) => IpFamily::V6,
        }
    }

    /// The family's zero-length prefix: what `default` (and a rule's `all`)
    /// denote.
    pub fn default_prefix(self) -> IpNetwork {
        match self {
            IpFamily::V4 => IpNetwork::V4(
                Ipv4Network::new(Ipv4Addr::UNSPECIFIED, 0).expect("/0 is a valid v4 prefix"),
            ),
            IpFamily::V6 => IpNetwork::V6(
                Ipv6Network::new(Ipv6Addr::UNSPECIFIED, 0).expect("/0 is a valid v6 prefix"),
            ),
        }
    }

    /// The `-4`/`-6` flag passed to the `ip` binary
    pub fn flag(self) -> &'static str {
        match self {
            IpFamily::V4 => "-4",
            IpFamily::V6 => "-6",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IpFamily::V4 => "v4",
            IpFamily::V6 => "v6",
        }
    }
}

/// Transport protocol of the simulated packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl FromStr for Protocol {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "icmp" => Ok(Protocol::Icmp),
            other => Err(AppError::InvalidPacket(format!(
                "unknown protocol {:?} (expected tcp, udp or icmp)",
                other
            ))),
        }
    }
}

/// The simulated packet. `output_interface` starts empty and is written at
/// most once, by the manager, when a decision succeeds. One instance per
/// decision; not to be reused concurrently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub family: IpFamily,
    pub protocol: Protocol,
    pub source_ip: IpAddr,
    pub destination_ip: IpAddr,
    pub source_port: u16,
    pub destination_port: u16,
    pub fwmark: u32,
    pub input_interface: String,
    pub output_interface: String,
}

impl Packet {
    pub fn new(protocol: Protocol, source_ip: IpAddr, destination_ip: IpAddr) -> Self {
        Packet {
            family: IpFamily::of(destination_ip),
            protocol,
            source_ip,
            destination_ip,
            source_port: 0,
            destination_port: 0,
            fwmark: 0,
            input_interface: String::new(),
            output_interface: String::new(),
        }
    }
}

/// Parse a destination/source prefix the way the kernel prints one:
/// `default` is the family's zero-length prefix, a bare address gets the
/// family's host-length prefix, `addr/len` is taken as written. Returns
/// None on unparsable text or a family mismatch.
pub(crate) fn parse_prefix(text: &str, family: IpFamily) -> Option<IpNetwork> {
    if text == "default" {
        return Some(family.default_prefix());
    }
    let network: IpNetwork = text.parse().ok()?;
    (IpFamily::of_network(network) == family).then_some(network)
}

/// Parse an unsigned integer the way iproute2 accepts one: decimal, or hex
/// with a 0x prefix (fwmark values and masks are usually printed as hex).
pub(crate) fn parse_u32(text: &str) -> Option<u32> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefix_default() {
        let v4 = parse_prefix("default", IpFamily::V4).unwrap();
        assert_eq!(v4.prefix(), 0);
        assert!(v4.is_ipv4());

        let v6 = parse_prefix("default", IpFamily::V6).unwrap();
        assert_eq!(v6.prefix(), 0);
        assert!(v6.is_ipv6());
    }

    #[test]
    fn test_parse_prefix_bare_address_gets_host_length() {
        let net = parse_prefix("100.86.208.70", IpFamily::V4).unwrap();
        assert_eq!(net.prefix(), 32);

        let net = parse_prefix("fe80::1", IpFamily::V6).unwrap();
        assert_eq!(net.prefix(), 128);
    }

    #[test]
    fn test_parse_prefix_family_mismatch() {
        assert!(parse_prefix("fe80::/64", IpFamily::V4).is_none());
        assert!(parse_prefix("10.0.0.0/8", IpFamily::V6).is_none());
    }

    #[test]
    fn test_parse_prefix_invalid() {
        assert!(parse_prefix("not-an-address", IpFamily::V4).is_none());
        assert!(parse_prefix("10.0.0.0/33", IpFamily::V4).is_none());
    }

    #[test]
    fn test_parse_u32_decimal_and_hex() {
        assert_eq!(parse_u32("1003"), Some(1003));
        assert_eq!(parse_u32("0x3eb"), Some(0x3eb));
        assert_eq!(parse_u32("0xffff0000"), Some(0xffff0000));
        assert_eq!(parse_u32("garbage"), None);
    }

    #[test]
    fn test_protocol_from_str() {
        assert_eq!("tcp".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!("ICMP".parse::<Protocol>().unwrap(), Protocol::Icmp);
        assert!("gre".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_packet_family_follows_destination() {
        let packet = Packet::new(
            Protocol::Icmp,
            "100.86.208.70".parse().unwrap(),
            "100.115.92.131".parse().unwrap(),
        );
        assert_eq!(packet.family, IpFamily::V4);
        assert_eq!(packet.output_interface, "");
        assert_eq!(packet.fwmark, 0);
    }
}
