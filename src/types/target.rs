//! Target specification types.
//!
//! The scan engine addresses hosts without name resolution, so a target is
//! one of:
//! - Single IP addresses (IPv4 and IPv6)
//! - CIDR notation (192.168.1.0/24)
//! - Inclusive IPv4 ranges (10.0.0.1-10.0.0.50)

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

/// Error type for target parsing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TargetError {
    #[error("invalid target format: {0}")]
    InvalidFormat(String),
    #[error("invalid CIDR notation: {0}")]
    InvalidCidr(String),
    #[error("invalid address range: {0}")]
    InvalidRange(String),
    #[error("hostnames are not resolved by the scan engine: {0}")]
    Hostname(String),
}

/// A target specification handed to the scan engine verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetSpec {
    /// A single IP address.
    Single(IpAddr),
    /// A CIDR network range.
    Cidr(IpNetwork),
    /// An inclusive IPv4 address range.
    Range(Ipv4Addr, Ipv4Addr),
}

impl TargetSpec {
    /// Parse a target specification from a string.
    pub fn parse(s: &str) -> Result<Self, TargetError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TargetError::InvalidFormat(s.to_string()));
        }

        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self::Single(ip));
        }

        if s.contains('/') {
            let network: IpNetwork = s
                .parse()
                .map_err(|_| TargetError::InvalidCidr(s.to_string()))?;
            return Ok(Self::Cidr(network));
        }

        if let Some((start, end)) = s.split_once('-') {
            if let (Ok(start), Ok(end)) =
                (start.trim().parse::<Ipv4Addr>(), end.trim().parse::<Ipv4Addr>())
            {
                if u32::from(start) > u32::from(end) {
                    return Err(TargetError::InvalidRange(s.to_string()));
                }
                return Ok(Self::Range(start, end));
            }
        }

        if looks_like_hostname(s) {
            return Err(TargetError::Hostname(s.to_string()));
        }

        Err(TargetError::InvalidFormat(s.to_string()))
    }

    /// Get an estimate of how many hosts this target represents.
    ///
    /// Saturates at `u128::MAX` for `::/0`.
    pub fn estimated_host_count(&self) -> u128 {
        match self {
            Self::Single(_) => 1,
            Self::Cidr(network) => {
                let bits: u32 = if network.is_ipv4() { 32 } else { 128 };
                let host_bits = bits.saturating_sub(u32::from(network.prefix()));
                1u128.checked_shl(host_bits).unwrap_or(u128::MAX)
            }
            Self::Range(start, end) => (u32::from(*end) - u32::from(*start)) as u128 + 1,
        }
    }
}

impl FromStr for TargetSpec {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TargetSpec {
    type Error = TargetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TargetSpec> for String {
    fn from(spec: TargetSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(ip) => write!(f, "{}", ip),
            Self::Cidr(network) => write!(f, "{}", network),
            Self::Range(start, end) => write!(f, "{}-{}", start, end),
        }
    }
}

/// Check if a string is shaped like a DNS name, to give a clearer error.
fn looks_like_hostname(s: &str) -> bool {
    if s.len() > 253 {
        return false;
    }

    s.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
