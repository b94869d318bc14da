//! IP address with prefix length (`10.10.10.5/24`)

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// An address together with its network prefix.
///
/// A bare address parses as a single-host network (`/32` or `/128`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpCidr {
    addr: IpAddr,
    prefix_len: u8,
}

impl IpCidr {
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self, ConfigError> {
        if prefix_len > max_prefix_len(&addr) {
            return Err(ConfigError::invalid_value(
                "prefix_len",
                format!("{prefix_len} is too long for {addr}"),
            ));
        }
        Ok(Self { addr, prefix_len })
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// True when the prefix covers exactly one host.
    pub fn is_single_host(&self) -> bool {
        self.prefix_len == max_prefix_len(&self.addr)
    }
}

fn max_prefix_len(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

impl FromStr for IpCidr {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr_part, prefix_part) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let addr: IpAddr = addr_part
            .parse()
            .map_err(|e| ConfigError::invalid_value("address", format!("'{s}': {e}")))?;

        let prefix_len = match prefix_part {
            Some(prefix) => prefix
                .parse::<u8>()
                .map_err(|e| ConfigError::invalid_value("prefix_len", format!("'{s}': {e}")))?,
            None => max_prefix_len(&addr),
        };

        Self::new(addr, prefix_len)
    }
}

impl TryFrom<String> for IpCidr {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IpCidr> for String {
    fn from(value: IpCidr) -> Self {
        value.to_string()
    }
}

impl fmt::Display for IpCidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}
