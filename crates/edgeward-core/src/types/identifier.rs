use crate::error::{EdgeError, Result};
use std::fmt;
use std::net::IpAddr;

/// What a decision identifier refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    /// IPv4/IPv6 address or network, stored in ACLs
    Network,
    /// Two-letter country code
    Country,
    /// Autonomous system number
    AsNumber,
}

impl IdentifierKind {
    /// Classify a decision identifier.
    ///
    /// Anything containing `.` or `:` is a network. Otherwise an all-digit
    /// token is an AS number and a two-character token is a country code.
    /// Other tokens are not classifiable and yield `None`.
    ///
    /// The two-character rule does not check the token against the list of
    /// real country codes.
    #[must_use]
    pub fn classify(item: &str) -> Option<Self> {
        if item.contains('.') || item.contains(':') {
            return Some(Self::Network);
        }
        if !item.is_empty() && item.chars().all(char::is_numeric) {
            Some(Self::AsNumber)
        } else if item.chars().count() == 2 {
            Some(Self::Country)
        } else {
            None
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Country => write!(f, "country"),
            Self::AsNumber => write!(f, "as number"),
        }
    }
}

/// An address or network as the edge platform stores it in an ACL entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkEntry {
    /// Network address
    pub ip: IpAddr,
    /// Prefix length, `None` for a single address
    pub subnet: Option<u8>,
}

impl NetworkEntry {
    /// Parse `addr` or `addr/len`
    pub fn parse(item: &str) -> Result<Self> {
        let invalid = || EdgeError::InvalidIdentifier(item.to_string());

        let (addr, subnet) = match item.split_once('/') {
            Some((addr, len)) => (addr, Some(len.parse::<u8>().map_err(|_| invalid())?)),
            None => (item, None),
        };
        let ip: IpAddr = addr.parse().map_err(|_| invalid())?;

        let max_len = if ip.is_ipv4() { 32 } else { 128 };
        if subnet.is_some_and(|len| len > max_len) {
            return Err(invalid());
        }

        Ok(Self { ip, subnet })
    }

    /// The form an identifier takes once stored in an ACL.
    ///
    /// Addresses are written the way the platform reports them back, so
    /// `2001:DB8::1` becomes `2001:db8::1`.
    pub fn canonical(item: &str) -> Result<String> {
        Self::parse(item).map(|entry| entry.to_string())
    }

    /// Build from the parts returned by the remote API
    #[must_use]
    pub const fn from_parts(ip: IpAddr, subnet: Option<u8>) -> Self {
        Self { ip, subnet }
    }
}

impl fmt::Display for NetworkEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.subnet {
            Some(len) => write!(f, "{}/{len}", self.ip),
            None => write!(f, "{}", self.ip),
        }
    }
}
