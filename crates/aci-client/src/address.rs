//! IPv4 address and subnet arithmetic
//!
//! [`Address`] is an immutable value holding an IPv4 address, an optional
//! prefix length and the rule used to pick a subnet's gateway. Every subnet
//! computation (subnet, broadcast, gateway, containment, ranges) needs a mask
//! and returns [`AciError::MissingMask`] when there is none.

use crate::error::AciError;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;

/// Which end of a subnet holds the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GatewayRule {
    /// First usable address (subnet + 1)
    First,
    /// Last usable address (broadcast - 1)
    #[default]
    Last,
}

impl FromStr for GatewayRule {
    type Err = AciError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            other => Err(AciError::InvalidRequest(format!(
                "invalid gateway rule {other:?}, expected \"first\" or \"last\""
            ))),
        }
    }
}

impl fmt::Display for GatewayRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::Last => f.write_str("last"),
        }
    }
}

/// CIDR prefix length, always within 0..=32
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mask(u8);

impl Mask {
    /// Create a mask from a prefix length
    pub fn new(bits: u8) -> Result<Self, AciError> {
        if bits > 32 {
            return Err(AciError::InvalidMask(format!(
                "/{bits} is out of range, must be between /0 and /32"
            )));
        }
        Ok(Self(bits))
    }

    /// Prefix length
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Number of addresses covered by the mask
    pub fn size(self) -> u64 {
        1u64 << (32 - u32::from(self.0))
    }

    /// The mask as a 32-bit value (leading ones)
    pub fn value(self) -> u32 {
        if self.0 == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.0))
        }
    }

    /// Dotted form, e.g. `255.255.255.0`
    pub fn netmask(self) -> Ipv4Addr {
        Ipv4Addr::from(self.value())
    }
}

impl FromStr for Mask {
    type Err = AciError;

    /// Accepts a prefix length (`"24"`, `"/24"`) or a dotted mask (`"255.255.255.0"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches('/');
        if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
            let bits: u8 = s
                .parse()
                .map_err(|_| AciError::InvalidMask(format!("/{s} is out of range")))?;
            return Self::new(bits);
        }
        if s.contains('.') {
            let value = parse_octets(s).map_err(AciError::InvalidMask)?;
            let ones = value.leading_ones();
            let mask = Self(ones as u8);
            if mask.value() != value {
                return Err(AciError::InvalidMask(format!(
                    "{s} is not a valid subnet mask"
                )));
            }
            return Ok(mask);
        }
        Err(AciError::InvalidMask(format!("{s:?} is not a mask")))
    }
}

impl TryFrom<u8> for Mask {
    type Error = AciError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        Self::new(bits)
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// IPv4 address with optional mask
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    ip: u32,
    mask: Option<Mask>,
    gateway_rule: GatewayRule,
    host: Option<String>,
}

impl Address {
    /// Build an address from a literal (`"10.0.0.5"`, `"10.0.0.5/24"`) or a hostname.
    ///
    /// Hostnames are resolved immediately; a failed lookup is
    /// [`AciError::UnresolvedHost`] and is not retried.
    pub fn new(literal: &str) -> Result<Self, AciError> {
        let literal = literal.trim();
        if literal.is_empty() {
            return Err(AciError::InvalidAddress("empty address".to_string()));
        }

        if is_ip_literal(literal) {
            let (ip, mask) = match literal.split_once('/') {
                Some((ip, mask)) => (ip, Some(mask.parse::<Mask>()?)),
                None => (literal, None),
            };
            let ip = parse_octets(ip).map_err(AciError::InvalidAddress)?;
            return Ok(Self {
                ip,
                mask,
                gateway_rule: GatewayRule::default(),
                host: None,
            });
        }

        let ip = resolve(literal)?;
        Ok(Self {
            ip: u32::from(ip),
            mask: None,
            gateway_rule: GatewayRule::default(),
            host: Some(literal.to_string()),
        })
    }

    /// Build an address and apply a mask given as prefix length or dotted mask
    pub fn new_with_mask(literal: &str, mask: &str) -> Result<Self, AciError> {
        let mask = mask.parse::<Mask>()?;
        Ok(Self::new(literal)?.with_mask(mask))
    }

    /// Address from its 32-bit integer value
    pub fn from_decimal(ip: u32) -> Self {
        Self {
            ip,
            mask: None,
            gateway_rule: GatewayRule::default(),
            host: None,
        }
    }

    /// Same address with a different mask
    #[must_use]
    pub fn with_mask(self, mask: Mask) -> Self {
        Self {
            mask: Some(mask),
            ..self
        }
    }

    /// Same address without a mask
    #[must_use]
    pub fn without_mask(self) -> Self {
        Self { mask: None, ..self }
    }

    /// Same address with a different gateway rule
    #[must_use]
    pub fn with_gateway_rule(self, gateway_rule: GatewayRule) -> Self {
        Self {
            gateway_rule,
            ..self
        }
    }

    /// Integer form
    pub fn decimal_value(&self) -> u32 {
        self.ip
    }

    /// Dotted form
    pub fn dotted_value(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ip)
    }

    pub fn mask(&self) -> Option<Mask> {
        self.mask
    }

    pub fn gateway_rule(&self) -> GatewayRule {
        self.gateway_rule
    }

    /// Hostname this address was resolved from, if any
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Name to use when connecting: the original hostname, else the dotted address
    pub fn authority(&self) -> String {
        match &self.host {
            Some(host) => host.clone(),
            None => self.dotted_value().to_string(),
        }
    }

    fn require_mask(&self) -> Result<Mask, AciError> {
        self.mask
            .ok_or_else(|| AciError::MissingMask(self.dotted_value().to_string()))
    }

    /// `ip/mask` notation
    pub fn cidr(&self) -> Result<String, AciError> {
        let mask = self.require_mask()?;
        Ok(format!("{}/{}", self.dotted_value(), mask))
    }

    /// Subnet address (ip rounded down to the mask boundary), carrying the mask
    pub fn subnet(&self) -> Result<Address, AciError> {
        let mask = self.require_mask()?;
        Ok(Self {
            ip: self.ip & mask.value(),
            mask: Some(mask),
            gateway_rule: self.gateway_rule,
            host: None,
        })
    }

    /// Last address of the subnet
    pub fn broadcast(&self) -> Result<Ipv4Addr, AciError> {
        let mask = self.require_mask()?;
        let last = u64::from(self.ip & mask.value()) + mask.size() - 1;
        Ok(Ipv4Addr::from(last as u32))
    }

    /// Gateway address according to the gateway rule
    pub fn gateway(&self) -> Result<Ipv4Addr, AciError> {
        let gateway = match self.gateway_rule {
            GatewayRule::Last => u32::from(self.broadcast()?).checked_sub(1),
            GatewayRule::First => self.subnet()?.ip.checked_add(1),
        };
        gateway.map(Ipv4Addr::from).ok_or_else(|| {
            AciError::InvalidAddress(format!("{self} has no {} gateway", self.gateway_rule))
        })
    }

    /// True when the address is its own subnet address
    pub fn is_subnet_address(&self) -> Result<bool, AciError> {
        Ok(self.subnet()?.ip == self.ip)
    }

    /// True when the address is the subnet's gateway
    pub fn is_gateway_address(&self) -> Result<bool, AciError> {
        Ok(u32::from(self.gateway()?) == self.ip)
    }

    /// Every address in the subnet, ascending
    pub fn range_of_addresses(&self) -> Result<impl Iterator<Item = Ipv4Addr>, AciError> {
        let mask = self.require_mask()?;
        let base = u64::from(self.ip & mask.value());
        Ok((base..base + mask.size()).map(|ip| Ipv4Addr::from(ip as u32)))
    }

    /// True when `other` lies inside this address's subnet
    pub fn contains(&self, other: &Address) -> Result<bool, AciError> {
        let mask = self.require_mask()?;
        let base = u64::from(self.ip & mask.value());
        let candidate = u64::from(other.ip);
        Ok(candidate >= base && candidate - base < mask.size())
    }

    /// Address `delta` steps away, keeping mask and gateway rule
    pub fn offset(&self, delta: i64) -> Result<Address, AciError> {
        let ip = i64::from(self.ip) + delta;
        let ip = u32::try_from(ip).map_err(|_| {
            AciError::InvalidAddress(format!("{} {delta:+} is outside IPv4 space", self.dotted_value()))
        })?;
        Ok(Self {
            ip,
            mask: self.mask,
            gateway_rule: self.gateway_rule,
            host: None,
        })
    }

    /// Signed number of addresses from `other` to `self`
    pub fn distance(&self, other: &Address) -> i64 {
        i64::from(self.ip) - i64::from(other.ip)
    }
}

impl From<Ipv4Addr> for Address {
    fn from(ip: Ipv4Addr) -> Self {
        Self::from_decimal(u32::from(ip))
    }
}

impl FromStr for Address {
    type Err = AciError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mask {
            Some(mask) => write!(f, "{}/{}", self.dotted_value(), mask),
            None => write!(f, "{}", self.dotted_value()),
        }
    }
}

fn is_ip_literal(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '/')
}

/// Parse `a.b.c.d` into its integer value
fn parse_octets(s: &str) -> Result<u32, String> {
    let octets: Vec<&str> = s.split('.').collect();
    if octets.len() != 4 {
        return Err(format!("{s} does not have four octets"));
    }
    octets.iter().try_fold(0u32, |acc, octet| {
        if octet.is_empty() || !octet.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("invalid character in {s}"));
        }
        match octet.parse::<u16>() {
            Ok(value) if value <= 255 => Ok((acc << 8) | u32::from(value)),
            _ => Err(format!("invalid octet {octet} in {s}")),
        }
    })
}

fn resolve(host: &str) -> Result<Ipv4Addr, AciError> {
    let addrs = (host, 0)
        .to_socket_addrs()
        .map_err(|_| AciError::UnresolvedHost(host.to_string()))?;
    addrs
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| AciError::UnresolvedHost(host.to_string()))
}
