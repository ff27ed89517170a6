//! Firewall rule data structures
//!
//! This module defines the strongly-typed, read-only view of a single policy
//! rule that every matching and precedence decision works on.
//!
//! # Rule Structure
//!
//! A [`FirewallRule`] carries only the fields that take part in an
//! allow/deny decision:
//! - Direction (Inbound/Outbound) and action (Allow/Block)
//! - Protocol, stored as the OS numeric code (`Any` = 256 is the wildcard)
//! - Local and remote port specs (single, `low-high` range, or wildcard)
//! - Remote address (wildcard, CIDR block, or single IP)
//! - Optional application path
//! - Profile bitmask over Domain/Private/Public
//!
//! Rules are produced from [`RawRule`](crate::core::source::RawRule) values at
//! the rule source boundary and never mutated afterwards. Names are not unique.
//!
//! # Example
//!
//! ```
//! use fwcheck::core::rule::{Action, Direction, FirewallRule, ProfileMask, Protocol};
//!
//! let rule = FirewallRule::new("Tracker UDP", Direction::Outbound, Action::Allow, Protocol::Udp)
//!     .with_remote_address("*")
//!     .with_remote_port("21412")
//!     .with_profiles(ProfileMask::ALL);
//!
//! assert!(rule.enabled);
//! assert_eq!(rule.protocol.code(), 17);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Traffic direction a rule applies to
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Direction {
    /// Traffic arriving on a local port
    #[strum(to_string = "Inbound", serialize = "in")]
    Inbound,
    /// Traffic leaving toward a remote host/port
    #[strum(to_string = "Outbound", serialize = "out")]
    Outbound,
}

impl Direction {
    /// OS direction code (1 = in, 2 = out)
    pub const fn code(self) -> i32 {
        match self {
            Direction::Inbound => 1,
            Direction::Outbound => 2,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Direction::Inbound),
            2 => Some(Direction::Outbound),
            _ => None,
        }
    }
}

/// Rule action
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Action {
    /// Permit matching traffic
    Allow,
    /// Drop matching traffic
    Block,
}

impl Action {
    /// OS action code (0 = block, 1 = allow)
    pub const fn code(self) -> i32 {
        match self {
            Action::Block => 0,
            Action::Allow => 1,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Action::Block),
            1 => Some(Action::Allow),
            _ => None,
        }
    }

    pub const fn is_allow(self) -> bool {
        matches!(self, Action::Allow)
    }
}

/// IP protocol of a rule, kept as the IANA number the OS reports.
///
/// `Any` (256) is the wildcard. Other protocols (ICMP, GRE, ...) are kept as
/// `Other` so they can never accidentally match a TCP/UDP query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "u16", into = "u16")]
pub enum Protocol {
    Tcp,
    Udp,
    Any,
    Other(u16),
}

impl Protocol {
    pub const TCP_CODE: u16 = 6;
    pub const UDP_CODE: u16 = 17;
    pub const ANY_CODE: u16 = 256;

    pub const fn code(self) -> u16 {
        match self {
            Protocol::Tcp => Self::TCP_CODE,
            Protocol::Udp => Self::UDP_CODE,
            Protocol::Any => Self::ANY_CODE,
            Protocol::Other(code) => code,
        }
    }

    pub const fn from_code(code: u16) -> Self {
        match code {
            Self::TCP_CODE => Protocol::Tcp,
            Self::UDP_CODE => Protocol::Udp,
            Self::ANY_CODE => Protocol::Any,
            other => Protocol::Other(other),
        }
    }

    /// Maps a caller-supplied protocol name: `TCP` → 6, `UDP` → 17, anything else → Any.
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("tcp") {
            Protocol::Tcp
        } else if name.trim().eq_ignore_ascii_case("udp") {
            Protocol::Udp
        } else {
            Protocol::Any
        }
    }
}

impl From<u16> for Protocol {
    fn from(code: u16) -> Self {
        Self::from_code(code)
    }
}

impl From<Protocol> for u16 {
    fn from(protocol: Protocol) -> Self {
        protocol.code()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Any => write!(f, "Any"),
            Protocol::Other(code) => write!(f, "proto {code}"),
        }
    }
}

/// A single network location category
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Profile {
    Domain,
    Private,
    Public,
}

impl Profile {
    pub const fn as_str(self) -> &'static str {
        match self {
            Profile::Domain => "Domain",
            Profile::Private => "Private",
            Profile::Public => "Public",
        }
    }

    pub const fn mask(self) -> ProfileMask {
        match self {
            Profile::Domain => ProfileMask::DOMAIN,
            Profile::Private => ProfileMask::PRIVATE,
            Profile::Public => ProfileMask::PUBLIC,
        }
    }
}

/// Bitmask over firewall profiles (Domain=1, Private=2, Public=4)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ProfileMask(pub u32);

impl ProfileMask {
    pub const NONE: Self = Self(0);
    pub const DOMAIN: Self = Self(1);
    pub const PRIVATE: Self = Self(2);
    pub const PUBLIC: Self = Self(4);
    pub const ALL: Self = Self(7);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Individual profiles set in this mask, in Domain, Private, Public order
    pub fn profiles(self) -> Vec<Profile> {
        use strum::IntoEnumIterator;
        Profile::iter().filter(|p| self.intersects(p.mask())).collect()
    }

    /// Human-readable name; the first matching bit wins when several are set.
    pub fn name(self) -> &'static str {
        self.profiles().first().map_or("Unknown", |p| p.as_str())
    }
}

impl std::ops::BitOr for ProfileMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl From<Profile> for ProfileMask {
    fn from(profile: Profile) -> Self {
        profile.mask()
    }
}

impl fmt::Display for ProfileMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let profiles = self.profiles();
        if self.is_empty() {
            return write!(f, "Any");
        }
        if profiles.is_empty() {
            return write!(f, "Unknown({:#x})", self.0);
        }
        let names: Vec<&str> = profiles.iter().map(|p| p.as_str()).collect();
        write!(f, "{}", names.join(","))
    }
}

/// Normalized, read-only snapshot of one policy rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirewallRule {
    pub name: String,
    pub enabled: bool,
    pub direction: Direction,
    pub action: Action,
    pub protocol: Protocol,
    #[serde(default)]
    pub local_port: Option<String>,
    #[serde(default)]
    pub remote_port: Option<String>,
    #[serde(default)]
    pub remote_address: Option<String>,
    #[serde(default)]
    pub application_name: Option<String>,
    pub profiles: ProfileMask,
}

impl FirewallRule {
    /// Creates an enabled rule, unrestricted on ports/addresses and applying to all profiles.
    pub fn new(
        name: impl Into<String>,
        direction: Direction,
        action: Action,
        protocol: Protocol,
    ) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            direction,
            action,
            protocol,
            local_port: None,
            remote_port: None,
            remote_address: None,
            application_name: None,
            profiles: ProfileMask::ALL,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_local_port(mut self, spec: impl Into<String>) -> Self {
        self.local_port = Some(spec.into());
        self
    }

    pub fn with_remote_port(mut self, spec: impl Into<String>) -> Self {
        self.remote_port = Some(spec.into());
        self
    }

    pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = Some(address.into());
        self
    }

    pub fn with_application(mut self, path: impl Into<String>) -> Self {
        self.application_name = Some(path.into());
        self
    }

    pub fn with_profiles(mut self, profiles: ProfileMask) -> Self {
        self.profiles = profiles;
        self
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} {}] {} remote={}:{}",
            self.action,
            self.direction,
            self.protocol,
            self.name,
            self.remote_address.as_deref().unwrap_or("*"),
            self.remote_port.as_deref().unwrap_or("*"),
        )?;
        if let Some(local) = &self.local_port {
            write!(f, " local={local}")?;
        }
        write!(f, " profiles={}", self.profiles)?;
        if !self.enabled {
            write!(f, " (disabled)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_protocol_codes() {
        assert_eq!(Protocol::from_code(6), Protocol::Tcp);
        assert_eq!(Protocol::from_code(17), Protocol::Udp);
        assert_eq!(Protocol::from_code(256), Protocol::Any);
        assert_eq!(Protocol::from_code(1), Protocol::Other(1));
        assert_eq!(Protocol::Other(47).code(), 47);
    }

    #[test]
    fn test_protocol_from_name() {
        assert_eq!(Protocol::from_name("TCP"), Protocol::Tcp);
        assert_eq!(Protocol::from_name("udp"), Protocol::Udp);
        assert_eq!(Protocol::from_name("ICMP"), Protocol::Any);
        assert_eq!(Protocol::from_name(""), Protocol::Any);
    }

    #[test]
    fn test_protocol_serializes_as_code() {
        assert_eq!(serde_json::to_string(&Protocol::Udp).unwrap(), "17");
        let parsed: Protocol = serde_json::from_str("256").unwrap();
        assert_eq!(parsed, Protocol::Any);
    }

    #[test]
    fn test_profile_mask_name_first_bit_wins() {
        assert_eq!(ProfileMask::DOMAIN.name(), "Domain");
        assert_eq!(ProfileMask::PRIVATE.name(), "Private");
        assert_eq!(ProfileMask::PUBLIC.name(), "Public");
        assert_eq!((ProfileMask::PRIVATE | ProfileMask::PUBLIC).name(), "Private");
        assert_eq!(ProfileMask::ALL.name(), "Domain");
        assert_eq!(ProfileMask::NONE.name(), "Unknown");
        assert_eq!(ProfileMask(8).name(), "Unknown");
    }

    #[test]
    fn test_profile_mask_display() {
        assert_eq!(ProfileMask::ALL.to_string(), "Domain,Private,Public");
        assert_eq!(ProfileMask::NONE.to_string(), "Any");
        assert_eq!(ProfileMask(8).to_string(), "Unknown(0x8)");
    }

    #[test]
    fn test_direction_parse_and_codes() {
        assert_eq!(Direction::from_str("outbound").unwrap(), Direction::Outbound);
        assert_eq!(Direction::from_str("IN").unwrap(), Direction::Inbound);
        assert_eq!(Direction::from_code(2), Some(Direction::Outbound));
        assert_eq!(Direction::from_code(3), None);
        assert_eq!(Direction::Inbound.code(), 1);
    }

    #[test]
    fn test_action_codes() {
        assert_eq!(Action::from_code(0), Some(Action::Block));
        assert_eq!(Action::from_code(1), Some(Action::Allow));
        assert_eq!(Action::from_code(7), None);
        assert!(Action::Allow.is_allow());
        assert!(!Action::Block.is_allow());
    }

    #[test]
    fn test_rule_display() {
        let rule = FirewallRule::new("Game", Direction::Inbound, Action::Block, Protocol::Tcp)
            .with_local_port("28960-28970")
            .with_profiles(ProfileMask::PUBLIC)
            .with_enabled(false);
        assert_eq!(
            rule.to_string(),
            "[Block Inbound TCP] Game remote=*:* local=28960-28970 profiles=Public (disabled)"
        );
    }
}
