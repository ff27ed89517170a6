//! Rule source boundary
//!
//! A [`RuleSource`] is the only way the engine learns anything about the host
//! firewall: the raw rule list, per-profile enabled state and default actions,
//! the active profiles, and how a destination maps to an interface and its
//! profile. Implementations wrap whatever the platform offers (a policy API, a
//! captured [`snapshot`](crate::core::snapshot)) and must be safe for
//! concurrent reads if the engine is shared between threads.
//!
//! Raw rules arrive loosely typed, the way the OS reports them (numeric codes,
//! empty strings for "unset"). [`map_rules`] converts them to
//! [`FirewallRule`] values; nothing past this module sees a [`RawRule`].

use super::error::SourceError;
use super::rule::{Action, Direction, FirewallRule, ProfileMask, Protocol};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::warn;

/// Profile value the OS reports for "all profiles"
const RAW_PROFILE_ALL: i32 = 0x7FFF_FFFF;

/// Read-only access to the host firewall policy and network environment
pub trait RuleSource {
    /// Enumerates every rule, enabled or not, in policy order.
    fn rules(&self) -> Result<Vec<RawRule>, SourceError>;

    /// Whether the firewall is switched on for the given profile(s).
    fn firewall_enabled(&self, profile: ProfileMask) -> Result<bool, SourceError>;

    /// Bitmask of the currently active profiles.
    fn current_profiles(&self) -> Result<ProfileMask, SourceError>;

    /// Default action applied when no rule matches.
    fn default_action(
        &self,
        direction: Direction,
        profile: ProfileMask,
    ) -> Result<Action, SourceError>;

    /// Profile category of a network interface.
    fn interface_profile(&self, interface_index: u32) -> Result<ProfileMask, SourceError>;

    /// Index of the local interface used to reach `target`.
    fn best_interface(&self, target: Ipv4Addr) -> Result<u32, SourceError>;
}

impl<S: RuleSource + ?Sized> RuleSource for &S {
    fn rules(&self) -> Result<Vec<RawRule>, SourceError> {
        (**self).rules()
    }

    fn firewall_enabled(&self, profile: ProfileMask) -> Result<bool, SourceError> {
        (**self).firewall_enabled(profile)
    }

    fn current_profiles(&self) -> Result<ProfileMask, SourceError> {
        (**self).current_profiles()
    }

    fn default_action(
        &self,
        direction: Direction,
        profile: ProfileMask,
    ) -> Result<Action, SourceError> {
        (**self).default_action(direction, profile)
    }

    fn interface_profile(&self, interface_index: u32) -> Result<ProfileMask, SourceError> {
        (**self).interface_profile(interface_index)
    }

    fn best_interface(&self, target: Ipv4Addr) -> Result<u32, SourceError> {
        (**self).best_interface(target)
    }
}

impl<S: RuleSource + ?Sized> RuleSource for Arc<S> {
    fn rules(&self) -> Result<Vec<RawRule>, SourceError> {
        (**self).rules()
    }

    fn firewall_enabled(&self, profile: ProfileMask) -> Result<bool, SourceError> {
        (**self).firewall_enabled(profile)
    }

    fn current_profiles(&self) -> Result<ProfileMask, SourceError> {
        (**self).current_profiles()
    }

    fn default_action(
        &self,
        direction: Direction,
        profile: ProfileMask,
    ) -> Result<Action, SourceError> {
        (**self).default_action(direction, profile)
    }

    fn interface_profile(&self, interface_index: u32) -> Result<ProfileMask, SourceError> {
        (**self).interface_profile(interface_index)
    }

    fn best_interface(&self, target: Ipv4Addr) -> Result<u32, SourceError> {
        (**self).best_interface(target)
    }
}

/// A rule exactly as the OS policy store reports it
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct RawRule {
    pub name: String,
    pub enabled: bool,
    /// 1 = in, 2 = out
    pub direction: i32,
    /// 0 = block, 1 = allow
    pub action: i32,
    /// IANA protocol number, 256 = any
    pub protocol: i32,
    pub local_ports: String,
    pub remote_ports: String,
    pub remote_addresses: String,
    pub application_name: String,
    pub profiles: i32,
}

/// Why a raw rule could not be mapped
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("rule '{name}': unknown direction code {code}")]
    UnknownDirection { name: String, code: i32 },

    #[error("rule '{name}': unknown action code {code}")]
    UnknownAction { name: String, code: i32 },

    #[error("rule '{name}': protocol {code} out of range")]
    InvalidProtocol { name: String, code: i32 },
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

impl ProfileMask {
    /// Converts an OS profile value.
    ///
    /// The "all profiles" sentinel and negative values map to [`ProfileMask::ALL`].
    /// Other values keep their bits, so a mask with only unknown bits matches no profile.
    pub fn from_raw(raw: i32) -> Self {
        if raw < 0 || raw == RAW_PROFILE_ALL {
            ProfileMask::ALL
        } else {
            ProfileMask(raw.unsigned_abs())
        }
    }
}

impl TryFrom<RawRule> for FirewallRule {
    type Error = MappingError;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        let direction =
            Direction::from_code(raw.direction).ok_or_else(|| MappingError::UnknownDirection {
                name: raw.name.clone(),
                code: raw.direction,
            })?;
        let action = Action::from_code(raw.action).ok_or_else(|| MappingError::UnknownAction {
            name: raw.name.clone(),
            code: raw.action,
        })?;
        let protocol = u16::try_from(raw.protocol)
            .ok()
            .filter(|code| *code <= Protocol::ANY_CODE)
            .map(Protocol::from_code)
            .ok_or_else(|| MappingError::InvalidProtocol {
                name: raw.name.clone(),
                code: raw.protocol,
            })?;

        Ok(FirewallRule {
            name: raw.name,
            enabled: raw.enabled,
            direction,
            action,
            protocol,
            local_port: non_empty(raw.local_ports),
            remote_port: non_empty(raw.remote_ports),
            remote_address: non_empty(raw.remote_addresses),
            application_name: non_empty(raw.application_name),
            profiles: ProfileMask::from_raw(raw.profiles),
        })
    }
}

impl From<&FirewallRule> for RawRule {
    fn from(rule: &FirewallRule) -> Self {
        RawRule {
            name: rule.name.clone(),
            enabled: rule.enabled,
            direction: rule.direction.code(),
            action: rule.action.code(),
            protocol: i32::from(rule.protocol.code()),
            local_ports: rule.local_port.clone().unwrap_or_default(),
            remote_ports: rule.remote_port.clone().unwrap_or_default(),
            remote_addresses: rule.remote_address.clone().unwrap_or_default(),
            application_name: rule.application_name.clone().unwrap_or_default(),
            profiles: i32::try_from(rule.profiles.bits()).unwrap_or(RAW_PROFILE_ALL),
        }
    }
}

/// Maps raw rules in order, dropping (and logging) any that cannot be typed.
pub fn map_rules(raw: Vec<RawRule>) -> Vec<FirewallRule> {
    raw.into_iter()
        .filter_map(|raw| match FirewallRule::try_from(raw) {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!("Skipping malformed rule: {e}");
                None
            }
        })
        .collect()
}
