//! Policy snapshot rule source
//!
//! A snapshot is a standalone JSON capture of a host firewall policy: the raw
//! rules, per-profile settings, the active profiles and the local interfaces.
//! [`SnapshotSource`] answers [`RuleSource`] queries from it, re-reading the
//! file on every query so edits are picked up without restarting.
//!
//! ```json
//! {
//!   "active_profiles": 2,
//!   "profiles": {
//!     "private": { "enabled": true, "default_inbound": "Block", "default_outbound": "Allow" }
//!   },
//!   "interfaces": [
//!     { "index": 12, "name": "eth0", "profile": 2, "addresses": ["192.168.1.10/24"] }
//!   ],
//!   "default_interface": 12,
//!   "rules": [
//!     { "Name": "Tracker", "Enabled": true, "Direction": 2, "Action": 1,
//!       "Protocol": 17, "RemotePorts": "21412", "Profiles": 7 }
//!   ]
//! }
//! ```

use super::error::SourceError;
use super::rule::{Action, Direction, Profile, ProfileMask};
use super::source::{RawRule, RuleSource};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Firewall settings for one profile
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProfileSettings {
    pub enabled: bool,
    pub default_inbound: Action,
    pub default_outbound: Action,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_inbound: Action::Block,
            default_outbound: Action::Allow,
        }
    }
}

impl ProfileSettings {
    pub fn default_action(&self, direction: Direction) -> Action {
        match direction {
            Direction::Inbound => self.default_inbound,
            Direction::Outbound => self.default_outbound,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProfileTable {
    pub domain: ProfileSettings,
    pub private: ProfileSettings,
    pub public: ProfileSettings,
}

impl ProfileTable {
    pub fn get(&self, profile: Profile) -> &ProfileSettings {
        match profile {
            Profile::Domain => &self.domain,
            Profile::Private => &self.private,
            Profile::Public => &self.public,
        }
    }
}

/// A local network interface
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterfaceEntry {
    pub index: u32,
    #[serde(default)]
    pub name: String,
    pub profile: ProfileMask,
    #[serde(default)]
    pub addresses: Vec<Ipv4Network>,
}

/// Captured firewall policy and network environment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicySnapshot {
    pub active_profiles: ProfileMask,
    pub profiles: ProfileTable,
    pub interfaces: Vec<InterfaceEntry>,
    /// Interface used when no interface address covers the target
    pub default_interface: Option<u32>,
    pub rules: Vec<RawRule>,
}

impl Default for PolicySnapshot {
    fn default() -> Self {
        Self {
            active_profiles: ProfileMask::PRIVATE,
            profiles: ProfileTable::default(),
            interfaces: Vec::new(),
            default_interface: None,
            rules: Vec::new(),
        }
    }
}

impl PolicySnapshot {
    /// Settings for the first profile in `mask` (Domain, Private, Public order).
    fn settings(&self, mask: ProfileMask) -> Result<&ProfileSettings, SourceError> {
        mask.profiles()
            .first()
            .map(|p| self.profiles.get(*p))
            .ok_or_else(|| SourceError::NotFound(format!("profile mask {}", mask.bits())))
    }

    /// Interface whose subnet covers `target` with the longest prefix, else the default.
    fn route(&self, target: Ipv4Addr) -> Option<u32> {
        self.interfaces
            .iter()
            .flat_map(|iface| {
                iface
                    .addresses
                    .iter()
                    .filter(|net| net.contains(target))
                    .map(move |net| (net.prefix(), iface.index))
            })
            .max_by_key(|(prefix, _)| *prefix)
            .map(|(_, index)| index)
            .or(self.default_interface)
    }
}

#[derive(Debug, Clone)]
enum Backing {
    File(PathBuf),
    Memory(Box<PolicySnapshot>),
}

/// [`RuleSource`] backed by a policy snapshot
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    backing: Backing,
}

impl SnapshotSource {
    /// Reads the snapshot from `path` on every query.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::File(path.into()),
        }
    }

    pub fn from_snapshot(snapshot: PolicySnapshot) -> Self {
        Self {
            backing: Backing::Memory(Box::new(snapshot)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File(path) => Some(path),
            Backing::Memory(_) => None,
        }
    }

    /// Loads the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file cannot be read or is not a valid snapshot.
    pub fn load(&self) -> Result<PolicySnapshot, SourceError> {
        match &self.backing {
            Backing::Memory(snapshot) => Ok((**snapshot).clone()),
            Backing::File(path) => {
                debug!("Reading policy snapshot {}", path.display());
                let json = std::fs::read_to_string(path).map_err(|e| {
                    let target = path.display().to_string();
                    match e.kind() {
                        std::io::ErrorKind::NotFound => {
                            SourceError::NotFound(format!("snapshot {target}"))
                        }
                        std::io::ErrorKind::PermissionDenied => {
                            SourceError::AccessDenied(format!("snapshot {target}"))
                        }
                        _ => SourceError::Unavailable(format!("{target}: {e}")),
                    }
                })?;
                serde_json::from_str(&json)
                    .map_err(|e| SourceError::query("snapshot", format!("invalid JSON: {e}")))
            }
        }
    }
}

impl RuleSource for SnapshotSource {
    fn rules(&self) -> Result<Vec<RawRule>, SourceError> {
        Ok(self.load()?.rules)
    }

    fn firewall_enabled(&self, profile: ProfileMask) -> Result<bool, SourceError> {
        let snapshot = self.load()?;
        let profiles = profile.profiles();
        if profiles.is_empty() {
            return Err(SourceError::NotFound(format!(
                "profile mask {}",
                profile.bits()
            )));
        }
        Ok(profiles.iter().any(|p| snapshot.profiles.get(*p).enabled))
    }

    fn current_profiles(&self) -> Result<ProfileMask, SourceError> {
        Ok(self.load()?.active_profiles)
    }

    fn default_action(
        &self,
        direction: Direction,
        profile: ProfileMask,
    ) -> Result<Action, SourceError> {
        let snapshot = self.load()?;
        Ok(snapshot.settings(profile)?.default_action(direction))
    }

    fn interface_profile(&self, interface_index: u32) -> Result<ProfileMask, SourceError> {
        self.load()?
            .interfaces
            .iter()
            .find(|iface| iface.index == interface_index)
            .map(|iface| iface.profile)
            .ok_or_else(|| SourceError::NotFound(format!("interface {interface_index}")))
    }

    fn best_interface(&self, target: Ipv4Addr) -> Result<u32, SourceError> {
        self.load()?
            .route(target)
            .ok_or_else(|| SourceError::NotFound(format!("route to {target}")))
    }
}
