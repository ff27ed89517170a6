//! Shared test utilities for core module tests
//!
//! Provides an in-memory [`RuleSource`] with per-query failure injection and
//! the canonical rule fixtures. This module is only compiled in test mode.

use crate::core::error::SourceError;
use crate::core::failsafe::Query;
use crate::core::rule::{Action, Direction, FirewallRule, Profile, ProfileMask, Protocol};
use crate::core::source::{RawRule, RuleSource};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory rule source.
///
/// Defaults: Private profile active, firewall on for every profile, inbound
/// Block / outbound Allow, one interface (12, Private) used for every target.
#[derive(Debug)]
pub struct StaticSource {
    rules: Vec<RawRule>,
    active_profiles: ProfileMask,
    enabled_profiles: ProfileMask,
    defaults: (Action, Action),
    profile_defaults: HashMap<Profile, (Action, Action)>,
    interfaces: HashMap<u32, ProfileMask>,
    best_interface: u32,
    failing: HashSet<Query>,
    rule_calls: AtomicUsize,
}

impl StaticSource {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            active_profiles: ProfileMask::PRIVATE,
            enabled_profiles: ProfileMask::ALL,
            defaults: (Action::Block, Action::Allow),
            profile_defaults: HashMap::new(),
            interfaces: HashMap::from([(12, ProfileMask::PRIVATE)]),
            best_interface: 12,
            failing: HashSet::new(),
            rule_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_rule(mut self, rule: FirewallRule) -> Self {
        self.rules.push(RawRule::from(&rule));
        self
    }

    pub fn with_raw_rule(mut self, rule: RawRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_active_profiles(mut self, profiles: ProfileMask) -> Self {
        self.active_profiles = profiles;
        self
    }

    /// Profiles on which the firewall is switched on
    pub fn with_enabled(mut self, profiles: ProfileMask) -> Self {
        self.enabled_profiles = profiles;
        self
    }

    pub fn with_defaults(mut self, inbound: Action, outbound: Action) -> Self {
        self.defaults = (inbound, outbound);
        self
    }

    pub fn with_profile_defaults(
        mut self,
        profile: Profile,
        inbound: Action,
        outbound: Action,
    ) -> Self {
        self.profile_defaults.insert(profile, (inbound, outbound));
        self
    }

    pub fn with_interface(mut self, index: u32, profile: ProfileMask) -> Self {
        self.interfaces.insert(index, profile);
        self
    }

    pub fn with_best_interface(mut self, index: u32) -> Self {
        self.best_interface = index;
        self
    }

    /// Makes every call answering `query` return an error.
    pub fn failing(mut self, query: Query) -> Self {
        self.failing.insert(query);
        self
    }

    /// Number of times rules were enumerated
    pub fn rule_calls(&self) -> usize {
        self.rule_calls.load(Ordering::SeqCst)
    }

    fn check(&self, query: Query) -> Result<(), SourceError> {
        if self.failing.contains(&query) {
            Err(SourceError::Unavailable(format!("injected {query} failure")))
        } else {
            Ok(())
        }
    }
}

impl RuleSource for StaticSource {
    fn rules(&self) -> Result<Vec<RawRule>, SourceError> {
        self.rule_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Query::Rules)?;
        Ok(self.rules.clone())
    }

    fn firewall_enabled(&self, profile: ProfileMask) -> Result<bool, SourceError> {
        self.check(Query::FirewallState)?;
        Ok(self.enabled_profiles.intersects(profile))
    }

    fn current_profiles(&self) -> Result<ProfileMask, SourceError> {
        self.check(Query::CurrentProfiles)?;
        Ok(self.active_profiles)
    }

    fn default_action(
        &self,
        direction: Direction,
        profile: ProfileMask,
    ) -> Result<Action, SourceError> {
        self.check(Query::DefaultAction)?;
        let (inbound, outbound) = profile
            .profiles()
            .first()
            .and_then(|p| self.profile_defaults.get(p))
            .copied()
            .unwrap_or(self.defaults);
        Ok(match direction {
            Direction::Inbound => inbound,
            Direction::Outbound => outbound,
        })
    }

    fn interface_profile(&self, interface_index: u32) -> Result<ProfileMask, SourceError> {
        self.check(Query::InterfaceProfile)?;
        self.interfaces
            .get(&interface_index)
            .copied()
            .ok_or_else(|| SourceError::NotFound(format!("interface {interface_index}")))
    }

    fn best_interface(&self, _target: Ipv4Addr) -> Result<u32, SourceError> {
        self.check(Query::BestInterface)?;
        Ok(self.best_interface)
    }
}

/// Outbound UDP allow to any host on port 21412, all profiles.
pub fn tracker_allow_rule() -> FirewallRule {
    FirewallRule::new("Tracker UDP", Direction::Outbound, Action::Allow, Protocol::Udp)
        .with_remote_address("*")
        .with_remote_port("21412")
        .with_profiles(ProfileMask::ALL)
}

/// Outbound UDP block for the 192.168.1.0/24 LAN, any port.
pub fn lan_block_rule() -> FirewallRule {
    FirewallRule::new("Block LAN UDP", Direction::Outbound, Action::Block, Protocol::Udp)
        .with_remote_address("192.168.1.0/24")
        .with_remote_port("*")
        .with_profiles(ProfileMask::ALL)
}
