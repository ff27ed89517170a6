//! Firewall engine: relevant-rule filtering and environment queries
//!
//! The engine owns the notion of "relevant rules" for a connection attempt. It
//! pulls a fresh rule snapshot from its [`RuleSource`] on every call (there is
//! no cache, so the answer always reflects the live policy), maps it to typed
//! rules, and filters it with the [`matcher`](super::matcher) predicates.
//!
//! Environment queries (firewall state, profiles, interfaces, default actions)
//! never fail: when the source errors, the engine logs a warning and returns
//! the value from its [`FailSafePolicy`]. Only rule enumeration reports an
//! error, which the analyzer turns into a safe deny.
//!
//! The engine holds no mutable state and is `Sync` whenever its source is.

use super::error::Result;
use super::failsafe::{FailSafePolicy, Query, UNKNOWN_INTERFACE};
use super::matcher::{
    is_enabled, is_host_in_subnet, is_port_in_range, is_profile_match, is_protocol_match,
    is_target_match,
};
use super::rule::{Direction, FirewallRule, ProfileMask, Protocol};
use super::source::{RuleSource, map_rules};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::{debug, warn};

/// Interface id reserved for loopback destinations
pub const LOOPBACK_INTERFACE: u32 = 1;

/// Engine settings supplied at construction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Interface id reported for loopback destinations
    pub loopback_interface: u32,
    pub fail_safe: FailSafePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            loopback_interface: LOOPBACK_INTERFACE,
            fail_safe: FailSafePolicy::default(),
        }
    }
}

/// A typed connection attempt as the engine filters against it
///
/// Host and ports are optional: an absent remote host/port disables the
/// target filter for that part, and `local_port` only filters inbound rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub direction: Direction,
    pub protocol: Protocol,
    pub profile: ProfileMask,
    pub remote_host: Option<String>,
    pub remote_port: Option<u16>,
    pub local_port: Option<u16>,
}

impl ConnectionDescriptor {
    pub fn new(direction: Direction, protocol: Protocol, profile: ProfileMask) -> Self {
        Self {
            direction,
            protocol,
            profile,
            remote_host: None,
            remote_port: None,
            local_port: None,
        }
    }

    pub fn with_target(mut self, host: impl Into<String>, port: u16) -> Self {
        self.remote_host = Some(host.into());
        self.remote_port = Some(port);
        self
    }

    pub fn with_remote_host(mut self, host: Option<String>) -> Self {
        self.remote_host = host;
        self
    }

    pub fn with_remote_port(mut self, port: Option<u16>) -> Self {
        self.remote_port = port;
        self
    }

    pub fn with_local_port(mut self, port: Option<u16>) -> Self {
        self.local_port = port;
        self
    }

    /// Applies every active filter to one rule, in evaluation order.
    pub fn matches(&self, rule: &FirewallRule) -> bool {
        if rule.direction != self.direction
            || !is_enabled(rule)
            || !is_profile_match(rule, self.profile)
            || !is_protocol_match(rule, self.protocol)
        {
            return false;
        }

        let target_ok = match (self.remote_host.as_deref(), self.remote_port) {
            (Some(host), Some(port)) => is_target_match(rule, host, port),
            (Some(host), None) => {
                is_host_in_subnet(host, rule.remote_address.as_deref().unwrap_or_default())
            }
            (None, Some(port)) => {
                is_port_in_range(port, rule.remote_port.as_deref().unwrap_or_default())
            }
            (None, None) => true,
        };
        if !target_ok {
            return false;
        }

        match (self.direction, self.local_port) {
            (Direction::Inbound, Some(port)) => {
                is_port_in_range(port, rule.local_port.as_deref().unwrap_or_default())
            }
            _ => true,
        }
    }
}

/// Filters a rule source down to the rules relevant for a connection
#[derive(Debug, Clone)]
pub struct FirewallEngine<S> {
    source: S,
    config: EngineConfig,
}

impl<S: RuleSource> FirewallEngine<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, EngineConfig::default())
    }

    pub fn with_config(source: S, config: EngineConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn fail_safe(&self) -> &FailSafePolicy {
        &self.config.fail_safe
    }

    /// Every rule in the current snapshot, typed, in enumeration order.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the rule source cannot enumerate rules.
    pub fn all_rules(&self) -> Result<Vec<FirewallRule>> {
        let raw = self.source.rules()?;
        Ok(map_rules(raw))
    }

    /// Enabled rules compatible with the connection, in enumeration order.
    ///
    /// An empty list is a normal outcome meaning "fall back to the default action".
    ///
    /// # Errors
    ///
    /// Returns `Err` if the rule source cannot enumerate rules.
    pub fn relevant_rules(&self, connection: &ConnectionDescriptor) -> Result<Vec<FirewallRule>> {
        let rules = self.all_rules()?;
        let total = rules.len();

        let relevant: Vec<FirewallRule> = rules
            .into_iter()
            .filter(|rule| connection.matches(rule))
            .collect();

        debug!(
            "{} of {} rules relevant for {} {} (profile {})",
            relevant.len(),
            total,
            connection.direction,
            connection.protocol,
            connection.profile
        );
        Ok(relevant)
    }

    /// Default action for a direction and profile; `true` means Allow.
    pub fn default_action(&self, direction: Direction, profile: ProfileMask) -> bool {
        match self.source.default_action(direction, profile) {
            Ok(action) => action.is_allow(),
            Err(e) => Self::substitute(
                Query::DefaultAction,
                &e,
                self.fail_safe().default_action_allowed,
            ),
        }
    }

    /// `true` if the firewall is on for at least one active profile.
    pub fn firewall_state(&self) -> bool {
        let profiles = match self.source.current_profiles() {
            Ok(mask) => mask.profiles(),
            Err(e) => {
                return Self::substitute(
                    Query::FirewallState,
                    &e,
                    self.fail_safe().firewall_enabled,
                );
            }
        };
        if profiles.is_empty() {
            warn!("No active firewall profile reported; using fail-safe firewall state");
            return self.fail_safe().firewall_enabled;
        }

        let mut any_enabled = false;
        for profile in profiles {
            match self.source.firewall_enabled(profile.mask()) {
                Ok(enabled) => any_enabled |= enabled,
                Err(e) => {
                    return Self::substitute(
                        Query::FirewallState,
                        &e,
                        self.fail_safe().firewall_enabled,
                    );
                }
            }
        }
        any_enabled
    }

    pub fn current_profiles(&self) -> ProfileMask {
        self.source.current_profiles().unwrap_or_else(|e| {
            Self::substitute(Query::CurrentProfiles, &e, self.fail_safe().current_profiles)
        })
    }

    pub fn interface_profile(&self, interface_index: u32) -> ProfileMask {
        self.source
            .interface_profile(interface_index)
            .unwrap_or_else(|e| {
                Self::substitute(
                    Query::InterfaceProfile,
                    &e,
                    self.fail_safe().interface_profile,
                )
            })
    }

    /// Local interface used to reach `target_host`.
    ///
    /// Loopback destinations resolve to the reserved loopback id; anything
    /// that cannot be resolved yields the fail-safe (unknown) index.
    pub fn best_interface(&self, target_host: &str) -> u32 {
        let host = target_host.trim();
        if host.eq_ignore_ascii_case("localhost") {
            return self.config.loopback_interface;
        }

        let address = match host.parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) => v4,
            Ok(IpAddr::V6(v6)) if v6.is_loopback() => return self.config.loopback_interface,
            Ok(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
                Some(v4) => v4,
                None => {
                    warn!("Cannot resolve interface for IPv6 host {host}");
                    return self.fail_safe().interface_index;
                }
            },
            Err(_) => {
                warn!("Cannot resolve interface for non-literal host '{host}'");
                return self.fail_safe().interface_index;
            }
        };

        if address.is_loopback() {
            return self.config.loopback_interface;
        }

        self.source.best_interface(address).unwrap_or_else(|e| {
            Self::substitute(Query::BestInterface, &e, self.fail_safe().interface_index)
        })
    }

    /// Profile governing traffic through an interface; an unknown interface
    /// falls back to the currently active profiles.
    pub fn resolve_profile(&self, interface_index: u32) -> ProfileMask {
        if interface_index == UNKNOWN_INTERFACE {
            self.current_profiles()
        } else {
            self.interface_profile(interface_index)
        }
    }

    /// Logs a failed query and returns its fail-safe value.
    fn substitute<T: std::fmt::Debug>(
        query: Query,
        error: &dyn std::error::Error,
        fallback: T,
    ) -> T {
        warn!("{query} query failed ({error}); using fail-safe default {fallback:?}");
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rule::{Action, FirewallRule};
    use crate::core::source::RawRule;
    use crate::core::test_helpers::{StaticSource, tracker_allow_rule};

    fn outbound_udp(profile: ProfileMask) -> ConnectionDescriptor {
        ConnectionDescriptor::new(Direction::Outbound, Protocol::Udp, profile)
            .with_target("192.168.1.50", 21412)
    }

    #[test]
    fn test_relevant_rules_filters_in_order() {
        let source = StaticSource::new()
            .with_rule(tracker_allow_rule())
            .with_rule(
                FirewallRule::new("inbound", Direction::Inbound, Action::Allow, Protocol::Udp),
            )
            .with_rule(
                FirewallRule::new("disabled", Direction::Outbound, Action::Block, Protocol::Udp)
                    .with_enabled(false),
            )
            .with_rule(
                FirewallRule::new("public only", Direction::Outbound, Action::Block, Protocol::Udp)
                    .with_profiles(ProfileMask::PUBLIC),
            )
            .with_rule(FirewallRule::new(
                "tcp",
                Direction::Outbound,
                Action::Block,
                Protocol::Tcp,
            ))
            .with_rule(
                FirewallRule::new("other port", Direction::Outbound, Action::Block, Protocol::Udp)
                    .with_remote_port("53"),
            )
            .with_rule(FirewallRule::new(
                "any proto",
                Direction::Outbound,
                Action::Allow,
                Protocol::Any,
            ));
        let engine = FirewallEngine::new(source);

        let rules = engine
            .relevant_rules(&outbound_udp(ProfileMask::PRIVATE))
            .unwrap();
        let names: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Tracker UDP", "any proto"]);
    }

    #[test]
    fn test_relevant_rules_empty_is_ok() {
        let engine = FirewallEngine::new(StaticSource::new());
        let rules = engine
            .relevant_rules(&outbound_udp(ProfileMask::PRIVATE))
            .unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_target_filter_skipped_without_target() {
        let source = StaticSource::new().with_rule(
            FirewallRule::new("dns", Direction::Outbound, Action::Allow, Protocol::Udp)
                .with_remote_address("10.0.0.1")
                .with_remote_port("53"),
        );
        let engine = FirewallEngine::new(source);
        let untargeted =
            ConnectionDescriptor::new(Direction::Outbound, Protocol::Udp, ProfileMask::PRIVATE);
        assert_eq!(engine.relevant_rules(&untargeted).unwrap().len(), 1);

        let port_only = untargeted.clone().with_remote_port(Some(54));
        assert!(engine.relevant_rules(&port_only).unwrap().is_empty());

        let host_only = untargeted.with_remote_host(Some("10.0.0.1".to_string()));
        assert_eq!(engine.relevant_rules(&host_only).unwrap().len(), 1);
    }

    #[test]
    fn test_inbound_local_port_filter() {
        let source = StaticSource::new().with_rule(
            FirewallRule::new("game", Direction::Inbound, Action::Allow, Protocol::Udp)
                .with_local_port("28960-28970"),
        );
        let engine = FirewallEngine::new(source);
        let base =
            ConnectionDescriptor::new(Direction::Inbound, Protocol::Udp, ProfileMask::PRIVATE);

        let inside = base.clone().with_local_port(Some(28965));
        assert_eq!(engine.relevant_rules(&inside).unwrap().len(), 1);

        let outside = base.with_local_port(Some(29000));
        assert!(engine.relevant_rules(&outside).unwrap().is_empty());
    }

    #[test]
    fn test_local_port_ignored_for_outbound() {
        let source = StaticSource::new().with_rule(tracker_allow_rule().with_local_port("1"));
        let engine = FirewallEngine::new(source);
        let connection = outbound_udp(ProfileMask::PRIVATE).with_local_port(Some(2));
        assert_eq!(engine.relevant_rules(&connection).unwrap().len(), 1);
    }

    #[test]
    fn test_relevant_rules_is_idempotent() {
        let source = StaticSource::new()
            .with_rule(tracker_allow_rule())
            .with_rule(tracker_allow_rule());
        let engine = FirewallEngine::new(source);
        let connection = outbound_udp(ProfileMask::PRIVATE);
        assert_eq!(
            engine.relevant_rules(&connection).unwrap(),
            engine.relevant_rules(&connection).unwrap()
        );
    }

    #[test]
    fn test_rules_are_enumerated_on_every_call() {
        let engine = FirewallEngine::new(StaticSource::new().with_rule(tracker_allow_rule()));
        let connection = outbound_udp(ProfileMask::PRIVATE);
        engine.relevant_rules(&connection).unwrap();
        engine.relevant_rules(&connection).unwrap();
        assert_eq!(engine.source().rule_calls(), 2);
    }

    #[test]
    fn test_malformed_raw_rule_is_skipped() {
        let broken = RawRule {
            name: "bad direction".to_string(),
            direction: 9,
            action: 1,
            protocol: 17,
            ..RawRule::default()
        };
        let engine = FirewallEngine::new(
            StaticSource::new()
                .with_raw_rule(broken)
                .with_rule(tracker_allow_rule()),
        );
        let rules = engine.all_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "Tracker UDP");
    }

    #[test]
    fn test_enumeration_failure_is_reported() {
        let engine = FirewallEngine::new(StaticSource::new().failing(Query::Rules));
        assert!(
            engine
                .relevant_rules(&outbound_udp(ProfileMask::PRIVATE))
                .is_err()
        );
    }

    #[test]
    fn test_default_action_from_source() {
        let source = StaticSource::new()
            .with_defaults(Action::Block, Action::Allow);
        let engine = FirewallEngine::new(source);
        assert!(!engine.default_action(Direction::Inbound, ProfileMask::PRIVATE));
        assert!(engine.default_action(Direction::Outbound, ProfileMask::PRIVATE));
    }

    #[test]
    fn test_firewall_state_any_active_profile() {
        let source = StaticSource::new()
            .with_active_profiles(ProfileMask::PRIVATE | ProfileMask::PUBLIC)
            .with_enabled(ProfileMask::PUBLIC);
        assert!(FirewallEngine::new(source).firewall_state());

        let off = StaticSource::new()
            .with_active_profiles(ProfileMask::PRIVATE)
            .with_enabled(ProfileMask::PUBLIC);
        assert!(!FirewallEngine::new(off).firewall_state());
    }

    #[test]
    fn test_every_fail_safe_default() {
        let policy = FailSafePolicy::default();
        let source = StaticSource::new()
            .with_enabled(ProfileMask::NONE)
            .with_defaults(Action::Allow, Action::Allow)
            .failing(Query::FirewallState)
            .failing(Query::CurrentProfiles)
            .failing(Query::InterfaceProfile)
            .failing(Query::BestInterface)
            .failing(Query::DefaultAction);
        let engine = FirewallEngine::new(source);

        assert_eq!(engine.firewall_state(), policy.firewall_enabled);
        assert_eq!(engine.current_profiles(), policy.current_profiles);
        assert_eq!(engine.interface_profile(7), policy.interface_profile);
        assert_eq!(engine.best_interface("192.168.1.50"), policy.interface_index);
        assert_eq!(
            engine.default_action(Direction::Outbound, ProfileMask::PRIVATE),
            policy.default_action_allowed
        );
    }

    #[test]
    fn test_firewall_state_fails_safe_when_enabled_query_fails() {
        let source = StaticSource::new()
            .with_enabled(ProfileMask::NONE)
            .failing(Query::FirewallState);
        assert!(FirewallEngine::new(source).firewall_state());
    }

    #[test]
    fn test_custom_fail_safe_table() {
        let config = EngineConfig {
            fail_safe: FailSafePolicy {
                current_profiles: ProfileMask::PUBLIC,
                ..FailSafePolicy::default()
            },
            ..EngineConfig::default()
        };
        let engine = FirewallEngine::with_config(
            StaticSource::new().failing(Query::CurrentProfiles),
            config,
        );
        assert_eq!(engine.current_profiles(), ProfileMask::PUBLIC);
    }

    #[test]
    fn test_best_interface_loopback_and_unknown() {
        let engine = FirewallEngine::new(StaticSource::new().with_best_interface(12));
        assert_eq!(engine.best_interface("127.0.0.1"), LOOPBACK_INTERFACE);
        assert_eq!(engine.best_interface("localhost"), LOOPBACK_INTERFACE);
        assert_eq!(engine.best_interface("::1"), LOOPBACK_INTERFACE);
        assert_eq!(engine.best_interface("192.168.1.50"), 12);
        assert_eq!(engine.best_interface("tracker.example"), UNKNOWN_INTERFACE);
    }

    #[test]
    fn test_resolve_profile() {
        let source = StaticSource::new()
            .with_active_profiles(ProfileMask::DOMAIN)
            .with_interface(12, ProfileMask::PUBLIC);
        let engine = FirewallEngine::new(source);
        assert_eq!(engine.resolve_profile(12), ProfileMask::PUBLIC);
        assert_eq!(engine.resolve_profile(UNKNOWN_INTERFACE), ProfileMask::DOMAIN);
        // Interface the source does not know about: fail-safe Private
        assert_eq!(engine.resolve_profile(99), ProfileMask::PRIVATE);
    }
}
