//! Stateless rule matching predicates
//!
//! Every function here is a pure predicate over one [`FirewallRule`] (or one of
//! its fields) and a piece of the connection being evaluated. Nothing reads the
//! environment, so each predicate can be tested with literal fixtures.
//!
//! Malformed rule data (an unparseable port range or CIDR block) makes only the
//! predicate that reads it return `false`; it never aborts an evaluation.
//!
//! # Examples
//!
//! ```
//! use fwcheck::core::matcher::{is_host_in_subnet, is_port_in_range, normalize_address};
//!
//! assert!(is_port_in_range(28965, "28960-28970"));
//! assert!(!is_port_in_range(29000, "28960-28970"));
//! assert!(is_host_in_subnet("192.168.1.50", "192.168.1.0/24"));
//! assert_eq!(normalize_address("<localsubnet>"), "*");
//! ```

use super::rule::{FirewallRule, ProfileMask, Protocol};
use ipnetwork::Ipv4Network;
use std::net::{IpAddr, Ipv4Addr};

/// Canonical marker for "no address restriction"
pub const UNRESTRICTED: &str = "*";

/// Address aliases the OS uses to mean "any remote address"
const ADDRESS_WILDCARDS: &[&str] = &["*", "any", "<localsubnet>", "localsubnet", "0.0.0.0"];

pub fn is_enabled(rule: &FirewallRule) -> bool {
    rule.enabled
}

/// Rules scoped to no profile (`0`) or to all profiles (`7`) apply everywhere.
pub fn is_profile_match(rule: &FirewallRule, profile: ProfileMask) -> bool {
    rule.profiles.is_empty()
        || rule.profiles == ProfileMask::ALL
        || rule.profiles.intersects(profile)
}

pub fn is_protocol_match(rule: &FirewallRule, protocol: Protocol) -> bool {
    rule.protocol == Protocol::Any || rule.protocol == protocol
}

fn is_port_wildcard(spec: &str) -> bool {
    let spec = spec.trim();
    spec.is_empty() || spec == "*" || spec.eq_ignore_ascii_case("any")
}

/// Returns `true` if `port` falls inside a rule port spec.
///
/// Accepted forms: wildcard (empty, `*`, `any`), single port, `low-high`
/// range, or a comma-separated list of those.
pub fn is_port_in_range(port: u16, spec: &str) -> bool {
    if is_port_wildcard(spec) {
        return true;
    }

    spec.split(',').any(|entry| {
        let entry = entry.trim();
        if is_port_wildcard(entry) {
            return true;
        }
        if let Some((low, high)) = entry.split_once('-') {
            match (low.trim().parse::<u16>(), high.trim().parse::<u16>()) {
                (Ok(low), Ok(high)) => low <= port && port <= high,
                _ => false,
            }
        } else {
            entry.parse::<u16>().is_ok_and(|p| p == port)
        }
    })
}

/// Maps wildcard aliases to [`UNRESTRICTED`]; any other address is returned trimmed.
///
/// Idempotent: `normalize_address(&normalize_address(x)) == normalize_address(x)`.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    if trimmed.is_empty()
        || ADDRESS_WILDCARDS
            .iter()
            .any(|w| trimmed.eq_ignore_ascii_case(w))
    {
        UNRESTRICTED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parses `a.b.c.d/len` or `a.b.c.d/m.m.m.m` into a network.
fn parse_ipv4_network(subnet: &str) -> Option<Ipv4Network> {
    let (addr, mask) = subnet.split_once('/')?;
    let addr: Ipv4Addr = addr.trim().parse().ok()?;
    let mask = mask.trim();

    if let Ok(prefix) = mask.parse::<u8>() {
        Ipv4Network::new(addr, prefix).ok()
    } else {
        let netmask: Ipv4Addr = mask.parse().ok()?;
        Ipv4Network::with_netmask(addr, netmask).ok()
    }
}

fn is_host_in_single(host: &str, entry: &str) -> bool {
    let entry = normalize_address(entry);
    if entry == UNRESTRICTED {
        return true;
    }

    if entry.contains('/') {
        let Some(network) = parse_ipv4_network(&entry) else {
            return false;
        };
        let Ok(host) = host.parse::<Ipv4Addr>() else {
            return false;
        };
        // Compare masked 32-bit values rather than trusting the rule's host bits
        let mask = u32::from(network.mask());
        return u32::from(host) & mask == u32::from(network.ip()) & mask;
    }

    match (host.parse::<IpAddr>(), entry.parse::<IpAddr>()) {
        (Ok(host), Ok(entry)) => host == entry,
        _ => host.eq_ignore_ascii_case(&entry),
    }
}

/// Returns `true` if `host` lies in a rule's remote address spec.
///
/// The spec may be a wildcard alias, a CIDR block, a single address, or a
/// comma-separated list of those. An invalid CIDR entry never matches.
pub fn is_host_in_subnet(host: &str, subnet: &str) -> bool {
    let subnet = normalize_address(subnet);
    if subnet == UNRESTRICTED {
        return true;
    }

    let host = normalize_address(host);
    subnet
        .split(',')
        .any(|entry| is_host_in_single(&host, entry))
}

/// Remote host and port both satisfy the rule; absent rule fields are unrestricted.
pub fn is_target_match(rule: &FirewallRule, target_host: &str, target_port: u16) -> bool {
    let address = normalize_address(rule.remote_address.as_deref().unwrap_or_default());
    let port_spec = rule.remote_port.as_deref().unwrap_or_default();

    is_host_in_subnet(target_host, &address) && is_port_in_range(target_port, port_spec)
}

fn normalize_path(path: &str) -> String {
    path.trim()
        .replace('\\', "/")
        .trim_end_matches('/')
        .to_lowercase()
}

/// Returns `true` if the rule is scoped to the given executable.
pub fn is_application_rule(rule: &FirewallRule, current_executable: &str) -> bool {
    match rule.application_name.as_deref().map(str::trim) {
        Some(app) if !app.is_empty() => normalize_path(app) == normalize_path(current_executable),
        _ => false,
    }
}
