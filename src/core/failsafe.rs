//! Fail-safe defaults for environment queries
//!
//! When the rule source cannot answer a query, the engine substitutes the
//! value from this table instead of propagating the failure. Keeping every
//! fallback in one struct lets tests (and `fwcheck status`) show all of them
//! at once.
//!
//! | Query              | Default   |
//! |--------------------|-----------|
//! | firewall state     | enabled   |
//! | current profiles   | Private   |
//! | interface profile  | Private   |
//! | best interface     | 0 (unknown) |
//! | default action     | Block     |

use super::rule::ProfileMask;
use serde::{Deserialize, Serialize};

/// Interface index meaning "could not be resolved"
pub const UNKNOWN_INTERFACE: u32 = 0;

/// Environment queries the engine makes against a rule source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum Query {
    #[strum(serialize = "rule enumeration")]
    Rules,
    #[strum(serialize = "firewall state")]
    FirewallState,
    #[strum(serialize = "current profiles")]
    CurrentProfiles,
    #[strum(serialize = "interface profile")]
    InterfaceProfile,
    #[strum(serialize = "best interface")]
    BestInterface,
    #[strum(serialize = "default action")]
    DefaultAction,
}

/// Values substituted when a query fails
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FailSafePolicy {
    pub firewall_enabled: bool,
    pub current_profiles: ProfileMask,
    pub interface_profile: ProfileMask,
    pub interface_index: u32,
    pub default_action_allowed: bool,
}

impl Default for FailSafePolicy {
    fn default() -> Self {
        Self {
            firewall_enabled: true,
            current_profiles: ProfileMask::PRIVATE,
            interface_profile: ProfileMask::PRIVATE,
            interface_index: UNKNOWN_INTERFACE,
            default_action_allowed: false,
        }
    }
}

impl FailSafePolicy {
    /// Renders the fallback for a query, for logs and status output.
    ///
    /// Rule enumeration has no fallback: the analyzer turns it into a safe deny.
    pub fn describe(&self, query: Query) -> String {
        match query {
            Query::Rules => "safe deny".to_string(),
            Query::FirewallState => {
                if self.firewall_enabled { "enabled" } else { "disabled" }.to_string()
            }
            Query::CurrentProfiles => self.current_profiles.name().to_string(),
            Query::InterfaceProfile => self.interface_profile.name().to_string(),
            Query::BestInterface => self.interface_index.to_string(),
            Query::DefaultAction => {
                if self.default_action_allowed { "Allow" } else { "Block" }.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_default_table() {
        let policy = FailSafePolicy::default();
        assert!(policy.firewall_enabled);
        assert_eq!(policy.current_profiles, ProfileMask::PRIVATE);
        assert_eq!(policy.interface_profile, ProfileMask::PRIVATE);
        assert_eq!(policy.interface_index, UNKNOWN_INTERFACE);
        assert!(!policy.default_action_allowed);
    }

    #[test]
    fn test_describe_covers_every_query() {
        let policy = FailSafePolicy::default();
        let described: Vec<(String, String)> = Query::iter()
            .map(|q| (q.to_string(), policy.describe(q)))
            .collect();
        assert_eq!(
            described,
            vec![
                ("rule enumeration".to_string(), "safe deny".to_string()),
                ("firewall state".to_string(), "enabled".to_string()),
                ("current profiles".to_string(), "Private".to_string()),
                ("interface profile".to_string(), "Private".to_string()),
                ("best interface".to_string(), "0".to_string()),
                ("default action".to_string(), "Block".to_string()),
            ]
        );
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let policy: FailSafePolicy =
            serde_json::from_str(r#"{"current_profiles": 4}"#).unwrap();
        assert_eq!(policy.current_profiles, ProfileMask::PUBLIC);
        assert_eq!(policy.interface_profile, ProfileMask::PRIVATE);
        assert!(policy.firewall_enabled);
    }
}
