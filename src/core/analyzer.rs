//! Connection verdicts
//!
//! The analyzer turns a caller's description of a connection attempt into a
//! single allow/deny verdict plus the evidence behind it:
//!
//! 1. Resolve the environment: firewall state, best interface for the remote
//!    host, and that interface's profile.
//! 2. Resolve both default actions for the profile.
//! 3. Classify the attempt: inbound iff a local port was given; `TCP`/`UDP`
//!    map to their protocol numbers, anything else to Any.
//! 4. Ask the engine for the relevant rules.
//! 5. Apply precedence: firewall off allows everything; otherwise any Block
//!    rule denies, any Allow rule allows, and no rules means the default action.
//!
//! Block beats Allow unconditionally; rules are not ranked by specificity.
//!
//! If the rules cannot be enumerated or the attempt cannot be parsed, the
//! result is a safe deny with [`FirewallAnalysisResult::error`] set. Nothing
//! escapes [`FirewallAnalyzer::analyze`] as an error.

use super::engine::{ConnectionDescriptor, EngineConfig, FirewallEngine};
use super::error::Result;
use super::failsafe::UNKNOWN_INTERFACE;
use super::matcher::is_application_rule;
use super::rule::{Action, Direction, FirewallRule, ProfileMask, Protocol};
use super::source::RuleSource;
use crate::validators::{parse_optional_port, validate_host};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

/// A connection attempt as a caller describes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionAttempt {
    /// `"TCP"`, `"UDP"`, or anything else for Any
    pub protocol: String,
    pub remote_host: String,
    /// Port on the remote side; empty or `*` means any port
    pub remote_port: String,
    /// Local listening port; present only for inbound analysis
    #[serde(default)]
    pub local_port: Option<String>,
}

impl ConnectionAttempt {
    pub fn outbound(
        protocol: impl Into<String>,
        remote_host: impl Into<String>,
        remote_port: impl Into<String>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            remote_host: remote_host.into(),
            remote_port: remote_port.into(),
            local_port: None,
        }
    }

    pub fn inbound(
        protocol: impl Into<String>,
        remote_host: impl Into<String>,
        remote_port: impl Into<String>,
        local_port: impl Into<String>,
    ) -> Self {
        Self {
            local_port: Some(local_port.into()),
            ..Self::outbound(protocol, remote_host, remote_port)
        }
    }

    pub fn direction(&self) -> Direction {
        if self.local_port.is_some() {
            Direction::Inbound
        } else {
            Direction::Outbound
        }
    }

    pub fn protocol(&self) -> Protocol {
        Protocol::from_name(&self.protocol)
    }
}

/// Why a verdict came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum VerdictReason {
    #[strum(serialize = "firewall disabled")]
    FirewallDisabled,
    #[strum(serialize = "default action")]
    DefaultAction,
    #[strum(serialize = "block rule")]
    BlockRule,
    #[strum(serialize = "allow rule")]
    AllowRule,
    #[strum(serialize = "evaluation failed")]
    EvaluationFailed,
}

/// Outcome of the precedence step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: VerdictReason,
    /// Index into the relevant rules of the rule that decided the verdict
    pub deciding_rule: Option<usize>,
}

/// Applies the precedence model to an already-filtered rule set.
pub fn evaluate(firewall_enabled: bool, rules: &[FirewallRule], default_allowed: bool) -> Verdict {
    if !firewall_enabled {
        return Verdict {
            allowed: true,
            reason: VerdictReason::FirewallDisabled,
            deciding_rule: None,
        };
    }

    let relevant = |action: Action| {
        rules
            .iter()
            .position(|rule| rule.enabled && rule.action == action)
    };

    if let Some(index) = relevant(Action::Block) {
        Verdict {
            allowed: false,
            reason: VerdictReason::BlockRule,
            deciding_rule: Some(index),
        }
    } else if let Some(index) = relevant(Action::Allow) {
        Verdict {
            allowed: true,
            reason: VerdictReason::AllowRule,
            deciding_rule: Some(index),
        }
    } else {
        Verdict {
            allowed: default_allowed,
            reason: VerdictReason::DefaultAction,
            deciding_rule: None,
        }
    }
}

/// Verdict and evidence for one analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallAnalysisResult {
    pub analysis_id: Uuid,
    pub analyzed_at: DateTime<Utc>,
    pub is_allowed: bool,
    pub reason: VerdictReason,
    /// Rules that matched, in enumeration order
    pub relevant_rules: Vec<FirewallRule>,
    /// Name of the rule that decided the verdict, if any
    pub deciding_rule: Option<String>,
    /// Relevant rules scoped to the running executable
    pub self_rules: Vec<String>,
    /// Default action for the classified direction
    pub default_action_allowed: bool,
    pub default_inbound_allowed: bool,
    pub default_outbound_allowed: bool,
    pub direction: Direction,
    pub protocol: Protocol,
    pub profile: ProfileMask,
    pub profile_name: String,
    pub firewall_enabled: bool,
    pub interface_index: u32,
    /// Set when the verdict is a safe deny because evaluation failed
    pub error: Option<String>,
}

impl FirewallAnalysisResult {
    /// Safe-deny result for an analysis that could not be completed.
    pub fn safe_deny(attempt: &ConnectionAttempt, message: impl Into<String>) -> Self {
        Self {
            analysis_id: Uuid::new_v4(),
            analyzed_at: Utc::now(),
            is_allowed: false,
            reason: VerdictReason::EvaluationFailed,
            relevant_rules: Vec::new(),
            deciding_rule: None,
            self_rules: Vec::new(),
            default_action_allowed: false,
            default_inbound_allowed: false,
            default_outbound_allowed: false,
            direction: attempt.direction(),
            protocol: attempt.protocol(),
            profile: ProfileMask::NONE,
            profile_name: ProfileMask::NONE.name().to_string(),
            firewall_enabled: true,
            interface_index: UNKNOWN_INTERFACE,
            error: Some(message.into()),
        }
    }

    /// `true` if this is a safe deny rather than a policy verdict.
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Produces allow/deny verdicts from a rule source
#[derive(Debug, Clone)]
pub struct FirewallAnalyzer<S> {
    engine: FirewallEngine<S>,
    current_executable: Option<String>,
}

impl<S: RuleSource> FirewallAnalyzer<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, EngineConfig::default())
    }

    pub fn with_config(source: S, config: EngineConfig) -> Self {
        Self {
            engine: FirewallEngine::with_config(source, config),
            current_executable: crate::utils::current_executable(),
        }
    }

    /// Overrides the executable path used to flag self-relevant rules.
    pub fn with_executable(mut self, path: Option<String>) -> Self {
        self.current_executable = path;
        self
    }

    pub fn engine(&self) -> &FirewallEngine<S> {
        &self.engine
    }

    /// Evaluates one connection attempt. Never fails: errors become a safe deny.
    pub fn analyze(&self, attempt: &ConnectionAttempt) -> FirewallAnalysisResult {
        match self.try_analyze(attempt) {
            Ok(result) => {
                info!(
                    "{} {} {}:{} -> {} ({}, {} relevant rule(s), profile {})",
                    result.direction,
                    result.protocol,
                    attempt.remote_host,
                    attempt.remote_port,
                    if result.is_allowed { "allowed" } else { "blocked" },
                    result.reason,
                    result.relevant_rules.len(),
                    result.profile_name
                );
                result
            }
            Err(e) => {
                error!(
                    "Firewall analysis failed for {} {}:{}: {e}",
                    attempt.protocol, attempt.remote_host, attempt.remote_port
                );
                FirewallAnalysisResult::safe_deny(attempt, e.to_string())
            }
        }
    }

    fn try_analyze(&self, attempt: &ConnectionAttempt) -> Result<FirewallAnalysisResult> {
        let direction = attempt.direction();
        let protocol = attempt.protocol();
        let remote_host = validate_host(&attempt.remote_host)?;
        let remote_port = parse_optional_port(&attempt.remote_port, "remote_port")?;
        let local_port = match &attempt.local_port {
            Some(port) => parse_optional_port(port, "local_port")?,
            None => None,
        };

        let firewall_enabled = self.engine.firewall_state();
        let interface_index = self.engine.best_interface(&remote_host);
        let profile = self.engine.resolve_profile(interface_index);

        let default_inbound_allowed = self.engine.default_action(Direction::Inbound, profile);
        let default_outbound_allowed = self.engine.default_action(Direction::Outbound, profile);
        let default_action_allowed = match direction {
            Direction::Inbound => default_inbound_allowed,
            Direction::Outbound => default_outbound_allowed,
        };

        let connection = ConnectionDescriptor::new(direction, protocol, profile)
            .with_remote_host(Some(remote_host))
            .with_remote_port(remote_port)
            .with_local_port(local_port);
        let relevant_rules = self.engine.relevant_rules(&connection)?;

        let verdict = evaluate(firewall_enabled, &relevant_rules, default_action_allowed);

        let self_rules = self
            .current_executable
            .as_deref()
            .map(|exe| {
                relevant_rules
                    .iter()
                    .filter(|rule| is_application_rule(rule, exe))
                    .map(|rule| rule.name.clone())
                    .collect()
            })
            .unwrap_or_default();

        Ok(FirewallAnalysisResult {
            analysis_id: Uuid::new_v4(),
            analyzed_at: Utc::now(),
            is_allowed: verdict.allowed,
            reason: verdict.reason,
            deciding_rule: verdict
                .deciding_rule
                .map(|index| relevant_rules[index].name.clone()),
            relevant_rules,
            self_rules,
            default_action_allowed,
            default_inbound_allowed,
            default_outbound_allowed,
            direction,
            protocol,
            profile,
            profile_name: profile.name().to_string(),
            firewall_enabled,
            interface_index,
            error: None,
        })
    }
}
