//! fwcheck - host firewall policy analyzer
//!
//! Answers "would the host firewall allow this connection?" from a read-only
//! view of the policy, and explains which rules decided it.
//!
//! # Architecture
//!
//! - [`core`] - Rule model, matching, engine and analyzer
//! - [`audit`] - Opt-in history of analysis verdicts
//! - [`validators`] - Input validation for hosts and ports
//! - [`config`] - Configuration persistence
//! - [`utils`] - Utility functions (XDG directories, etc.)
//!
//! # Safety Features
//!
//! - Safe deny when the rule set cannot be read
//! - Centralized fail-safe defaults for every environment query
//! - Block rules always win over Allow rules
//! - Atomic file operations with secure permissions
//!
//! # Examples
//!
//! ```
//! use fwcheck::core::snapshot::{PolicySnapshot, SnapshotSource};
//! use fwcheck::{ConnectionAttempt, FirewallAnalyzer};
//!
//! let analyzer = FirewallAnalyzer::new(SnapshotSource::from_snapshot(PolicySnapshot::default()));
//! let result = analyzer.analyze(&ConnectionAttempt::outbound("UDP", "192.168.1.50", "21412"));
//! // No rules: the Private profile's default outbound action (Allow) applies
//! assert!(result.is_allowed);
//! ```

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::analyzer::{ConnectionAttempt, FirewallAnalysisResult, FirewallAnalyzer};
pub use core::error::{Error, Result};
pub use core::rule::FirewallRule;
pub use core::source::RuleSource;
