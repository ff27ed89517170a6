//! Core rule evaluation
//!
//! This module contains the typed rule model and the three evaluation layers:
//!
//! - [`rule`]: Directions, actions, protocols, profiles and the rule record
//! - [`matcher`]: Pure predicates matching one rule against a connection
//! - [`source`]: The [`source::RuleSource`] abstraction and raw-rule mapping
//! - [`failsafe`]: Values substituted when an environment query fails
//! - [`engine`]: Relevant-rule filtering and environment queries
//! - [`analyzer`]: Precedence, verdicts and evidence
//! - [`snapshot`]: JSON policy snapshot rule source
//! - [`error`]: Error types for evaluation

pub mod analyzer;
pub mod engine;
pub mod error;
pub mod failsafe;
pub mod matcher;
pub mod rule;
pub mod snapshot;
pub mod source;

#[cfg(test)]
pub mod test_helpers;
