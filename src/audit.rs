//! Analysis history
//!
//! Opt-in JSON-lines record of every verdict, so a diagnostic run can be
//! compared with earlier ones. Writing the history never affects a verdict:
//! failures are logged and swallowed.

use crate::core::analyzer::FirewallAnalysisResult;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Types of recorded events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Policy verdict
    Verdict,
    /// Safe deny after a failed evaluation
    SafeDeny,
}

/// A single history entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisEvent {
    /// When the analysis ran (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,

    pub analysis_id: Uuid,

    pub event_type: EventType,

    /// Verdict reported to the caller
    pub allowed: bool,

    /// Connection and evidence summary
    pub details: serde_json::Value,

    /// Error message if evaluation failed
    pub error: Option<String>,
}

impl AnalysisEvent {
    pub fn from_result(result: &FirewallAnalysisResult) -> Self {
        Self {
            timestamp: result.analyzed_at,
            analysis_id: result.analysis_id,
            event_type: if result.is_failure() {
                EventType::SafeDeny
            } else {
                EventType::Verdict
            },
            allowed: result.is_allowed,
            details: serde_json::json!({
                "direction": result.direction,
                "protocol": result.protocol.to_string(),
                "profile": result.profile_name,
                "reason": result.reason,
                "deciding_rule": result.deciding_rule,
                "relevant_rules": result.relevant_rules.len(),
            }),
            error: result.error.clone(),
        }
    }
}

/// History log writer
pub struct AnalysisLog {
    log_path: PathBuf,
}

impl AnalysisLog {
    /// Opens the history in the state directory
    ///
    /// # Errors
    ///
    /// Returns `Err` if state directory cannot be determined
    pub fn new() -> std::io::Result<Self> {
        let mut log_path = crate::utils::get_state_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "State directory not found")
        })?;
        log_path.push("history.jsonl");

        Ok(Self { log_path })
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: path.into(),
        }
    }

    /// Appends an event as one JSON line
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be opened or written
    pub fn append(&self, event: &AnalysisEvent) -> std::io::Result<()> {
        let json = serde_json::to_string(event)?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;

        Ok(())
    }

    /// Reads the most recent events, newest first
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be read
    pub fn read_recent(&self, count: usize) -> std::io::Result<Vec<AnalysisEvent>> {
        let content = std::fs::read_to_string(&self.log_path)?;

        let events: Vec<AnalysisEvent> = content
            .lines()
            .rev()
            .filter_map(|line| serde_json::from_str(line).ok())
            .take(count)
            .collect();

        Ok(events)
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}

/// Records a verdict in the default history, logging (not returning) failures
pub fn record(result: &FirewallAnalysisResult) {
    match AnalysisLog::new() {
        Ok(log) => {
            if let Err(e) = log.append(&AnalysisEvent::from_result(result)) {
                tracing::warn!("Failed to write analysis history: {}", e);
            }
        }
        Err(e) => tracing::warn!("Analysis history unavailable: {}", e),
    }
}
