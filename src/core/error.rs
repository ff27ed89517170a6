use thiserror::Error;

/// Core error types for fwcheck
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The rule source could not answer a query
    #[error("Rule source error: {0}")]
    Source(#[from] SourceError),

    /// Input validation failed
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// Configuration could not be located or persisted
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Failures reported by a [`RuleSource`](crate::core::source::RuleSource)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Firewall service unavailable: {0}")]
    Unavailable(String),

    #[error("Access denied while querying {0}")]
    AccessDenied(String),

    #[error("Query '{query}' failed: {message}")]
    Query { query: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl SourceError {
    pub fn query(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            query: query.into(),
            message: message.into(),
        }
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Known rule source failure patterns and their translations
pub struct SourceErrorPattern;

impl SourceErrorPattern {
    /// Matches an error message against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        if lower.contains("access denied") || lower.contains("permission denied") {
            return ErrorTranslation::new("Insufficient permissions to read the firewall policy")
                .with_suggestion("Run the diagnostic from an account allowed to read firewall rules")
                .with_suggestion("Check that the snapshot file is readable by the current user");
        }

        if lower.contains("unavailable") || lower.contains("not running") {
            return ErrorTranslation::new("The firewall service could not be queried")
                .with_suggestion("Verify the firewall service is running")
                .with_suggestion("The verdict was reported as blocked because nothing could be checked");
        }

        if lower.contains("no such file") || lower.contains("not found") {
            return ErrorTranslation::new("Policy snapshot not found")
                .with_suggestion("Pass --snapshot <FILE> or set snapshot_path in the config")
                .with_suggestion("Run `fwcheck config --init` to write a default config");
        }

        if lower.contains("json") || lower.contains("expected") {
            return ErrorTranslation::new("Policy snapshot is malformed")
                .with_suggestion("Re-capture the snapshot; the file must be a single JSON object")
                .with_suggestion("Rule profile masks must be integers (Domain=1, Private=2, Public=4)");
        }

        ErrorTranslation::new(format!("Firewall query failed: {msg}"))
            .with_suggestion("Re-run with --verbose and check the log for the failing query")
    }
}

pub type Result<T> = std::result::Result<T, Error>;
