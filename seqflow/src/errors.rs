//! Error types for the seqflow orchestrator.
//!
//! Every fatal condition the orchestrator can hit maps onto one variant of
//! [`SeqflowError`]. None of them are retried at the stage level: a failed
//! submission or an unreadable artifact aborts the whole run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for seqflow operations.
#[derive(Debug, Error)]
pub enum SeqflowError {
    /// The stage list for a unit is malformed.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A configuration input is missing or invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The scheduler refused or failed a submission.
    #[error("{0}")]
    Submission(#[from] SubmissionError),

    /// Waiting on a job ended in failure.
    #[error("{0}")]
    Monitor(#[from] MonitorError),

    /// A filesystem operation on a known path failed.
    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SeqflowError {
    /// Wraps an I/O error with the path that produced it.
    #[must_use]
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-002-UNKNOWN_UPSTREAM").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a stage list fails validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Configuration errors. All of them are raised before any job is built.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A required input file does not exist.
    #[error("Required file not found: {}", path.display())]
    MissingFile {
        /// The missing path.
        path: PathBuf,
    },

    /// A descriptor could not be parsed.
    #[error("Failed to parse {}: {message}", path.display())]
    Parse {
        /// The descriptor path.
        path: PathBuf,
        /// The parser message.
        message: String,
    },

    /// A required key is absent.
    #[error("Missing required configuration key: {key}")]
    MissingKey {
        /// The key name.
        key: String,
    },

    /// An enumerated value is not one of the supported variants.
    #[error("Unsupported value '{value}' for {field} (expected one of: {expected})")]
    UnsupportedValue {
        /// The field being parsed.
        field: String,
        /// The offending value.
        value: String,
        /// The accepted values.
        expected: String,
    },

    /// Another orchestrator already owns the output directory.
    #[error("Output directory is locked by another run ({owner}); remove {} if that run is gone", path.display())]
    Locked {
        /// The lock file.
        path: PathBuf,
        /// Contents of the lock file.
        owner: String,
    },
}

impl ConfigError {
    /// Creates an unsupported value error.
    #[must_use]
    pub fn unsupported(field: impl Into<String>, value: impl Into<String>, expected: &[&str]) -> Self {
        Self::UnsupportedValue {
            field: field.into(),
            value: value.into(),
            expected: expected.join(", "),
        }
    }

    /// Creates a missing key error.
    #[must_use]
    pub fn missing_key(key: impl Into<String>) -> Self {
        Self::MissingKey { key: key.into() }
    }
}

/// Errors raised while handing a script to the scheduler.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// The submission program could not be started.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        /// The program name.
        program: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The submission program exited unsuccessfully.
    #[error("Submission of {} failed (exit {code:?}): {stderr}", script.display())]
    Rejected {
        /// The script being submitted.
        script: PathBuf,
        /// Exit code, if any.
        code: Option<i32>,
        /// Captured stderr.
        stderr: String,
    },

    /// The scheduler answered with something that is not a job id.
    #[error("Could not parse job id from scheduler output: '{output}'")]
    UnparsableJobId {
        /// The raw output.
        output: String,
    },
}

/// Terminal failures of the job monitor.
#[derive(Debug, Clone, Error)]
pub enum MonitorError {
    /// Accounting stayed unreachable for too many consecutive polls.
    #[error("Job {job}: exceeded consecutive timeout budget ({attempts} consecutive accounting timeouts)")]
    TimeoutBudgetExceeded {
        /// The job handle.
        job: String,
        /// Consecutive timeouts observed.
        attempts: u32,
    },

    /// Accounting returned a state the monitor does not know.
    #[error("Job {job}: accounting output did not match any recognized state: '{output}'")]
    UnrecognizedState {
        /// The job handle.
        job: String,
        /// The raw accounting output.
        output: String,
    },

    /// The empty handle cannot be monitored.
    #[error("Cannot monitor a job that was never submitted")]
    NotSubmitted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("stage", "align");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.summary, "Test error");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("stage"), Some(&"align".to_string()));
    }

    #[test]
    fn test_validation_error_code() {
        let err = PipelineValidationError::new("bad graph")
            .with_stages(vec!["filter".to_string()])
            .with_error_info(ContractErrorInfo::new("GRAPH-002-UNKNOWN_UPSTREAM", "missing"));

        assert_eq!(err.code(), Some("GRAPH-002-UNKNOWN_UPSTREAM"));
        assert_eq!(err.stages, vec!["filter".to_string()]);
    }

    #[test]
    fn test_unsupported_value_message() {
        let err = ConfigError::unsupported("ref_type", "mm10", &["hg19", "hg38"]);
        let msg = err.to_string();
        assert!(msg.contains("mm10"));
        assert!(msg.contains("hg19, hg38"));
    }

    #[test]
    fn test_monitor_errors_are_wrapped() {
        let err: SeqflowError = MonitorError::TimeoutBudgetExceeded {
            job: "42".to_string(),
            attempts: 20,
        }
        .into();

        assert!(matches!(err, SeqflowError::Monitor(_)));
        assert!(err.to_string().contains("exceeded consecutive timeout budget"));
    }

    #[test]
    fn test_filesystem_error_mentions_path() {
        let err = SeqflowError::filesystem(
            "/data/out/logs",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/data/out/logs"));
    }
}
