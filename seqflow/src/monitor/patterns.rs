//! Classification of scheduler accounting output.

use regex::Regex;
use std::sync::OnceLock;

/// `COMPLETED`, but not `COMPLETING`.
pub const COMPLETED_PATTERN: &str = r"\bCOMPLETED\b";
/// States of a job that has not finished yet.
pub const ACTIVE_PATTERN: &str =
    r"\b(PENDING|RUNNING|REQUEUED|CONFIGURING|COMPLETING|RESIZING|SUSPENDED)\b";
/// Connectivity failures between `sacct` and the controller/database.
pub const TRANSIENT_PATTERN: &str = r"(?i)(connection timed out|socket timed out|unable to contact slurm controller|slurm_load_jobs error|slurmdbd: .*(timeout|connection))";

/// What one accounting response says about a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountingState {
    /// Finished successfully.
    Completed,
    /// Still queued or running.
    Active,
    /// Accounting could not be reached this time.
    Transient,
    /// Anything else, including failed and cancelled states.
    Unrecognized,
}

/// The regexes used to classify accounting output.
#[derive(Debug, Clone)]
pub struct AccountingPatterns {
    completed: Regex,
    active: Regex,
    transient: Regex,
}

impl AccountingPatterns {
    /// Compiles custom patterns.
    pub fn new(completed: &str, active: &str, transient: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            completed: Regex::new(completed)?,
            active: Regex::new(active)?,
            transient: Regex::new(transient)?,
        })
    }

    /// Classifies one response. Checked in order: completed, transient, active.
    #[must_use]
    pub fn classify(&self, response: &str) -> AccountingState {
        if self.completed.is_match(response) {
            AccountingState::Completed
        } else if self.transient.is_match(response) {
            AccountingState::Transient
        } else if self.active.is_match(response) {
            AccountingState::Active
        } else {
            AccountingState::Unrecognized
        }
    }
}

impl Default for AccountingPatterns {
    // The built-in patterns are literals covered by tests.
    #[allow(clippy::expect_used)]
    fn default() -> Self {
        static SLURM: OnceLock<AccountingPatterns> = OnceLock::new();
        SLURM
            .get_or_init(|| {
                Self::new(COMPLETED_PATTERN, ACTIVE_PATTERN, TRANSIENT_PATTERN)
                    .expect("built-in accounting patterns compile")
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_patterns_compile() {
        assert!(AccountingPatterns::new(COMPLETED_PATTERN, ACTIVE_PATTERN, TRANSIENT_PATTERN).is_ok());
    }

    #[test]
    fn test_classify() {
        let patterns = AccountingPatterns::default();
        assert_eq!(patterns.classify("COMPLETED"), AccountingState::Completed);
        assert_eq!(patterns.classify("RUNNING"), AccountingState::Active);
        assert_eq!(patterns.classify("PENDING"), AccountingState::Active);
        assert_eq!(patterns.classify("COMPLETING"), AccountingState::Active);
        assert_eq!(
            patterns.classify("sacct: error: slurm_persist_conn_open_without_init: failed to open persistent connection to host:slurmdb:6819: Connection timed out"),
            AccountingState::Transient
        );
        assert_eq!(patterns.classify("FAILED"), AccountingState::Unrecognized);
        assert_eq!(patterns.classify("CANCELLED by 0"), AccountingState::Unrecognized);
        assert_eq!(patterns.classify(""), AccountingState::Unrecognized);
    }
}
