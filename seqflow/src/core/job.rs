//! Job handles and submission records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Opaque scheduler job id.
///
/// The empty handle means "not submitted". It is a dependency no-op: it is
/// filtered out before any dependency expression is encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    /// Wraps a scheduler-assigned id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    /// The "not submitted" handle.
    #[must_use]
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Returns true if this is the "not submitted" handle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Collects the non-empty handles, preserving order and dropping duplicates.
    #[must_use]
    pub fn submitted<'a>(handles: impl IntoIterator<Item = &'a Self>) -> Vec<Self> {
        let mut out: Vec<Self> = Vec::new();
        for handle in handles {
            if !handle.is_empty() && !out.contains(handle) {
                out.push(handle.clone());
            }
        }
        out
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "<none>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// What role a job plays in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Cohort-level preparation shared by every unit.
    Prerequisite,
    /// A per-unit analysis stage.
    Stage,
    /// The cohort-level fan-in.
    Aggregate,
    /// Per-unit removal of intermediates.
    Cleanup,
    /// Final scheduler accounting.
    Metrics,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prerequisite => write!(f, "prerequisite"),
            Self::Stage => write!(f, "stage"),
            Self::Aggregate => write!(f, "aggregate"),
            Self::Cleanup => write!(f, "cleanup"),
            Self::Metrics => write!(f, "metrics"),
        }
    }
}

/// A job as handed to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Stage name.
    pub stage: String,
    /// Owning unit, if per-unit.
    pub unit: Option<String>,
    /// What the job does in the run.
    pub kind: JobKind,
    /// Handle returned by the scheduler (empty in dry-run).
    pub handle: JobHandle,
    /// Upstream handles encoded at submission.
    pub dependencies: Vec<JobHandle>,
    /// Whether upstream failures cancel this job.
    pub kill_on_error: bool,
    /// Rendered script.
    pub script: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_handle() {
        let handle = JobHandle::empty();
        assert!(handle.is_empty());
        assert_eq!(handle.to_string(), "<none>");
        assert_eq!(JobHandle::default(), handle);
    }

    #[test]
    fn test_handle_trims_scheduler_output() {
        let handle = JobHandle::new("12345\n");
        assert_eq!(handle.as_str(), "12345");
        assert!(!handle.is_empty());
    }

    #[test]
    fn test_submitted_filters_empty_and_duplicates() {
        let handles = vec![
            JobHandle::new("1"),
            JobHandle::empty(),
            JobHandle::new("2"),
            JobHandle::new("1"),
        ];
        let submitted = JobHandle::submitted(&handles);
        assert_eq!(submitted, vec![JobHandle::new("1"), JobHandle::new("2")]);
    }

    #[test]
    fn test_handle_serializes_as_string() {
        let json = serde_json::to_string(&JobHandle::new("77")).unwrap();
        assert_eq!(json, r#""77""#);
    }
}
