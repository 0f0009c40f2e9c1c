//! Job status and run phase enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The observed status of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in the queue.
    Pending,
    /// Job is currently running.
    Running,
    /// Job completed successfully.
    Succeeded,
    /// Job failed, or could not be observed.
    Failed,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl JobStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Lifecycle phase of one pipeline invocation.
///
/// `Init -> Building -> Aggregating -> Metrics -> (Waiting | Done)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Configuration loaded, nothing built yet.
    Init,
    /// Stage chains are being built per unit.
    Building,
    /// Aggregation and cleanup jobs are being submitted.
    Aggregating,
    /// The job-metrics job is being submitted.
    Metrics,
    /// Blocking on the job-metrics job.
    Waiting,
    /// Run finished normally.
    Done,
}

impl Default for RunPhase {
    fn default() -> Self {
        Self::Init
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::Building => write!(f, "BUILDING"),
            Self::Aggregating => write!(f, "AGGREGATING"),
            Self::Metrics => write!(f, "METRICS"),
            Self::Waiting => write!(f, "WAITING"),
            Self::Done => write!(f, "DONE"),
        }
    }
}

impl RunPhase {
    /// Returns true if `next` is a legal successor of this phase.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Building)
                | (Self::Building, Self::Aggregating)
                | (Self::Aggregating, Self::Metrics)
                | (Self::Metrics, Self::Waiting | Self::Done)
                | (Self::Waiting, Self::Done)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_display() {
        assert_eq!(JobStatus::Succeeded.to_string(), "succeeded");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
        assert_eq!(JobStatus::Pending.to_string(), "pending");
    }

    #[test]
    fn test_job_status_is_terminal() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn test_run_phase_transitions() {
        assert!(RunPhase::Init.can_advance_to(RunPhase::Building));
        assert!(RunPhase::Metrics.can_advance_to(RunPhase::Waiting));
        assert!(RunPhase::Metrics.can_advance_to(RunPhase::Done));
        assert!(!RunPhase::Init.can_advance_to(RunPhase::Done));
        assert!(!RunPhase::Done.can_advance_to(RunPhase::Building));
    }

    #[test]
    fn test_run_phase_serialize() {
        let json = serde_json::to_string(&RunPhase::Aggregating).unwrap();
        assert_eq!(json, r#""aggregating""#);
        assert_eq!(RunPhase::Aggregating.to_string(), "AGGREGATING");
    }
}
