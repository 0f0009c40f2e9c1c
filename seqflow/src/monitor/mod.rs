//! Job monitor: polls accounting until a job is terminal.
//!
//! States are `POLLING`, `SUCCEEDED` and `FAILED`. Each interval the monitor
//! queries accounting once and applies these rules:
//!
//! - completed → `SUCCEEDED`
//! - transient connectivity error → count it; at the budget → `FAILED`
//! - pending/running → reset the transient count, keep polling
//! - anything else → `FAILED`, no retry
//!
//! The wait between polls is a cooperative `tokio` sleep taken before every
//! query, so polling always consumes `interval × polls` of wall-clock time.

mod patterns;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::{JobHandle, JobStatus};
use crate::errors::{MonitorError, SeqflowError};
use crate::scheduler::SchedulerClient;

pub use patterns::{
    AccountingPatterns, AccountingState, ACTIVE_PATTERN, COMPLETED_PATTERN, TRANSIENT_PATTERN,
};

/// Default seconds between accounting queries.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
/// Default consecutive transient failures tolerated.
pub const DEFAULT_TIMEOUT_BUDGET: u32 = 20;

/// Polling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Wait before each accounting query.
    pub poll_interval: Duration,
    /// Consecutive transient errors that end in failure.
    pub max_consecutive_timeouts: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_consecutive_timeouts: DEFAULT_TIMEOUT_BUDGET,
        }
    }
}

impl MonitorConfig {
    /// Creates the default configuration (30 s, 20 timeouts).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the transient failure budget.
    #[must_use]
    pub fn with_timeout_budget(mut self, budget: u32) -> Self {
        self.max_consecutive_timeouts = budget.max(1);
        self
    }
}

/// Monitor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Keep querying.
    Polling,
    /// Terminal success.
    Succeeded,
    /// Terminal failure.
    Failed,
}

/// The pure state machine behind [`JobMonitor`].
#[derive(Debug, Clone)]
pub struct PollTracker {
    job: JobHandle,
    budget: u32,
    consecutive_timeouts: u32,
    polls: u32,
    state: PollState,
    failure: Option<MonitorError>,
}

impl PollTracker {
    /// Starts tracking a job.
    #[must_use]
    pub fn new(job: JobHandle, budget: u32) -> Self {
        Self {
            job,
            budget,
            consecutive_timeouts: 0,
            polls: 0,
            state: PollState::Polling,
            failure: None,
        }
    }

    /// Applies one classified response and returns the new state.
    ///
    /// Responses after a terminal state are ignored.
    pub fn observe(&mut self, classified: AccountingState, raw: &str) -> PollState {
        if self.state != PollState::Polling {
            return self.state;
        }
        self.polls += 1;

        match classified {
            AccountingState::Completed => self.state = PollState::Succeeded,
            AccountingState::Transient => {
                self.consecutive_timeouts += 1;
                if self.consecutive_timeouts >= self.budget {
                    self.fail(MonitorError::TimeoutBudgetExceeded {
                        job: self.job.to_string(),
                        attempts: self.consecutive_timeouts,
                    });
                }
            }
            AccountingState::Active => self.consecutive_timeouts = 0,
            AccountingState::Unrecognized => self.fail(MonitorError::UnrecognizedState {
                job: self.job.to_string(),
                output: raw.trim().to_string(),
            }),
        }
        self.state
    }

    fn fail(&mut self, err: MonitorError) {
        self.state = PollState::Failed;
        self.failure = Some(err);
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PollState {
        self.state
    }

    /// Queries applied so far.
    #[must_use]
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Current run of transient errors.
    #[must_use]
    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    /// The failure, once `FAILED`.
    #[must_use]
    pub fn failure(&self) -> Option<&MonitorError> {
        self.failure.as_ref()
    }
}

/// A job that reached `SUCCEEDED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    /// The job.
    pub job: JobHandle,
    /// Terminal status.
    pub status: JobStatus,
    /// Accounting queries taken.
    pub polls: u32,
}

/// Blocks on scheduler accounting until a job is terminal.
#[derive(Debug, Clone)]
pub struct JobMonitor {
    client: SchedulerClient,
    config: MonitorConfig,
    patterns: AccountingPatterns,
}

impl JobMonitor {
    /// Creates a monitor with the built-in Slurm patterns.
    #[must_use]
    pub fn new(client: SchedulerClient, config: MonitorConfig) -> Self {
        Self {
            client,
            config,
            patterns: AccountingPatterns::default(),
        }
    }

    /// Replaces the accounting patterns.
    #[must_use]
    pub fn with_patterns(mut self, patterns: AccountingPatterns) -> Self {
        self.patterns = patterns;
        self
    }

    /// Polls until `job` succeeds or fails.
    ///
    /// # Errors
    ///
    /// `MonitorError` when the job fails, accounting stays unreachable past
    /// the budget, or the output is unrecognized; I/O errors if the query
    /// itself cannot run.
    pub async fn await_terminal(&self, job: &JobHandle) -> Result<JobOutcome, SeqflowError> {
        if job.is_empty() {
            return Err(MonitorError::NotSubmitted.into());
        }

        let mut tracker = PollTracker::new(job.clone(), self.config.max_consecutive_timeouts);
        tracing::info!(job_id = %job, interval_secs = self.config.poll_interval.as_secs(), "Waiting for job");

        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            let response = self.client.query(job).await?;
            let classified = self.patterns.classify(&response);

            match tracker.observe(classified, &response) {
                PollState::Polling => {
                    if classified == AccountingState::Transient {
                        tracing::warn!(
                            job_id = %job,
                            consecutive = tracker.consecutive_timeouts(),
                            budget = self.config.max_consecutive_timeouts,
                            "Accounting unreachable, retrying"
                        );
                    } else {
                        tracing::debug!(job_id = %job, state = %response.trim(), "Job still active");
                    }
                }
                PollState::Succeeded => {
                    tracing::info!(job_id = %job, polls = tracker.polls(), "Job completed");
                    return Ok(JobOutcome {
                        job: job.clone(),
                        status: JobStatus::Succeeded,
                        polls: tracker.polls(),
                    });
                }
                PollState::Failed => {
                    let err = tracker
                        .failure()
                        .cloned()
                        .unwrap_or(MonitorError::UnrecognizedState {
                            job: job.to_string(),
                            output: response.clone(),
                        });
                    tracing::error!(job_id = %job, error = %err, "Job did not complete");
                    return Err(err.into());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBackend;
    use std::sync::Arc;

    fn monitor(backend: Arc<RecordingBackend>) -> JobMonitor {
        JobMonitor::new(
            SchedulerClient::new(backend),
            MonitorConfig::new().with_poll_interval(Duration::ZERO),
        )
    }

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.max_consecutive_timeouts, 20);
    }

    #[test]
    fn test_tracker_resets_timeouts_on_activity() {
        let mut tracker = PollTracker::new(JobHandle::new("1"), 3);
        tracker.observe(AccountingState::Transient, "Connection timed out");
        tracker.observe(AccountingState::Transient, "Connection timed out");
        assert_eq!(tracker.consecutive_timeouts(), 2);

        tracker.observe(AccountingState::Active, "RUNNING");
        assert_eq!(tracker.consecutive_timeouts(), 0);

        tracker.observe(AccountingState::Transient, "Connection timed out");
        tracker.observe(AccountingState::Transient, "Connection timed out");
        assert_eq!(tracker.state(), PollState::Polling);
        assert_eq!(tracker.observe(AccountingState::Transient, "Connection timed out"), PollState::Failed);
    }

    #[test]
    fn test_tracker_ignores_input_after_terminal() {
        let mut tracker = PollTracker::new(JobHandle::new("1"), 20);
        tracker.observe(AccountingState::Completed, "COMPLETED");
        assert_eq!(tracker.observe(AccountingState::Unrecognized, "FAILED"), PollState::Succeeded);
        assert_eq!(tracker.polls(), 1);
    }

    #[tokio::test]
    async fn test_running_then_completed_takes_six_polls() {
        let backend = Arc::new(
            RecordingBackend::new()
                .with_responses(["RUNNING", "RUNNING", "RUNNING", "RUNNING", "RUNNING", "COMPLETED"]),
        );
        let outcome = monitor(backend.clone())
            .await_terminal(&JobHandle::new("1000"))
            .await
            .unwrap();

        assert_eq!(outcome.status, JobStatus::Succeeded);
        assert_eq!(outcome.polls, 6);
        assert_eq!(backend.query_count(), 6);
    }

    #[tokio::test]
    async fn test_twenty_timeouts_fail_on_twentieth() {
        let responses = std::iter::repeat("Connection timed out").take(25);
        let backend = Arc::new(RecordingBackend::new().with_responses(responses));

        let err = monitor(backend.clone())
            .await_terminal(&JobHandle::new("1000"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SeqflowError::Monitor(MonitorError::TimeoutBudgetExceeded { attempts: 20, .. })
        ));
        assert_eq!(backend.query_count(), 20);
    }

    #[tokio::test]
    async fn test_unrecognized_fails_immediately() {
        let backend = Arc::new(RecordingBackend::new().with_responses(["FAILED", "COMPLETED"]));

        let err = monitor(backend.clone())
            .await_terminal(&JobHandle::new("1000"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SeqflowError::Monitor(MonitorError::UnrecognizedState { .. })
        ));
        assert_eq!(backend.query_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_handle_is_rejected() {
        let backend = Arc::new(RecordingBackend::new());
        let err = monitor(backend.clone())
            .await_terminal(&JobHandle::empty())
            .await
            .unwrap_err();

        assert!(matches!(err, SeqflowError::Monitor(MonitorError::NotSubmitted)));
        assert_eq!(backend.query_count(), 0);
    }

    #[tokio::test]
    async fn test_custom_patterns_classify_other_accounting_output() {
        let responses = ["PEND", "RUN", "daemon unreachable", "RUN", "DONE"];
        let patterns =
            AccountingPatterns::new(r"\bDONE\b", r"\b(PEND|RUN)\b", r"(?i)daemon unreachable").unwrap();

        let backend = Arc::new(RecordingBackend::new().with_responses(responses));
        let outcome = monitor(backend.clone())
            .with_patterns(patterns)
            .await_terminal(&JobHandle::new("1000"))
            .await
            .unwrap();
        assert_eq!(outcome.status, JobStatus::Succeeded);
        assert_eq!(outcome.polls, 5);

        let slurm = Arc::new(RecordingBackend::new().with_responses(responses));
        let err = monitor(slurm)
            .await_terminal(&JobHandle::new("1000"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SeqflowError::Monitor(MonitorError::UnrecognizedState { .. })
        ));
    }
}
