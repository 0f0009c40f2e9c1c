//! Test doubles for the scheduler seam.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::core::JobHandle;
use crate::errors::{SeqflowError, SubmissionError};
use crate::scheduler::SchedulerBackend;
use crate::script::ScriptHandle;

const FIRST_JOB_ID: u64 = 1000;

/// A backend that records submissions and replays canned accounting output.
///
/// Job ids are handed out sequentially from 1000. Once the canned responses
/// run out, every query answers `COMPLETED`.
#[derive(Debug)]
pub struct RecordingBackend {
    next_id: Mutex<u64>,
    submissions: Mutex<Vec<ScriptHandle>>,
    responses: Mutex<VecDeque<String>>,
    queries: Mutex<Vec<JobHandle>>,
    reject_after: Mutex<Option<usize>>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    /// Creates a new recording backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(FIRST_JOB_ID),
            submissions: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            queries: Mutex::new(Vec::new()),
            reject_after: Mutex::new(None),
        }
    }

    /// Queues accounting responses, consumed one per query.
    #[must_use]
    pub fn with_responses(self, responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.responses
            .lock()
            .extend(responses.into_iter().map(Into::into));
        self
    }

    /// Rejects every submission after the first `count`.
    #[must_use]
    pub fn rejecting_after(self, count: usize) -> Self {
        *self.reject_after.lock() = Some(count);
        self
    }

    /// Scripts submitted so far, in order.
    #[must_use]
    pub fn submissions(&self) -> Vec<ScriptHandle> {
        self.submissions.lock().clone()
    }

    /// Finds a submission by job name.
    #[must_use]
    pub fn submission(&self, name: &str) -> Option<ScriptHandle> {
        self.submissions.lock().iter().find(|s| s.name == name).cloned()
    }

    /// Number of accounting queries made.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries.lock().len()
    }
}

#[async_trait]
impl SchedulerBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    async fn submit(&self, script: &ScriptHandle) -> Result<JobHandle, SeqflowError> {
        let mut submissions = self.submissions.lock();
        if let Some(limit) = *self.reject_after.lock() {
            if submissions.len() >= limit {
                return Err(SubmissionError::Rejected {
                    script: script.path.clone(),
                    code: Some(1),
                    stderr: "sbatch: error: Batch job submission failed".to_string(),
                }
                .into());
            }
        }

        let mut next_id = self.next_id.lock();
        let handle = JobHandle::new(next_id.to_string());
        *next_id += 1;
        submissions.push(script.clone());
        Ok(handle)
    }

    async fn query(&self, job: &JobHandle) -> Result<String, SeqflowError> {
        self.queries.lock().push(job.clone());
        Ok(self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| "COMPLETED".to_string()))
    }
}
