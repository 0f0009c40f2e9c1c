//! Per-unit stage graph construction.
//!
//! For each unit the builder walks the stage chain in order, asks the
//! artifact registry whether each stage must run, and submits the ones that
//! do with dependencies on the same unit's upstream jobs plus the cohort
//! prerequisites. Skipped stages record the empty handle and pass their own
//! upstream set through, so downstream stages depend on whatever was last
//! actually submitted and never on a stale job id from an earlier run.

mod builder;
mod validation;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::{JobHandle, JobKind, JobRecord, StageDefinition};
use crate::errors::SeqflowError;
use crate::scheduler::SchedulerClient;
use crate::script::{render, ScriptHandle, ScriptProfile};

pub use builder::StageGraphBuilder;
pub use validation::validate_stages;

/// Jobs decided for one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitJobs {
    /// The unit.
    pub unit_id: String,
    /// Handle per stage; empty for skipped stages.
    pub stage_handles: BTreeMap<String, JobHandle>,
    /// Non-empty handles, in submission order.
    pub jobs: Vec<JobHandle>,
    /// Stages chosen to run, including dry-run submissions.
    pub submitted_stages: Vec<String>,
    /// Stages skipped as already complete.
    pub skipped_stages: Vec<String>,
}

impl UnitJobs {
    /// Creates an empty record for a unit.
    #[must_use]
    pub fn new(unit_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            ..Self::default()
        }
    }

    /// Returns true if any stage was chosen to run.
    #[must_use]
    pub fn had_work(&self) -> bool {
        !self.submitted_stages.is_empty()
    }

    /// Handle recorded for a stage, if the stage was part of the chain.
    #[must_use]
    pub fn handle(&self, stage: &str) -> Option<&JobHandle> {
        self.stage_handles.get(stage)
    }
}

/// Cohort-wide accumulation across all units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortJobs {
    /// Every non-empty handle collected so far.
    pub handles: Vec<JobHandle>,
    /// Number of units the builder walked.
    pub units_processed: usize,
    /// One record per submission.
    pub records: Vec<JobRecord>,
    /// Number of skipped stages.
    pub skipped: usize,
}

impl CohortJobs {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if at least one unit was walked.
    #[must_use]
    pub fn any_processed(&self) -> bool {
        self.units_processed > 0
    }

    /// Records a submission, collecting its handle if non-empty.
    pub fn record(&mut self, record: JobRecord) {
        if !record.handle.is_empty() && !self.handles.contains(&record.handle) {
            self.handles.push(record.handle.clone());
        }
        self.records.push(record);
    }

    /// Submission records of one kind.
    pub fn records_of(&self, kind: JobKind) -> impl Iterator<Item = &JobRecord> {
        self.records.iter().filter(move |r| r.kind == kind)
    }
}

/// Renders a profile and hands it to the scheduler.
///
/// # Errors
///
/// Filesystem errors from rendering, submission errors from the backend.
pub async fn submit_profile(
    client: &SchedulerClient,
    profile: &ScriptProfile,
) -> Result<(ScriptHandle, JobHandle), SeqflowError> {
    let script = render(profile)?;
    let handle = client.submit(&script).await?;
    Ok((script, handle))
}

/// Builds the record for a submission.
#[must_use]
pub fn job_record(
    stage: &str,
    unit: Option<&str>,
    kind: JobKind,
    script: &ScriptHandle,
    handle: JobHandle,
) -> JobRecord {
    JobRecord {
        stage: stage.to_string(),
        unit: unit.map(str::to_string),
        kind,
        handle,
        dependencies: script.dependencies.clone(),
        kill_on_error: script.kill_on_error,
        script: script.path.clone(),
    }
}

/// Submitted handles of the stages `stage` consumes.
///
/// An explicit `after` list names them; otherwise it is the stage decided
/// just before. `resolved` maps each decided stage to the handles that
/// stand in for it: its own job when submitted, or its own upstream set
/// when skipped. Stages never decided (filtered out) contribute nothing.
#[must_use]
pub fn upstream_handles(
    stage: &StageDefinition,
    previous: Option<&str>,
    resolved: &BTreeMap<String, Vec<JobHandle>>,
) -> Vec<JobHandle> {
    let lookup = |name: &str| resolved.get(name).cloned().unwrap_or_default();
    let handles: Vec<JobHandle> = match &stage.after {
        Some(upstream) => upstream.iter().flat_map(|name| lookup(name.as_str())).collect(),
        None => previous.map(lookup).unwrap_or_default(),
    };
    JobHandle::submitted(&handles)
}

/// Formats dependency handles for narration.
#[must_use]
pub fn describe_dependencies(handles: &[JobHandle]) -> String {
    let submitted = JobHandle::submitted(handles);
    if submitted.is_empty() {
        return "none".to_string();
    }
    submitted
        .iter()
        .map(JobHandle::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
