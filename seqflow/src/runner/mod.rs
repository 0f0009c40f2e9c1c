//! Pipeline runner: drives a whole invocation.
//!
//! `INIT → BUILDING → AGGREGATING → METRICS → (WAITING | DONE)`
//!
//! - **INIT**: resolve and validate the prerequisites, every unit's chain,
//!   the aggregation stage and the cleanup plans; nothing is submitted
//! - **BUILDING**: cohort prerequisites once, then every unit's chain in id
//!   order
//! - **AGGREGATING**: one aggregation job over the whole cohort list (only if
//!   at least one unit was walked), then per-unit cleanup with `--remove`
//! - **METRICS**: the accounting job, skipped in dry-run
//! - **WAITING**: block on the accounting job unless `--no-wait`
//!
//! A descriptor error surfaces during INIT with nothing submitted. Any later
//! error aborts the run where it happens; jobs already submitted stay with
//! the scheduler.

mod catalogue;
mod provider;


use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::RunContext;
use crate::core::{Cohort, JobHandle, JobKind, JobRecord, RunPhase, StageDefinition};
use crate::errors::SeqflowError;
use crate::graph::{
    describe_dependencies, job_record, submit_profile, upstream_handles, validate_stages, CohortJobs,
    StageGraphBuilder, UnitJobs,
};
use crate::monitor::{JobMonitor, JobOutcome};
use crate::registry::{ArtifactRegistry, FsArtifactRegistry};
use crate::runlog::RunLog;
use crate::scheduler::SchedulerClient;
use crate::script::{CommandScript, ScriptProfile, ShellCommand};

pub use catalogue::CataloguePlan;
pub use provider::{CleanupPlan, StageProvider};

/// Columns recorded by the accounting job.
pub const METRICS_FORMAT: &str =
    "JobID,JobName%50,Partition,AllocCPUS,ReqMem,MaxRSS,Elapsed,TimeLimit,State,ExitCode";

/// What one invocation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run counter `N`.
    pub run_number: u32,
    /// Unique run id.
    pub run_id: String,
    /// Tool name.
    pub tool: String,
    /// Whether submissions were suppressed.
    pub dry_run: bool,
    /// Units walked.
    pub units_processed: usize,
    /// Stages skipped as already complete.
    pub skipped_stages: usize,
    /// Every submission, in order.
    pub jobs: Vec<JobRecord>,
    /// Per-unit decisions.
    pub units: Vec<UnitJobs>,
    /// Aggregation job, if one was submitted.
    pub aggregation: Option<JobHandle>,
    /// Cleanup jobs.
    pub cleanup: Vec<JobHandle>,
    /// Accounting job, if one was submitted.
    pub metrics: Option<JobHandle>,
    /// Result of waiting on the accounting job.
    pub metrics_outcome: Option<JobOutcome>,
    /// Where the run ended.
    pub phase: RunPhase,
}

impl RunSummary {
    /// Number of submissions of one kind.
    #[must_use]
    pub fn count(&self, kind: JobKind) -> usize {
        self.jobs.iter().filter(|j| j.kind == kind).count()
    }
}

/// Every stage list of a run, resolved up front.
struct RunPlan {
    prerequisites: Vec<StageDefinition>,
    /// Parallel to the cohort's units.
    unit_stages: Vec<Vec<StageDefinition>>,
    /// Absent for an empty cohort.
    aggregation: Option<StageDefinition>,
    /// Parallel to the cohort's units; empty without `--remove`.
    cleanup: Vec<Option<CleanupPlan>>,
}

/// Drives the graph builder over a cohort and submits the cohort-level jobs.
pub struct PipelineRunner {
    ctx: RunContext,
    client: SchedulerClient,
    registry: Arc<dyn ArtifactRegistry>,
    log: RunLog,
}

impl PipelineRunner {
    /// Creates a runner using the filesystem artifact registry.
    #[must_use]
    pub fn new(ctx: RunContext, client: SchedulerClient, log: RunLog) -> Self {
        Self {
            ctx,
            client,
            registry: Arc::new(FsArtifactRegistry::new()),
            log,
        }
    }

    /// Replaces the artifact registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn ArtifactRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// The run log.
    #[must_use]
    pub fn log(&self) -> &RunLog {
        &self.log
    }

    /// Runs the whole pipeline for `cohort`.
    ///
    /// The summary is written next to the run log on success and on a failed
    /// wait.
    ///
    /// # Errors
    ///
    /// Configuration, validation, filesystem and submission errors abort
    /// immediately. A failed accounting job is returned as a monitor error.
    pub async fn run(
        &self,
        cohort: &Cohort,
        provider: &dyn StageProvider,
    ) -> Result<RunSummary, SeqflowError> {
        let mut phase = RunPhase::Init;
        self.log.narrate(&format!(
            "{} unit(s), backend {}, dry-run {}, remove {}, no-wait {}",
            cohort.len(),
            self.client.backend_name(),
            self.ctx.dry_run(),
            self.ctx.remove(),
            self.ctx.no_wait()
        ))?;

        let plan = self.resolve(cohort, provider)?;

        self.advance(&mut phase, RunPhase::Building)?;
        let mut jobs = CohortJobs::new();
        let prerequisites = self.submit_prerequisites(&plan.prerequisites, &mut jobs).await?;

        let builder = StageGraphBuilder::new(&self.ctx, self.registry.as_ref(), &self.client, &self.log)
            .with_prerequisites(prerequisites);
        let mut units = Vec::with_capacity(cohort.len());
        for (unit, stages) in cohort.units().iter().zip(&plan.unit_stages) {
            units.push(builder.build_unit(unit, stages, &mut jobs).await?);
        }

        self.advance(&mut phase, RunPhase::Aggregating)?;
        let aggregation = match &plan.aggregation {
            Some(stage) if jobs.any_processed() => Some(self.submit_aggregation(stage, &mut jobs).await?),
            _ => {
                self.log.narrate("no units processed, not submitting aggregation job")?;
                None
            }
        };

        let mut cleanup = Vec::new();
        if self.ctx.remove() {
            for ((unit, unit_jobs), declared) in cohort.units().iter().zip(&units).zip(&plan.cleanup) {
                if !unit_jobs.had_work() {
                    self.log.narrate(&format!(
                        "unit {} had no submitted stages, no cleanup needed",
                        unit.id
                    ))?;
                    continue;
                }
                let Some(declared) = declared else {
                    self.log.narrate(&format!("no cleanup declared for unit {}", unit.id))?;
                    continue;
                };
                cleanup.push(self.submit_cleanup(&unit.id, declared, unit_jobs, &mut jobs).await?);
            }
        }

        self.advance(&mut phase, RunPhase::Metrics)?;
        let mut summary = RunSummary {
            run_number: self.log.run_number(),
            run_id: self.log.run_id().to_string(),
            tool: self.ctx.tool().to_string(),
            dry_run: self.ctx.dry_run(),
            units_processed: jobs.units_processed,
            skipped_stages: jobs.skipped,
            jobs: Vec::new(),
            units,
            aggregation,
            cleanup,
            metrics: None,
            metrics_outcome: None,
            phase,
        };

        if self.ctx.dry_run() {
            self.log.narrate("dry-run: not submitting job-metrics job")?;
        } else {
            summary.metrics = Some(self.submit_metrics(&mut jobs).await?);
        }
        summary.jobs = jobs.records;

        let waitable = summary.metrics.clone().filter(|h| !h.is_empty());
        match waitable {
            Some(handle) if !self.ctx.no_wait() => {
                self.advance(&mut phase, RunPhase::Waiting)?;
                summary.phase = phase;
                let monitor = JobMonitor::new(self.client.clone(), self.ctx.monitor());
                match monitor.await_terminal(&handle).await {
                    Ok(outcome) => {
                        self.log.narrate(&format!(
                            "job-metrics job {handle} completed after {} poll(s)",
                            outcome.polls
                        ))?;
                        summary.metrics_outcome = Some(outcome);
                    }
                    Err(e) => {
                        self.log.narrate(&format!("job-metrics job {handle} failed: {e}"))?;
                        self.log.write_summary(&summary)?;
                        return Err(e);
                    }
                }
            }
            Some(handle) => {
                self.log.narrate(&format!("no-wait: not waiting on job-metrics job {handle}"))?;
            }
            None => {}
        }

        self.advance(&mut phase, RunPhase::Done)?;
        summary.phase = phase;
        self.log.write_summary(&summary)?;
        Ok(summary)
    }

    fn advance(&self, phase: &mut RunPhase, next: RunPhase) -> Result<(), SeqflowError> {
        debug_assert!(phase.can_advance_to(next), "{phase} -> {next}");
        self.log.phase(*phase, next)?;
        *phase = next;
        Ok(())
    }

    /// Resolves and validates every stage list the run will submit.
    ///
    /// Runs before the first submission, so a descriptor problem in any unit
    /// leaves the scheduler untouched.
    fn resolve(&self, cohort: &Cohort, provider: &dyn StageProvider) -> Result<RunPlan, SeqflowError> {
        let prerequisites = provider.prerequisites(&self.ctx)?;
        validate_stages(&prerequisites)?;

        let unit_stages = cohort
            .units()
            .iter()
            .map(|unit| -> Result<Vec<StageDefinition>, SeqflowError> {
                let stages = provider.stages(&self.ctx, unit)?;
                validate_stages(&stages)?;
                Ok(stages)
            })
            .collect::<Result<Vec<_>, SeqflowError>>()?;

        let aggregation = if cohort.is_empty() {
            None
        } else {
            let stage = provider.aggregation(&self.ctx)?;
            stage.validate()?;
            Some(stage)
        };

        let cleanup = if self.ctx.remove() {
            cohort
                .units()
                .iter()
                .map(|unit| provider.cleanup(&self.ctx, unit))
                .collect::<Result<Vec<_>, SeqflowError>>()?
        } else {
            Vec::new()
        };

        self.log.narrate(&format!(
            "resolved {} prerequisite(s) and stage lists for {} unit(s)",
            prerequisites.len(),
            unit_stages.len()
        ))?;
        Ok(RunPlan {
            prerequisites,
            unit_stages,
            aggregation,
            cleanup,
        })
    }

    async fn submit_prerequisites(
        &self,
        stages: &[StageDefinition],
        jobs: &mut CohortJobs,
    ) -> Result<Vec<JobHandle>, SeqflowError> {
        let mut resolved = BTreeMap::new();
        let mut handles = Vec::new();
        let mut previous: Option<&str> = None;
        for stage in stages {
            if !self.registry.needs_execution(&stage.artifacts)? {
                self.log.narrate(&format!(
                    "skipping prerequisite {}, already completed",
                    stage.name
                ))?;
                let passed_through = upstream_handles(stage, previous, &resolved);
                resolved.insert(stage.name.clone(), passed_through);
                jobs.skipped += 1;
                previous = Some(stage.name.as_str());
                continue;
            }

            let dependencies = upstream_handles(stage, previous, &resolved);
            self.log.narrate(&format!(
                "submitting prerequisite {} (depends on: {})",
                stage.name,
                describe_dependencies(&dependencies)
            ))?;
            let profile = self
                .cohort_profile(stage, self.ctx.logs_dir())
                .with_dependencies(dependencies);
            let (script, handle) = submit_profile(&self.client, &profile).await?;
            resolved.insert(stage.name.clone(), JobHandle::submitted([&handle]));
            handles.push(handle.clone());
            jobs.record(job_record(&stage.name, None, JobKind::Prerequisite, &script, handle));
            previous = Some(stage.name.as_str());
        }

        Ok(JobHandle::submitted(&handles))
    }

    async fn submit_aggregation(
        &self,
        stage: &StageDefinition,
        jobs: &mut CohortJobs,
    ) -> Result<JobHandle, SeqflowError> {
        self.log.narrate(&format!(
            "submitting aggregation {} over {} job(s)",
            stage.name,
            jobs.handles.len()
        ))?;
        let profile = self
            .cohort_profile(stage, self.ctx.logs_dir())
            .with_dependencies(jobs.handles.clone());
        let (script, handle) = submit_profile(&self.client, &profile).await?;
        jobs.record(job_record(&stage.name, None, JobKind::Aggregate, &script, handle.clone()));
        Ok(handle)
    }

    async fn submit_cleanup(
        &self,
        unit: &str,
        plan: &CleanupPlan,
        unit_jobs: &UnitJobs,
        jobs: &mut CohortJobs,
    ) -> Result<JobHandle, SeqflowError> {
        self.log.narrate(&format!(
            "submitting cleanup for unit {unit} (depends on: {})",
            describe_dependencies(&unit_jobs.jobs)
        ))?;
        let profile = ScriptProfile::new(
            format!("{unit}_cleanup"),
            self.ctx.unit_logs_dir(unit),
            plan.command(unit),
        )
        .with_resources(&plan.resources)
        .with_dependencies(unit_jobs.jobs.clone())
        .with_kill_on_error(false);

        let (script, handle) = submit_profile(&self.client, &profile).await?;
        jobs.record(job_record("cleanup", Some(unit), JobKind::Cleanup, &script, handle.clone()));
        Ok(handle)
    }

    async fn submit_metrics(&self, jobs: &mut CohortJobs) -> Result<JobHandle, SeqflowError> {
        let command = metrics_command(&jobs.handles, self.log.metrics_path());
        self.log.narrate(&format!(
            "submitting job-metrics job over {} job(s)",
            jobs.handles.len()
        ))?;
        let profile = ScriptProfile::new(
            format!("{}_job_metrics", self.ctx.tool()),
            self.ctx.logs_dir(),
            command,
        )
        .with_dependencies(jobs.handles.clone())
        .with_kill_on_error(false);

        let (script, handle) = submit_profile(&self.client, &profile).await?;
        jobs.record(job_record("job_metrics", None, JobKind::Metrics, &script, handle.clone()));
        if !handle.is_empty() {
            self.log.narrate(&format!("job-metrics job submitted as {handle}"))?;
        }
        Ok(handle)
    }

    fn cohort_profile(&self, stage: &StageDefinition, log_dir: impl AsRef<Path>) -> ScriptProfile {
        ScriptProfile::new(
            format!("{}_{}", self.ctx.tool(), stage.name),
            log_dir.as_ref(),
            stage.command.clone(),
        )
        .with_resources(&stage.resources)
        .with_kill_on_error(stage.kill_on_error)
    }
}

/// The accounting command for a set of jobs.
///
/// With no jobs there is nothing to account for; the file records that
/// instead.
#[must_use]
pub fn metrics_command(handles: &[JobHandle], metrics_path: &Path) -> CommandScript {
    let ids = JobHandle::submitted(handles);
    if ids.is_empty() {
        return CommandScript::new().run(
            ShellCommand::new("echo")
                .arg("no jobs were submitted in this run")
                .stdout_to(metrics_path),
        );
    }

    let ids = ids.iter().map(JobHandle::as_str).collect::<Vec<_>>().join(",");
    CommandScript::new().run(
        ShellCommand::new("sacct")
            .args(["-P", "--delimiter=,"])
            .arg(format!("--format={METRICS_FORMAT}"))
            .args(["-j".to_string(), ids])
            .stdout_to(metrics_path),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_command_lists_jobs() {
        let cmd = metrics_command(
            &[JobHandle::new("1"), JobHandle::empty(), JobHandle::new("2")],
            Path::new("/out/logs/run_1_job_metrics_x.txt"),
        );
        assert_eq!(
            cmd.render(),
            format!("sacct -P --delimiter=, --format={METRICS_FORMAT} -j 1,2 > /out/logs/run_1_job_metrics_x.txt")
        );
    }

    #[test]
    fn test_metrics_command_without_jobs() {
        let cmd = metrics_command(&[], Path::new("/out/logs/m.txt"));
        assert_eq!(cmd.render(), "echo 'no jobs were submitted in this run' > /out/logs/m.txt");
    }
}
