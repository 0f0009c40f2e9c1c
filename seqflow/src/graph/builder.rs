//! The per-unit stage graph builder.

use std::collections::BTreeMap;

use crate::config::RunContext;
use crate::core::{JobHandle, JobKind, StageDefinition, Unit};
use crate::errors::SeqflowError;
use crate::registry::ArtifactRegistry;
use crate::runlog::RunLog;
use crate::scheduler::SchedulerClient;
use crate::script::ScriptProfile;

use super::{
    describe_dependencies, job_record, submit_profile, upstream_handles, validate_stages, CohortJobs,
    UnitJobs,
};

/// Decides, renders and submits the stage chain of each unit.
pub struct StageGraphBuilder<'a> {
    ctx: &'a RunContext,
    registry: &'a dyn ArtifactRegistry,
    client: &'a SchedulerClient,
    log: &'a RunLog,
    prerequisites: Vec<JobHandle>,
}

impl<'a> StageGraphBuilder<'a> {
    /// Creates a builder with no cohort prerequisites.
    #[must_use]
    pub fn new(
        ctx: &'a RunContext,
        registry: &'a dyn ArtifactRegistry,
        client: &'a SchedulerClient,
        log: &'a RunLog,
    ) -> Self {
        Self {
            ctx,
            registry,
            client,
            log,
            prerequisites: Vec::new(),
        }
    }

    /// Adds cohort-level handles every unit stage depends on.
    #[must_use]
    pub fn with_prerequisites(mut self, handles: Vec<JobHandle>) -> Self {
        self.prerequisites = JobHandle::submitted(&handles);
        self
    }

    /// Walks one unit's chain, submitting every stage that needs execution.
    ///
    /// Stages whose role filter excludes the unit are left out of the chain.
    ///
    /// # Errors
    ///
    /// Validation errors for a malformed list; filesystem and submission
    /// errors abort immediately with no rollback of earlier submissions.
    pub async fn build_unit(
        &self,
        unit: &Unit,
        stages: &[StageDefinition],
        cohort: &mut CohortJobs,
    ) -> Result<UnitJobs, SeqflowError> {
        validate_stages(stages)?;

        let unit_dir = self.ctx.unit_dir(&unit.id);
        std::fs::create_dir_all(&unit_dir).map_err(|e| SeqflowError::filesystem(&unit_dir, e))?;

        let chain: Vec<&StageDefinition> = stages.iter().filter(|s| unit.matches_any(&s.roles)).collect();
        cohort.units_processed += 1;
        self.log.narrate(&format!(
            "building {} stage(s) for unit {}",
            chain.len(),
            unit.id
        ))?;

        let mut jobs = UnitJobs::new(&unit.id);
        let mut resolved: BTreeMap<String, Vec<JobHandle>> = BTreeMap::new();
        let mut previous: Option<&str> = None;

        for stage in chain {
            if !self.registry.needs_execution(&stage.artifacts)? {
                self.log.narrate(&format!(
                    "skipping stage {} for unit {}, already completed",
                    stage.name, unit.id
                ))?;
                let passed_through = upstream_handles(stage, previous, &resolved);
                resolved.insert(stage.name.clone(), passed_through);
                jobs.stage_handles.insert(stage.name.clone(), JobHandle::empty());
                jobs.skipped_stages.push(stage.name.clone());
                cohort.skipped += 1;
                previous = Some(stage.name.as_str());
                continue;
            }

            let mut dependencies = upstream_handles(stage, previous, &resolved);
            dependencies.extend(self.prerequisites.iter().cloned());

            self.log.narrate(&format!(
                "submitting stage {} for unit {} (depends on: {})",
                stage.name,
                unit.id,
                describe_dependencies(&dependencies)
            ))?;

            let profile = ScriptProfile::new(
                format!("{}_{}", unit.id, stage.name),
                self.ctx.unit_logs_dir(&unit.id),
                stage.command.clone(),
            )
            .with_resources(&stage.resources)
            .with_dependencies(dependencies)
            .with_kill_on_error(stage.kill_on_error);

            let (script, handle) = submit_profile(self.client, &profile).await?;
            if !handle.is_empty() {
                self.log.narrate(&format!(
                    "stage {} for unit {} submitted as job {handle}",
                    stage.name, unit.id
                ))?;
                jobs.jobs.push(handle.clone());
            }

            resolved.insert(stage.name.clone(), JobHandle::submitted([&handle]));
            jobs.stage_handles.insert(stage.name.clone(), handle.clone());
            jobs.submitted_stages.push(stage.name.clone());
            cohort.record(job_record(&stage.name, Some(&unit.id), JobKind::Stage, &script, handle));
            previous = Some(stage.name.as_str());
        }

        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RefBuild, SeqType};
    use crate::core::{Artifact, Role, Sample};
    use crate::registry::{FsArtifactRegistry, MockArtifactRegistry};
    use crate::script::{CommandScript, ShellCommand};
    use crate::testing::{write_artifact, RecordingBackend};
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::sync::Arc;
    use uuid::Uuid;

    struct Harness {
        _dir: tempfile::TempDir,
        ctx: RunContext,
        log: RunLog,
        backend: Arc<RecordingBackend>,
        client: SchedulerClient,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new("test", dir.path(), RefBuild::Hg38, SeqType::Wgs);
        let log = RunLog::open(ctx.logs_dir(), "test", Uuid::new_v4()).unwrap();
        let backend = Arc::new(RecordingBackend::new());
        let client = SchedulerClient::new(backend.clone());
        Harness {
            _dir: dir,
            ctx,
            log,
            backend,
            client,
        }
    }

    fn stage(name: &str, artifact: impl AsRef<Path>) -> StageDefinition {
        StageDefinition::new(name, CommandScript::new().run(ShellCommand::new(name)))
            .with_artifact(Artifact::output(artifact.as_ref()))
    }

    fn unit(id: &str) -> Unit {
        Unit::sample(Sample::new(id, Role::Tumour, format!("/data/{id}.bam")))
    }

    #[tokio::test]
    async fn test_chain_depends_on_previous_stage() {
        let h = harness();
        let registry = FsArtifactRegistry::new();
        let builder = StageGraphBuilder::new(&h.ctx, &registry, &h.client, &h.log);
        let stages = vec![stage("a", "/nonexistent/a"), stage("b", "/nonexistent/b")];

        let mut cohort = CohortJobs::new();
        let jobs = builder.build_unit(&unit("P1"), &stages, &mut cohort).await.unwrap();

        assert_eq!(jobs.jobs, vec![JobHandle::new("1000"), JobHandle::new("1001")]);
        let b = h.backend.submission("P1_b").unwrap();
        assert_eq!(b.dependencies, vec![JobHandle::new("1000")]);
        assert_eq!(cohort.handles.len(), 2);
        assert_eq!(cohort.units_processed, 1);
    }

    #[tokio::test]
    async fn test_skipped_upstream_leaves_no_dependency() {
        let h = harness();
        let mut registry = MockArtifactRegistry::new();
        registry
            .expect_needs_execution()
            .returning(|artifacts| Ok(artifacts.iter().any(|a| a.path.ends_with("c.out"))));

        let builder = StageGraphBuilder::new(&h.ctx, &registry, &h.client, &h.log);
        let stages = vec![
            stage("a", "/out/a.out"),
            stage("b", "/out/b.out"),
            stage("c", "/out/c.out"),
        ];

        let mut cohort = CohortJobs::new();
        let jobs = builder.build_unit(&unit("P1"), &stages, &mut cohort).await.unwrap();

        assert_eq!(jobs.skipped_stages, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(jobs.handle("a"), Some(&JobHandle::empty()));
        let c = h.backend.submission("P1_c").unwrap();
        assert!(c.dependencies.is_empty());

        let script = std::fs::read_to_string(&c.path).unwrap();
        assert!(!script.contains("--dependency"));
        assert_eq!(cohort.skipped, 2);
    }

    #[tokio::test]
    async fn test_skipped_stage_passes_through_previous_dependency() {
        let h = harness();
        let mut registry = MockArtifactRegistry::new();
        registry
            .expect_needs_execution()
            .returning(|artifacts| Ok(!artifacts.iter().any(|a| a.path.ends_with("b.out"))));

        let builder = StageGraphBuilder::new(&h.ctx, &registry, &h.client, &h.log)
            .with_prerequisites(vec![JobHandle::new("77")]);
        let stages = vec![
            stage("a", "/out/a.out"),
            stage("b", "/out/b.out"),
            stage("c", "/out/c.out"),
        ];

        let mut cohort = CohortJobs::new();
        let jobs = builder.build_unit(&unit("P1"), &stages, &mut cohort).await.unwrap();

        assert_eq!(jobs.skipped_stages, vec!["b".to_string()]);
        assert_eq!(jobs.handle("b"), Some(&JobHandle::empty()));
        let c = h.backend.submission("P1_c").unwrap();
        assert_eq!(c.dependencies, vec![JobHandle::new("1000"), JobHandle::new("77")]);

        let script = std::fs::read_to_string(&c.path).unwrap();
        assert!(script.contains("#SBATCH --dependency=afterok:1000:77"));
    }

    #[tokio::test]
    async fn test_skipped_stage_passes_through_explicit_after() {
        let h = harness();
        let mut registry = MockArtifactRegistry::new();
        registry
            .expect_needs_execution()
            .returning(|artifacts| Ok(!artifacts.iter().any(|a| a.path.ends_with("merge.out"))));

        let builder = StageGraphBuilder::new(&h.ctx, &registry, &h.client, &h.log);
        let stages = vec![
            stage("left", "/out/left.out"),
            stage("right", "/out/right.out"),
            stage("merge", "/out/merge.out").after(["left", "right"]),
            stage("qc", "/out/qc.out"),
            stage("report", "/out/report.out").after(["merge", "left"]),
        ];

        let mut cohort = CohortJobs::new();
        builder.build_unit(&unit("P1"), &stages, &mut cohort).await.unwrap();

        let report = h.backend.submission("P1_report").unwrap();
        assert_eq!(report.dependencies, vec![JobHandle::new("1000"), JobHandle::new("1001")]);
        let qc = h.backend.submission("P1_qc").unwrap();
        assert_eq!(qc.dependencies, vec![JobHandle::new("1000"), JobHandle::new("1001")]);
    }

    #[tokio::test]
    async fn test_complete_unit_submits_nothing() {
        let h = harness();
        let done = h.ctx.out_dir().join("P1/P1.vcf");
        write_artifact(&done, "##fileformat=VCFv4.2\n").unwrap();

        let registry = FsArtifactRegistry::new();
        let builder = StageGraphBuilder::new(&h.ctx, &registry, &h.client, &h.log);
        let stages = vec![stage("call", &done), stage("filter", &done)];

        let mut cohort = CohortJobs::new();
        let jobs = builder.build_unit(&unit("P1"), &stages, &mut cohort).await.unwrap();

        assert!(!jobs.had_work());
        assert!(h.backend.submissions().is_empty());
        assert!(cohort.handles.is_empty());
        assert!(cohort.any_processed());

        let log = std::fs::read_to_string(h.log.log_path()).unwrap();
        assert!(log.contains("skipping stage call for unit P1, already completed"));
        assert!(log.contains("skipping stage filter for unit P1, already completed"));
    }

    #[tokio::test]
    async fn test_explicit_after_and_prerequisites() {
        let h = harness();
        let registry = FsArtifactRegistry::new();
        let builder = StageGraphBuilder::new(&h.ctx, &registry, &h.client, &h.log)
            .with_prerequisites(vec![JobHandle::new("77"), JobHandle::empty()]);
        let stages = vec![
            stage("align", "/nonexistent/align"),
            stage("qc", "/nonexistent/qc"),
            stage("call", "/nonexistent/call").after(["align"]),
        ];

        let mut cohort = CohortJobs::new();
        builder.build_unit(&unit("S1"), &stages, &mut cohort).await.unwrap();

        let call = h.backend.submission("S1_call").unwrap();
        assert_eq!(call.dependencies, vec![JobHandle::new("1000"), JobHandle::new("77")]);
        let align = h.backend.submission("S1_align").unwrap();
        assert_eq!(align.dependencies, vec![JobHandle::new("77")]);
    }

    #[tokio::test]
    async fn test_role_filter_excludes_stage() {
        let h = harness();
        let registry = FsArtifactRegistry::new();
        let builder = StageGraphBuilder::new(&h.ctx, &registry, &h.client, &h.log);
        let normal = Unit::sample(Sample::new("S1-N", Role::Normal, "/data/S1-N.bam"));
        let stages = vec![
            stage("coverage", "/nonexistent/cov"),
            stage("call", "/nonexistent/call").for_roles([Role::Tumour]),
        ];

        let mut cohort = CohortJobs::new();
        let jobs = builder.build_unit(&normal, &stages, &mut cohort).await.unwrap();

        assert_eq!(jobs.submitted_stages, vec!["coverage".to_string()]);
        assert!(jobs.handle("call").is_none());
    }

    #[tokio::test]
    async fn test_invalid_chain_submits_nothing() {
        let h = harness();
        let registry = FsArtifactRegistry::new();
        let builder = StageGraphBuilder::new(&h.ctx, &registry, &h.client, &h.log);
        let stages = vec![
            stage("filter", "/nonexistent/f").after(["call"]),
            stage("call", "/nonexistent/c"),
        ];

        let mut cohort = CohortJobs::new();
        let err = builder.build_unit(&unit("P1"), &stages, &mut cohort).await.unwrap_err();

        assert!(matches!(err, SeqflowError::Validation(_)));
        assert!(h.backend.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_submission_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new("test", dir.path(), RefBuild::Hg38, SeqType::Wgs);
        let log = RunLog::open(ctx.logs_dir(), "test", Uuid::new_v4()).unwrap();
        let backend = Arc::new(RecordingBackend::new().rejecting_after(1));
        let client = SchedulerClient::new(backend.clone());
        let registry = FsArtifactRegistry::new();
        let builder = StageGraphBuilder::new(&ctx, &registry, &client, &log);
        let stages = vec![
            stage("a", "/nonexistent/a"),
            stage("b", "/nonexistent/b"),
            stage("c", "/nonexistent/c"),
        ];

        let mut cohort = CohortJobs::new();
        let err = builder.build_unit(&unit("P1"), &stages, &mut cohort).await.unwrap_err();

        assert!(matches!(err, SeqflowError::Submission(_)));
        assert_eq!(backend.submissions().len(), 1);
    }
}
