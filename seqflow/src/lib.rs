//! # Seqflow
//!
//! Artifact-aware stage orchestration for genomics pipelines running on an
//! HPC batch scheduler.
//!
//! For every unit of work (a sample or a patient) seqflow walks an ordered
//! chain of stages and:
//!
//! - **Skips completed work**: a stage whose output artifacts all exist and
//!   are non-empty is not resubmitted
//! - **Wires dependencies**: each submitted job depends on the jobs of the
//!   upstream stages it consumes, never on stale handles from earlier runs
//! - **Fans in**: one cohort-level aggregation job depends on every job
//!   collected across the cohort
//! - **Accounts**: a final job-metrics job records scheduler accounting, and
//!   the orchestrator can block until it reaches a terminal state
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use seqflow::prelude::*;
//!
//! let tool = ToolConfig::load("mutect2.yaml")?;
//! let cohort = DataConfig::load("cohort.yaml")?.to_cohort(tool.unit_scope);
//!
//! let ctx = RunContext::new(tool.tool.clone(), "/scratch/run1", tool.ref_type, tool.seq_type)
//!     .with_dry_run(true);
//! let log = RunLog::open(ctx.logs_dir(), ctx.tool(), uuid::Uuid::new_v4())?;
//! let runner = PipelineRunner::new(ctx, SchedulerClient::dry_run(), log);
//! let summary = runner.run(&cohort, &CataloguePlan::new(tool)).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod graph;
pub mod monitor;
pub mod registry;
pub mod runlog;
pub mod runner;
pub mod scheduler;
pub mod script;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{DataConfig, RefBuild, RunContext, SeqType, ToolConfig, UnitScope};
    pub use crate::core::{
        Artifact, ArtifactKind, Cohort, JobHandle, JobKind, JobRecord, JobStatus,
        ResourceProfile, Role, RunPhase, Sample, StageDefinition, Unit,
    };
    pub use crate::errors::{
        ConfigError, MonitorError, PipelineValidationError, SeqflowError, SubmissionError,
    };
    pub use crate::graph::{CohortJobs, StageGraphBuilder, UnitJobs};
    pub use crate::monitor::{JobMonitor, JobOutcome, MonitorConfig};
    pub use crate::registry::{ArtifactRegistry, FsArtifactRegistry};
    pub use crate::runlog::{RunLock, RunLog};
    pub use crate::runner::{
        CataloguePlan, CleanupPlan, PipelineRunner, RunSummary, StageProvider,
    };
    pub use crate::scheduler::{BackendKind, SchedulerBackend, SchedulerClient};
    pub use crate::script::{CommandScript, ScriptHandle, ScriptProfile, ShellCommand};
}
