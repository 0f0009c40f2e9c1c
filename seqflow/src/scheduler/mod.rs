//! Scheduler client and backends.
//!
//! The client hands rendered scripts to a [`SchedulerBackend`] and returns
//! opaque job handles. In dry-run mode every submission goes to the no-op
//! backend and the handle is always empty.

mod dependency;
mod dry_run;
mod slurm;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::core::JobHandle;
use crate::errors::SeqflowError;
use crate::script::ScriptHandle;

pub use dependency::dependency_expression;
pub use dry_run::DryRunBackend;
pub use slurm::{parse_job_id, SlurmBackend};

/// A batch-scheduler driver.
#[async_trait]
pub trait SchedulerBackend: Send + Sync + fmt::Debug {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Submits a rendered script, returning the scheduler-assigned handle.
    async fn submit(&self, script: &ScriptHandle) -> Result<JobHandle, SeqflowError>;

    /// Returns raw accounting output for a job.
    async fn query(&self, job: &JobHandle) -> Result<String, SeqflowError>;
}

/// Supported real backends, selected with `--cluster`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Slurm (`sbatch`/`sacct`).
    #[default]
    Slurm,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slurm => write!(f, "slurm"),
        }
    }
}

/// Submits scripts and queries accounting through one backend.
#[derive(Debug, Clone)]
pub struct SchedulerClient {
    backend: Arc<dyn SchedulerBackend>,
    dry_run: bool,
}

impl SchedulerClient {
    /// Creates a client over a live backend.
    #[must_use]
    pub fn new(backend: Arc<dyn SchedulerBackend>) -> Self {
        Self {
            backend,
            dry_run: false,
        }
    }

    /// Creates a client that never submits.
    #[must_use]
    pub fn dry_run() -> Self {
        Self {
            backend: Arc::new(DryRunBackend),
            dry_run: true,
        }
    }

    /// Creates the client for a backend kind, or the no-op client in dry-run.
    #[must_use]
    pub fn for_backend(kind: BackendKind, dry_run: bool) -> Self {
        if dry_run {
            return Self::dry_run();
        }
        match kind {
            BackendKind::Slurm => Self::new(Arc::new(SlurmBackend::new())),
        }
    }

    /// Returns true if submissions are suppressed.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Backend name.
    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Submits a script.
    ///
    /// In dry-run the returned handle is always empty.
    pub async fn submit(&self, script: &ScriptHandle) -> Result<JobHandle, SeqflowError> {
        let handle = self.backend.submit(script).await?;
        if self.dry_run {
            return Ok(JobHandle::empty());
        }

        tracing::info!(
            job = %script.name,
            job_id = %handle,
            backend = self.backend.name(),
            dependencies = script.dependencies.len(),
            "Submitted job"
        );
        Ok(handle)
    }

    /// Queries accounting for a job.
    pub async fn query(&self, job: &JobHandle) -> Result<String, SeqflowError> {
        self.backend.query(job).await
    }
}
