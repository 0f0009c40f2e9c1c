//! Slurm backend: `sbatch` for submission, `sacct` for accounting.

use async_trait::async_trait;
use tokio::process::Command;

use super::SchedulerBackend;
use crate::core::JobHandle;
use crate::errors::{SeqflowError, SubmissionError};
use crate::script::ScriptHandle;

/// Submits through `sbatch --parsable` and queries `sacct`.
#[derive(Debug, Clone)]
pub struct SlurmBackend {
    sbatch: String,
    sacct: String,
}

impl Default for SlurmBackend {
    fn default() -> Self {
        Self {
            sbatch: "sbatch".to_string(),
            sacct: "sacct".to_string(),
        }
    }
}

impl SlurmBackend {
    /// Creates a backend using `sbatch` and `sacct` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the submission and accounting programs.
    #[must_use]
    pub fn with_programs(mut self, sbatch: impl Into<String>, sacct: impl Into<String>) -> Self {
        self.sbatch = sbatch.into();
        self.sacct = sacct.into();
        self
    }
}

/// Extracts the job id from `sbatch --parsable` output (`<id>[;<cluster>]`).
pub fn parse_job_id(output: &str) -> Result<JobHandle, SubmissionError> {
    let id = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.split(';').next())
        .map(str::trim)
        .unwrap_or_default();

    let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_digit() || c == '_');
    if valid {
        Ok(JobHandle::new(id))
    } else {
        Err(SubmissionError::UnparsableJobId {
            output: output.trim().to_string(),
        })
    }
}

#[async_trait]
impl SchedulerBackend for SlurmBackend {
    fn name(&self) -> &str {
        "slurm"
    }

    async fn submit(&self, script: &ScriptHandle) -> Result<JobHandle, SeqflowError> {
        let output = Command::new(&self.sbatch)
            .arg("--parsable")
            .arg(&script.path)
            .output()
            .await
            .map_err(|source| SubmissionError::Spawn {
                program: self.sbatch.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SubmissionError::Rejected {
                script: script.path.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        Ok(parse_job_id(&String::from_utf8_lossy(&output.stdout))?)
    }

    async fn query(&self, job: &JobHandle) -> Result<String, SeqflowError> {
        let output = Command::new(&self.sacct)
            .args(["-n", "-P", "-X", "-j", job.as_str(), "--format=State"])
            .output()
            .await?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text.trim().to_string())
    }
}
