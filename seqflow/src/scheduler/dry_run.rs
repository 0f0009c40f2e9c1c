//! No-op backend used by `--dry-run`.

use async_trait::async_trait;

use super::SchedulerBackend;
use crate::core::JobHandle;
use crate::errors::SeqflowError;
use crate::script::ScriptHandle;

/// Echoes the submission it would make and returns the empty handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunBackend;

#[async_trait]
impl SchedulerBackend for DryRunBackend {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn submit(&self, script: &ScriptHandle) -> Result<JobHandle, SeqflowError> {
        tracing::info!(
            job = %script.name,
            "[dry-run] sbatch --parsable {}",
            script.path.display()
        );
        Ok(JobHandle::empty())
    }

    async fn query(&self, _job: &JobHandle) -> Result<String, SeqflowError> {
        Ok("COMPLETED".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_never_returns_a_handle() {
        let script = ScriptHandle {
            name: "P1_call".to_string(),
            path: "/out/P1/logs/P1_call.sh".into(),
            dependencies: vec![JobHandle::new("1")],
            kill_on_error: true,
        };
        let handle = DryRunBackend.submit(&script).await.unwrap();
        assert!(handle.is_empty());
    }
}
