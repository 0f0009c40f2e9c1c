//! The seam between the orchestrator and tool-specific command building.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::RunContext;
use crate::core::{ResourceProfile, StageDefinition, Unit};
use crate::errors::SeqflowError;
use crate::script::{CommandScript, ScriptStep, ShellCommand};

/// Supplies stage definitions for a run.
///
/// Implementations own everything tool-specific: program flags, reference
/// selection and output naming. The runner only sees the resulting commands,
/// resources and artifacts.
pub trait StageProvider: Send + Sync {
    /// Cohort-level stages submitted once, before any unit.
    fn prerequisites(&self, _ctx: &RunContext) -> Result<Vec<StageDefinition>, SeqflowError> {
        Ok(Vec::new())
    }

    /// The ordered stage chain for one unit.
    fn stages(&self, ctx: &RunContext, unit: &Unit) -> Result<Vec<StageDefinition>, SeqflowError>;

    /// The cohort aggregation stage.
    fn aggregation(&self, ctx: &RunContext) -> Result<StageDefinition, SeqflowError>;

    /// What `--remove` may delete for a unit, if anything.
    fn cleanup(&self, _ctx: &RunContext, _unit: &Unit) -> Result<Option<CleanupPlan>, SeqflowError> {
        Ok(None)
    }
}

/// Files a cleanup job may remove once the final outputs are confirmed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupPlan {
    /// Every one of these must pass `[ -s ]` before anything is deleted.
    pub final_artifacts: Vec<PathBuf>,
    /// Removed only when the check passes.
    pub intermediates: Vec<PathBuf>,
    /// Resources for the cleanup job.
    #[serde(default)]
    pub resources: ResourceProfile,
}

impl CleanupPlan {
    /// Creates a plan with default resources.
    #[must_use]
    pub fn new(
        final_artifacts: impl IntoIterator<Item = impl Into<PathBuf>>,
        intermediates: impl IntoIterator<Item = impl Into<PathBuf>>,
    ) -> Self {
        Self {
            final_artifacts: final_artifacts.into_iter().map(Into::into).collect(),
            intermediates: intermediates.into_iter().map(Into::into).collect(),
            resources: ResourceProfile::default(),
        }
    }

    /// Sets the cleanup job's resources.
    #[must_use]
    pub fn with_resources(mut self, resources: ResourceProfile) -> Self {
        self.resources = resources;
        self
    }

    /// The guarded command body.
    ///
    /// Deletion sits inside a single `if [ -s F1 ] && [ -s F2 ]` branch; the
    /// other branch only echoes. With no final artifacts declared, only the
    /// echo is rendered.
    #[must_use]
    pub fn command(&self, unit: &str) -> CommandScript {
        let removal = if self.intermediates.is_empty() {
            vec![ScriptStep::Echo(format!("{unit}: final outputs present, nothing to remove"))]
        } else {
            let rm = self
                .intermediates
                .iter()
                .fold(ShellCommand::new("rm").args(["-rf", "--"]), ShellCommand::path_arg);
            vec![
                ScriptStep::Run(rm),
                ScriptStep::Echo(format!("{unit}: removed {} intermediate(s)", self.intermediates.len())),
            ]
        };
        let keep = vec![ScriptStep::Echo(format!(
            "{unit}: final outputs missing or empty, intermediates kept"
        ))];

        CommandScript::new().require_artifacts(self.final_artifacts.clone(), removal, keep)
    }
}
