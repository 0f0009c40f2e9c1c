//! Stage definitions supplied by the tool-specific collaborator.

use crate::core::{Artifact, ResourceProfile, Role};
use crate::errors::PipelineValidationError;
use crate::script::CommandScript;

/// One analysis step for one unit: command, resources, outputs, upstreams.
#[derive(Debug, Clone)]
pub struct StageDefinition {
    /// Stage name, unique within a unit's chain.
    pub name: String,
    /// Command body.
    pub command: CommandScript,
    /// Scheduler resources.
    pub resources: ResourceProfile,
    /// Whether an upstream failure cancels this job (default true).
    pub kill_on_error: bool,
    /// Artifacts that prove the stage already ran.
    pub artifacts: Vec<Artifact>,
    /// Upstream stages consumed. `None` means the preceding stage in the chain.
    pub after: Option<Vec<String>>,
    /// Roles the stage applies to (empty = all units).
    pub roles: Vec<Role>,
}

impl StageDefinition {
    /// Creates a new stage definition.
    #[must_use]
    pub fn new(name: impl Into<String>, command: CommandScript) -> Self {
        Self {
            name: name.into(),
            command,
            resources: ResourceProfile::default(),
            kill_on_error: true,
            artifacts: Vec::new(),
            after: None,
            roles: Vec::new(),
        }
    }

    /// Sets the resource profile.
    #[must_use]
    pub fn with_resources(mut self, resources: ResourceProfile) -> Self {
        self.resources = resources;
        self
    }

    /// Adds an artifact.
    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Adds several artifacts.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: impl IntoIterator<Item = Artifact>) -> Self {
        self.artifacts.extend(artifacts);
        self
    }

    /// Declares the upstream stages this stage consumes.
    #[must_use]
    pub fn after(mut self, upstream: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.after = Some(upstream.into_iter().map(Into::into).collect());
        self
    }

    /// Declares that the stage has no upstream in its chain.
    #[must_use]
    pub fn independent(mut self) -> Self {
        self.after = Some(Vec::new());
        self
    }

    /// Runs the job even when upstream jobs failed.
    #[must_use]
    pub fn keep_going(mut self) -> Self {
        self.kill_on_error = false;
        self
    }

    /// Restricts the stage to units carrying one of the roles.
    #[must_use]
    pub fn for_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    /// Validates the stage definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or the stage lists itself upstream.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new(
                "Stage name cannot be empty or whitespace-only",
            ));
        }
        if self
            .after
            .as_ref()
            .is_some_and(|after| after.iter().any(|a| a == &self.name))
        {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' cannot depend on itself",
                self.name
            ))
            .with_stages(vec![self.name.clone()]));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ShellCommand;

    fn command() -> CommandScript {
        CommandScript::new().run(ShellCommand::new("true"))
    }

    #[test]
    fn test_stage_definition_defaults() {
        let stage = StageDefinition::new("call", command());
        assert!(stage.kill_on_error);
        assert!(stage.after.is_none());
        assert!(stage.artifacts.is_empty());
    }

    #[test]
    fn test_stage_definition_builder() {
        let stage = StageDefinition::new("filter", command())
            .after(["call"])
            .with_artifact(Artifact::output("/out/P1.filtered.vcf"))
            .for_roles([Role::Tumour])
            .keep_going();

        assert_eq!(stage.after, Some(vec!["call".to_string()]));
        assert_eq!(stage.roles, vec![Role::Tumour]);
        assert!(!stage.kill_on_error);
    }

    #[test]
    fn test_self_dependency_rejected() {
        let stage = StageDefinition::new("call", command()).after(["call"]);
        assert!(stage.validate().is_err());
    }

    #[test]
    fn test_blank_name_rejected() {
        assert!(StageDefinition::new("  ", command()).validate().is_err());
    }
}
