//! Stage list validation.

use std::collections::HashSet;

use crate::core::StageDefinition;
use crate::errors::{ContractErrorInfo, PipelineValidationError};

/// Validates an ordered stage list before anything is submitted.
///
/// Names must be unique and every `after` entry must name an earlier stage.
///
/// # Errors
///
/// Returns the first violation found.
pub fn validate_stages(stages: &[StageDefinition]) -> Result<(), PipelineValidationError> {
    let mut earlier: HashSet<&str> = HashSet::new();

    for stage in stages {
        stage.validate()?;

        if earlier.contains(stage.name.as_str()) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' is defined more than once",
                stage.name
            ))
            .with_stages(vec![stage.name.clone()])
            .with_error_info(
                ContractErrorInfo::new(
                    "GRAPH-001-DUPLICATE",
                    format!("Duplicate stage name '{}'", stage.name),
                )
                .with_fix_hint("Give every stage in the chain a distinct name."),
            ));
        }

        for upstream in stage.after.iter().flatten() {
            if !earlier.contains(upstream.as_str()) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' depends on unknown or later stage '{}'",
                    stage.name, upstream
                ))
                .with_stages(vec![stage.name.clone(), upstream.clone()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "GRAPH-002-UNKNOWN_UPSTREAM",
                        format!("Upstream '{upstream}' not found before '{}'", stage.name),
                    )
                    .with_context_entry("stage", stage.name.clone())
                    .with_fix_hint("List upstream stages before the stages that consume them."),
                ));
            }
        }

        earlier.insert(stage.name.as_str());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{CommandScript, ShellCommand};

    fn stage(name: &str) -> StageDefinition {
        StageDefinition::new(name, CommandScript::new().run(ShellCommand::new("true")))
    }

    #[test]
    fn test_valid_chain() {
        let stages = vec![stage("call"), stage("filter").after(["call"]), stage("annotate")];
        assert!(validate_stages(&stages).is_ok());
    }

    #[test]
    fn test_duplicate_name() {
        let err = validate_stages(&[stage("call"), stage("call")]).unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-001-DUPLICATE"));
    }

    #[test]
    fn test_forward_reference() {
        let stages = vec![stage("filter").after(["call"]), stage("call")];
        let err = validate_stages(&stages).unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-002-UNKNOWN_UPSTREAM"));
        assert_eq!(err.stages, vec!["filter".to_string(), "call".to_string()]);
    }

    #[test]
    fn test_empty_list_is_valid() {
        assert!(validate_stages(&[]).is_ok());
    }
}
