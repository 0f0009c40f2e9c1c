//! Stage provider backed by the tool descriptor's stage catalogue.
//!
//! Arguments, redirections and artifact paths may use placeholders:
//!
//! | Placeholder | Value |
//! |---|---|
//! | `{tool}` | tool name |
//! | `{out_dir}` | output directory |
//! | `{ref_build}`, `{assembly}`, `{chr_prefix}` | reference build conventions |
//! | `{seq_type}` | sequencing strategy |
//! | `{unit}`, `{unit_dir}` | unit id and its output directory |
//! | `{sample}`, `{input}` | first sample of the unit and its input |
//! | `{input:normal}`, `{input:tumour}` | input of the first sample with that role |
//! | `{inputs}` | every input; as a whole argument it expands to one argument each |
//!
//! Unit placeholders are unavailable in prerequisite and aggregation stages.

use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::config::{CommandSpec, RunContext, StageSpec, ToolConfig};
use crate::core::{Artifact, Role, StageDefinition, Unit};
use crate::errors::{ConfigError, SeqflowError};
use crate::script::{CommandScript, ShellCommand};

use super::provider::{CleanupPlan, StageProvider};

const PLACEHOLDER_PATTERN: &str = r"\{([a-z_]+(?::[a-z]+)?)\}";
const INPUTS: &str = "{inputs}";

/// A [`StageProvider`] that instantiates the catalogue of a [`ToolConfig`].
#[derive(Debug, Clone)]
pub struct CataloguePlan {
    tool: ToolConfig,
}

impl CataloguePlan {
    /// Wraps a loaded tool descriptor.
    #[must_use]
    pub fn new(tool: ToolConfig) -> Self {
        Self { tool }
    }

    /// The descriptor.
    #[must_use]
    pub fn tool(&self) -> &ToolConfig {
        &self.tool
    }

    fn instantiate(
        &self,
        spec: &StageSpec,
        vars: &Placeholders,
        marker_stem: PathBuf,
    ) -> Result<StageDefinition, ConfigError> {
        let mut command = CommandScript::new();
        for step in &spec.commands {
            command = command.run(vars.command(step)?);
        }

        let mut artifacts = spec
            .artifacts
            .iter()
            .map(|a| vars.expand(a).map(Artifact::from_path))
            .collect::<Result<Vec<_>, _>>()?;

        if spec.sentinel {
            let marker = Artifact::complete_marker(marker_stem);
            command = command.run(ShellCommand::new("touch").path_arg(&marker.path));
            artifacts.push(marker);
        }

        let mut stage = StageDefinition::new(&spec.name, command)
            .with_resources(self.tool.resources_for(&spec.name))
            .with_artifacts(artifacts)
            .for_roles(spec.roles.iter().copied());
        if let Some(after) = &spec.after {
            stage = stage.after(after.iter().cloned());
        }
        if !spec.kill_on_error {
            stage = stage.keep_going();
        }
        Ok(stage)
    }

    fn cohort_stage(&self, ctx: &RunContext, spec: &StageSpec) -> Result<StageDefinition, ConfigError> {
        let vars = Placeholders::cohort(ctx);
        let stem = ctx.out_dir().join(format!("{}.{}", ctx.tool(), spec.name));
        self.instantiate(spec, &vars, stem)
    }
}

impl StageProvider for CataloguePlan {
    fn prerequisites(&self, ctx: &RunContext) -> Result<Vec<StageDefinition>, SeqflowError> {
        self.tool
            .prerequisites
            .iter()
            .map(|spec| self.cohort_stage(ctx, spec).map_err(SeqflowError::from))
            .collect()
    }

    fn stages(&self, ctx: &RunContext, unit: &Unit) -> Result<Vec<StageDefinition>, SeqflowError> {
        let vars = Placeholders::unit(ctx, unit);
        let unit_dir = ctx.unit_dir(&unit.id);
        self.tool
            .stages
            .iter()
            .map(|spec| {
                if !unit.matches_any(&spec.roles) {
                    return Ok(excluded(spec));
                }
                let stem = unit_dir.join(format!("{}.{}", unit.id, spec.name));
                self.instantiate(spec, &vars, stem).map_err(SeqflowError::from)
            })
            .collect()
    }

    fn aggregation(&self, ctx: &RunContext) -> Result<StageDefinition, SeqflowError> {
        match &self.tool.aggregate {
            Some(spec) => Ok(self.cohort_stage(ctx, spec)?),
            None => Ok(StageDefinition::new(
                "aggregate",
                CommandScript::new().echo(format!("{}: all units processed", ctx.tool())),
            )
            .with_resources(self.tool.resources_for("aggregate"))),
        }
    }

    fn cleanup(&self, ctx: &RunContext, unit: &Unit) -> Result<Option<CleanupPlan>, SeqflowError> {
        let Some(spec) = &self.tool.cleanup else {
            return Ok(None);
        };
        let vars = Placeholders::unit(ctx, unit);
        let expand_all = |paths: &[String]| -> Result<Vec<PathBuf>, ConfigError> {
            paths.iter().map(|p| vars.expand(p).map(PathBuf::from)).collect()
        };

        Ok(Some(
            CleanupPlan::new(expand_all(&spec.final_artifacts)?, expand_all(&spec.intermediates)?)
                .with_resources(self.tool.resources_for("cleanup")),
        ))
    }
}

/// A stage that does not apply to the unit.
///
/// Kept in the list so `after` references stay valid; the builder drops it
/// by role before deciding anything, so its templates are never expanded.
fn excluded(spec: &StageSpec) -> StageDefinition {
    let stage = StageDefinition::new(&spec.name, CommandScript::new())
        .for_roles(spec.roles.iter().copied());
    match &spec.after {
        Some(after) => stage.after(after.iter().cloned()),
        None => stage,
    }
}

/// Values available to one stage's templates.
#[derive(Debug, Clone)]
struct Placeholders {
    values: BTreeMap<String, String>,
    inputs: Vec<String>,
}

impl Placeholders {
    fn cohort(ctx: &RunContext) -> Self {
        let build = ctx.ref_build();
        let values = [
            ("tool", ctx.tool().to_string()),
            ("out_dir", ctx.out_dir().display().to_string()),
            ("ref_build", build.to_string()),
            ("assembly", build.assembly().to_string()),
            ("chr_prefix", build.chromosome_prefix().to_string()),
            ("seq_type", ctx.seq_type().to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            values,
            inputs: Vec::new(),
        }
    }

    fn unit(ctx: &RunContext, unit: &Unit) -> Self {
        let mut vars = Self::cohort(ctx);
        vars.values.insert("unit".into(), unit.id.clone());
        vars.values
            .insert("unit_dir".into(), ctx.unit_dir(&unit.id).display().to_string());

        if let Some(first) = unit.samples.first() {
            vars.values.insert("sample".into(), first.id.clone());
            vars.values.insert("input".into(), first.input.display().to_string());
        }
        for role in [Role::Normal, Role::Tumour] {
            if let Some(sample) = unit.first_with_role(role) {
                vars.values
                    .insert(format!("input:{role}"), sample.input.display().to_string());
            }
        }
        if let Some(tumour) = vars.values.get("input:tumour").cloned() {
            vars.values.insert("input:tumor".into(), tumour);
        }

        vars.inputs = unit.samples.iter().map(|s| s.input.display().to_string()).collect();
        vars.values.insert("inputs".into(), vars.inputs.join(","));
        vars
    }

    fn expand(&self, template: &str) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in placeholder_regex().captures_iter(template) {
            let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = self.values.get(key.as_str()).ok_or_else(|| {
                ConfigError::missing_key(format!("placeholder {} has no value here", whole.as_str()))
            })?;
            out.push_str(&template[last..whole.start()]);
            out.push_str(value);
            last = whole.end();
        }
        out.push_str(&template[last..]);
        Ok(out)
    }

    fn command(&self, spec: &CommandSpec) -> Result<ShellCommand, ConfigError> {
        let mut command = ShellCommand::new(self.expand(&spec.program)?);
        for arg in &spec.args {
            if arg == INPUTS {
                command = command.args(self.inputs.iter().cloned());
            } else {
                command = command.arg(self.expand(arg)?);
            }
        }
        if let Some(stdout) = &spec.stdout {
            command = command.stdout_to(self.expand(stdout)?);
        }
        Ok(command)
    }
}

// Literal pattern, covered by tests.
#[allow(clippy::expect_used)]
fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(PLACEHOLDER_PATTERN).expect("placeholder pattern compiles"))
}
