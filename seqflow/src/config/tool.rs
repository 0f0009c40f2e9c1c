//! Tool descriptor: stage catalogue plus per-stage resources and modules.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

use super::context::{RefBuild, SeqType, UnitScope};
use super::read_descriptor;
use crate::core::{ResourceProfile, Role};
use crate::errors::ConfigError;

/// `[D-]HH:MM:SS`, `MM:SS` or plain minutes.
const TIME_PATTERN: &str = r"^(\d+-)?\d{1,3}(:\d{2}){0,2}$";
/// An integer with an optional unit suffix.
const MEMORY_PATTERN: &str = r"^\d+[KMGT]?B?$";

/// One program invocation in a catalogue stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program name or path.
    pub program: String,
    /// Argument vector, placeholders allowed.
    #[serde(default)]
    pub args: Vec<String>,
    /// Optional stdout redirection target.
    #[serde(default)]
    pub stdout: Option<String>,
}

/// A stage in the catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Unique stage name.
    pub name: String,
    /// Commands run in order.
    pub commands: Vec<CommandSpec>,
    /// Paths whose presence proves the stage ran.
    #[serde(default)]
    pub artifacts: Vec<String>,
    /// Touch and require a `<unit_dir>/<unit>.<stage>.COMPLETE` marker.
    #[serde(default)]
    pub sentinel: bool,
    /// Upstream stages; defaults to the preceding stage.
    #[serde(default)]
    pub after: Option<Vec<String>>,
    /// Roles the stage applies to; empty means every unit.
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Whether upstream failure cancels this stage.
    #[serde(default = "default_kill_on_error")]
    pub kill_on_error: bool,
}

const fn default_kill_on_error() -> bool {
    true
}

/// Per-unit cleanup declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSpec {
    /// Outputs that must all exist and be non-empty before deleting.
    #[serde(rename = "final", default)]
    pub final_artifacts: Vec<String>,
    /// Files removed once the final outputs are confirmed.
    #[serde(default)]
    pub intermediates: Vec<String>,
}

/// The tool descriptor (`-t/--tool`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Tool name, used in log file names.
    pub tool: String,
    /// Reference build.
    pub ref_type: RefBuild,
    /// Sequencing strategy.
    pub seq_type: SeqType,
    /// Fan-out granularity.
    #[serde(default)]
    pub unit_scope: UnitScope,
    /// Modules keyed by stage name.
    #[serde(default)]
    pub modules: BTreeMap<String, Vec<String>>,
    /// Resources keyed by stage name.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceProfile>,
    /// Cohort-level stages run once before any unit.
    #[serde(default)]
    pub prerequisites: Vec<StageSpec>,
    /// Per-unit stage chain.
    #[serde(default)]
    pub stages: Vec<StageSpec>,
    /// Cohort aggregation stage.
    #[serde(default)]
    pub aggregate: Option<StageSpec>,
    /// Cleanup declaration used with `--remove`.
    #[serde(default)]
    pub cleanup: Option<CleanupSpec>,
}

impl ToolConfig {
    /// Loads and validates a descriptor.
    ///
    /// # Errors
    ///
    /// `MissingFile`, `Parse` or the first validation failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = read_descriptor(path)?;
        let config = Self::from_yaml(&text).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        tracing::debug!(
            tool = %config.tool,
            stages = config.stages.len(),
            prerequisites = config.prerequisites.len(),
            "Loaded tool descriptor"
        );
        Ok(config)
    }

    /// Parses and validates descriptor text.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
            path: "<tool descriptor>".into(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks names, commands and resource syntax.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tool.trim().is_empty() {
            return Err(ConfigError::missing_key("tool"));
        }

        let mut seen = HashSet::new();
        for stage in self.prerequisites.iter().chain(&self.stages).chain(&self.aggregate) {
            if stage.name.trim().is_empty() {
                return Err(ConfigError::missing_key("stages[].name"));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(ConfigError::unsupported(
                    "stage name",
                    &stage.name,
                    &["a name not used by another stage"],
                ));
            }
            if stage.commands.iter().any(|c| c.program.trim().is_empty()) {
                return Err(ConfigError::missing_key(format!("{}.commands[].program", stage.name)));
            }
        }

        let (time, memory) = resource_patterns();
        for (stage, profile) in &self.resources {
            if !time.is_match(&profile.max_time) {
                return Err(ConfigError::unsupported(
                    format!("resources.{stage}.time"),
                    &profile.max_time,
                    &["[D-]HH:MM:SS"],
                ));
            }
            if !memory.is_match(&profile.memory) {
                return Err(ConfigError::unsupported(
                    format!("resources.{stage}.mem"),
                    &profile.memory,
                    &["<n>[K|M|G|T]"],
                ));
            }
            if profile.cpus_per_task == 0 {
                return Err(ConfigError::unsupported(
                    format!("resources.{stage}.cpus"),
                    "0",
                    &["a positive integer"],
                ));
            }
        }
        Ok(())
    }

    /// Resource profile for a stage, with that stage's modules appended.
    #[must_use]
    pub fn resources_for(&self, stage: &str) -> ResourceProfile {
        let mut profile = self.resources.get(stage).cloned().unwrap_or_default();
        if let Some(modules) = self.modules.get(stage) {
            for module in modules {
                if !profile.modules.contains(module) {
                    profile.modules.push(module.clone());
                }
            }
        }
        profile
    }
}

// Literal patterns, covered by tests.
#[allow(clippy::expect_used)]
fn resource_patterns() -> &'static (Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        (
            Regex::new(TIME_PATTERN).expect("time pattern compiles"),
            Regex::new(MEMORY_PATTERN).expect("memory pattern compiles"),
        )
    })
}
