//! Scheduler resource profile for a stage.

use serde::{Deserialize, Serialize};

/// Wall time, memory, CPUs, extra scheduler flags and modules for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProfile {
    /// Wall-time limit in scheduler syntax (`[D-]HH:MM:SS`).
    #[serde(alias = "time", default = "default_time")]
    pub max_time: String,
    /// Memory request in scheduler syntax (`4G`, `500M`).
    #[serde(alias = "mem", default = "default_memory")]
    pub memory: String,
    /// CPUs per task.
    #[serde(alias = "cpus", default = "default_cpus")]
    pub cpus_per_task: u32,
    /// Extra scheduler flags, one directive each.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Environment modules to load before the command runs.
    #[serde(default)]
    pub modules: Vec<String>,
}

fn default_time() -> String {
    "01:00:00".to_string()
}

fn default_memory() -> String {
    "1G".to_string()
}

const fn default_cpus() -> u32 {
    1
}

impl Default for ResourceProfile {
    fn default() -> Self {
        Self {
            max_time: default_time(),
            memory: default_memory(),
            cpus_per_task: default_cpus(),
            extra_args: Vec::new(),
            modules: Vec::new(),
        }
    }
}

impl ResourceProfile {
    /// Creates a profile with explicit time and memory.
    #[must_use]
    pub fn new(max_time: impl Into<String>, memory: impl Into<String>) -> Self {
        Self {
            max_time: max_time.into(),
            memory: memory.into(),
            ..Self::default()
        }
    }

    /// Sets CPUs per task.
    #[must_use]
    pub fn with_cpus(mut self, cpus: u32) -> Self {
        self.cpus_per_task = cpus.max(1);
        self
    }

    /// Adds an extra scheduler flag.
    #[must_use]
    pub fn with_extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Adds modules to load.
    #[must_use]
    pub fn with_modules(mut self, modules: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.modules.extend(modules.into_iter().map(Into::into));
        self
    }
}
