//! Run configuration.
//!
//! Two YAML descriptors feed a run: the tool descriptor (stage catalogue,
//! resources, modules, reference build) and the data descriptor (cohort
//! membership). Both are loaded and validated before any job is built and
//! folded into one immutable [`RunContext`].

mod context;
mod data;
mod tool;

use std::path::Path;

use crate::errors::ConfigError;

pub use context::{RefBuild, RunContext, SeqType, UnitScope};
pub use data::DataConfig;
pub use tool::{CleanupSpec, CommandSpec, StageSpec, ToolConfig};

fn read_descriptor(path: &Path) -> Result<String, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
