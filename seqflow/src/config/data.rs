//! Data descriptor: cohort membership and input locations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::context::UnitScope;
use super::read_descriptor;
use crate::core::{Cohort, Role, Sample, Unit};
use crate::errors::ConfigError;

/// The data descriptor (`-d/--data`): unit id → role → sample id → input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Units keyed by id.
    #[serde(default)]
    pub cohort: BTreeMap<String, BTreeMap<Role, BTreeMap<String, PathBuf>>>,
}

impl DataConfig {
    /// Loads a descriptor.
    ///
    /// # Errors
    ///
    /// `MissingFile` or `Parse`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = read_descriptor(path)?;
        let config: Self = serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        tracing::debug!(units = config.cohort.len(), "Loaded data descriptor");
        Ok(config)
    }

    /// Builds the cohort at the given granularity.
    #[must_use]
    pub fn to_cohort(&self, scope: UnitScope) -> Cohort {
        let mut units = Vec::new();
        for (unit_id, roles) in &self.cohort {
            let samples: Vec<Sample> = roles
                .iter()
                .flat_map(|(role, samples)| {
                    samples
                        .iter()
                        .map(move |(id, input)| Sample::new(id.clone(), *role, input.clone()))
                })
                .collect();

            match scope {
                UnitScope::Patient => units.push(Unit::patient(unit_id.clone(), samples)),
                UnitScope::Sample => units.extend(samples.into_iter().map(Unit::sample)),
            }
        }
        Cohort::new(units)
    }
}
