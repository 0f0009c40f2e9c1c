//! Units of work and the cohort they form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::ConfigError;

/// Biological role of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Matched normal.
    Normal,
    /// Tumour sample.
    #[serde(alias = "tumor")]
    Tumour,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Tumour => write!(f, "tumour"),
        }
    }
}

impl FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "tumour" | "tumor" => Ok(Self::Tumour),
            _ => Err(ConfigError::unsupported("role", s, &["normal", "tumour"])),
        }
    }
}

/// One sequenced sample and its input location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Sample identifier.
    pub id: String,
    /// Sample role.
    pub role: Role,
    /// Input file (BAM, FASTQ list, ...).
    pub input: PathBuf,
}

impl Sample {
    /// Creates a sample.
    #[must_use]
    pub fn new(id: impl Into<String>, role: Role, input: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            role,
            input: input.into(),
        }
    }
}

/// The entity a stage chain is instantiated over: one sample, or one patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Unit identifier (sample id or patient id).
    pub id: String,
    /// Role for sample-level units; `None` for patient-level units.
    pub role: Option<Role>,
    /// Samples owned by this unit, sorted by id.
    pub samples: Vec<Sample>,
}

impl Unit {
    /// A sample-level unit.
    #[must_use]
    pub fn sample(sample: Sample) -> Self {
        Self {
            id: sample.id.clone(),
            role: Some(sample.role),
            samples: vec![sample],
        }
    }

    /// A patient-level unit owning several samples.
    #[must_use]
    pub fn patient(id: impl Into<String>, mut samples: Vec<Sample>) -> Self {
        samples.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            id: id.into(),
            role: None,
            samples,
        }
    }

    /// Returns true if this unit carries the role, directly or via a sample.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        match self.role {
            Some(own) => own == role,
            None => self.samples.iter().any(|s| s.role == role),
        }
    }

    /// Returns true if a stage restricted to `roles` applies (empty = all).
    #[must_use]
    pub fn matches_any(&self, roles: &[Role]) -> bool {
        roles.is_empty() || roles.iter().any(|r| self.has_role(*r))
    }

    /// First sample with the given role.
    #[must_use]
    pub fn first_with_role(&self, role: Role) -> Option<&Sample> {
        self.samples.iter().find(|s| s.role == role)
    }
}

/// All units processed in one invocation, in deterministic id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cohort {
    units: Vec<Unit>,
}

impl Cohort {
    /// Creates a cohort, sorting units by id.
    #[must_use]
    pub fn new(mut units: Vec<Unit>) -> Self {
        units.sort_by(|a, b| a.id.cmp(&b.id));
        Self { units }
    }

    /// Units in processing order.
    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Returns the number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if the cohort has no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient() -> Unit {
        Unit::patient(
            "P1",
            vec![
                Sample::new("P1-T", Role::Tumour, "/data/P1-T.bam"),
                Sample::new("P1-N", Role::Normal, "/data/P1-N.bam"),
            ],
        )
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("tumor".parse::<Role>().unwrap(), Role::Tumour);
        assert_eq!("Normal".parse::<Role>().unwrap(), Role::Normal);
        assert!("germline".parse::<Role>().is_err());
    }

    #[test]
    fn test_patient_samples_sorted() {
        let unit = patient();
        assert_eq!(unit.samples[0].id, "P1-N");
        assert!(unit.role.is_none());
    }

    #[test]
    fn test_role_matching() {
        let unit = patient();
        assert!(unit.has_role(Role::Tumour));
        assert!(unit.matches_any(&[]));

        let normal = Unit::sample(Sample::new("S1", Role::Normal, "/data/S1.bam"));
        assert!(!normal.matches_any(&[Role::Tumour]));
        assert!(normal.matches_any(&[Role::Normal, Role::Tumour]));
    }

    #[test]
    fn test_cohort_sorted() {
        let cohort = Cohort::new(vec![
            Unit::patient("P2", vec![]),
            Unit::patient("P1", vec![]),
        ]);
        let ids: Vec<&str> = cohort.units().iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["P1", "P2"]);
        assert_eq!(cohort.len(), 2);
    }
}
