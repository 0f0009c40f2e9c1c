//! Core domain model types for seqflow.
//!
//! This module contains the fundamental types used throughout the orchestrator:
//! - Units, samples and the cohort they form
//! - Artifacts that prove a stage already ran
//! - Stage definitions and their resource profiles
//! - Job handles, records and status enums

mod artifact;
mod job;
mod resources;
mod stage;
mod status;
mod unit;

pub use artifact::{Artifact, ArtifactKind};
pub use job::{JobHandle, JobKind, JobRecord};
pub use resources::ResourceProfile;
pub use stage::StageDefinition;
pub use status::{JobStatus, RunPhase};
pub use unit::{Cohort, Role, Sample, Unit};
