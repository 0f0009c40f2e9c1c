//! Testing utilities for seqflow pipelines.
//!
//! This module provides:
//! - A recording scheduler backend with canned accounting responses
//! - Helpers for laying down artifacts in scratch directories

mod fixtures;
mod mocks;

pub use fixtures::{write_artifact, write_empty_artifact};
pub use mocks::RecordingBackend;
