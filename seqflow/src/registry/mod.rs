//! Artifact registry: the orchestrator's only idempotency mechanism.
//!
//! A stage is considered complete when *every* artifact it declares exists
//! and is non-empty. This is a check-then-act test, not a lock; concurrent
//! orchestrators on one output directory are excluded by
//! [`RunLock`](crate::runlog::RunLock) instead.

use md5::{Digest, Md5};
use std::fs::File;
use std::io;
use std::path::Path;

use crate::core::{Artifact, ArtifactKind};
use crate::errors::SeqflowError;

/// Decides whether a stage must run based on its artifacts.
#[cfg_attr(test, mockall::automock)]
pub trait ArtifactRegistry: Send + Sync {
    /// Returns true if any artifact is missing or empty.
    ///
    /// An empty list always needs execution: a stage with no declared outputs
    /// can never be proven complete.
    fn needs_execution(&self, artifacts: &[Artifact]) -> Result<bool, SeqflowError>;
}

/// Registry backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsArtifactRegistry {
    verify_checksums: bool,
}

impl FsArtifactRegistry {
    /// Creates a registry that checks presence and size only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also verifies `.md5` sentinels against the file they describe.
    ///
    /// This reads the described file in full.
    #[must_use]
    pub fn with_checksum_verification(mut self) -> Self {
        self.verify_checksums = true;
        self
    }

    /// Returns the artifacts that are not yet satisfied.
    pub fn missing<'a>(&self, artifacts: &'a [Artifact]) -> Result<Vec<&'a Artifact>, SeqflowError> {
        let mut missing = Vec::new();
        for artifact in artifacts {
            if !self.is_satisfied(artifact)? {
                missing.push(artifact);
            }
        }
        Ok(missing)
    }

    fn is_satisfied(&self, artifact: &Artifact) -> Result<bool, SeqflowError> {
        if !non_empty(&artifact.path)? {
            return Ok(false);
        }
        if self.verify_checksums && artifact.kind == ArtifactKind::Md5Marker {
            return checksum_matches(artifact);
        }
        Ok(true)
    }
}

impl ArtifactRegistry for FsArtifactRegistry {
    fn needs_execution(&self, artifacts: &[Artifact]) -> Result<bool, SeqflowError> {
        if artifacts.is_empty() {
            return Ok(true);
        }
        for artifact in artifacts {
            if !self.is_satisfied(artifact)? {
                tracing::debug!(artifact = %artifact, "Artifact missing or empty");
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn non_empty(path: &Path) -> Result<bool, SeqflowError> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len() > 0),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SeqflowError::filesystem(path, e)),
    }
}

fn checksum_matches(sentinel: &Artifact) -> Result<bool, SeqflowError> {
    let Some(target) = sentinel.checksum_target() else {
        return Ok(false);
    };
    if !non_empty(&target)? {
        return Ok(false);
    }

    let recorded = std::fs::read_to_string(&sentinel.path)
        .map_err(|e| SeqflowError::filesystem(&sentinel.path, e))?;
    let Some(expected) = recorded.split_whitespace().next() else {
        return Ok(false);
    };

    let mut file = File::open(&target).map_err(|e| SeqflowError::filesystem(&target, e))?;
    let mut hasher = Md5::new();
    io::copy(&mut file, &mut hasher).map_err(|e| SeqflowError::filesystem(&target, e))?;
    let actual = hex::encode(hasher.finalize());

    let matches = actual.eq_ignore_ascii_case(expected);
    if !matches {
        tracing::warn!(
            file = %target.display(),
            expected,
            actual = %actual,
            "Checksum sentinel does not match file"
        );
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_artifact, write_empty_artifact};

    #[test]
    fn test_empty_list_needs_execution() {
        let registry = FsArtifactRegistry::new();
        assert!(registry.needs_execution(&[]).unwrap());
    }

    #[test]
    fn test_all_present_skips() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.vcf");
        let b = dir.path().join("b.COMPLETE");
        write_artifact(&a, "##fileformat=VCFv4.2\n").unwrap();
        write_artifact(&b, "").unwrap();

        let registry = FsArtifactRegistry::new();
        let artifacts = vec![Artifact::output(&a), Artifact::from_path(&b)];
        assert!(!registry.needs_execution(&artifacts).unwrap());
    }

    #[test]
    fn test_any_missing_needs_execution() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.bam");
        write_artifact(&present, "BAM").unwrap();

        let registry = FsArtifactRegistry::new();
        let artifacts = vec![
            Artifact::output(&present),
            Artifact::output(dir.path().join("absent.bam")),
        ];
        assert!(registry.needs_execution(&artifacts).unwrap());
        assert_eq!(registry.missing(&artifacts).unwrap().len(), 1);
    }

    #[test]
    fn test_zero_size_needs_execution() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.vcf");
        write_empty_artifact(&empty).unwrap();

        let registry = FsArtifactRegistry::new();
        assert!(registry.needs_execution(&[Artifact::output(&empty)]).unwrap());
    }

    #[test]
    fn test_checksum_verification() {
        let dir = tempfile::tempdir().unwrap();
        let bam = dir.path().join("P1.bam");
        write_artifact(&bam, "hello").unwrap();
        let sentinel = Artifact::md5_marker(&bam);
        // md5("hello")
        write_artifact(&sentinel.path, "5d41402abc4b2a76b9719d911017c592  P1.bam\n").unwrap();

        let registry = FsArtifactRegistry::new().with_checksum_verification();
        assert!(!registry.needs_execution(&[sentinel.clone()]).unwrap());

        write_artifact(&bam, "hello, world").unwrap();
        assert!(registry.needs_execution(&[sentinel.clone()]).unwrap());

        // Without verification only presence counts.
        assert!(!FsArtifactRegistry::new().needs_execution(&[sentinel]).unwrap());
    }
}
