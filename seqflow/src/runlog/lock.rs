//! Exclusive ownership of an output directory.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::errors::{ConfigError, SeqflowError};

/// Lock file name inside the logs directory.
pub const LOCK_FILE_NAME: &str = "seqflow.lock";

/// Held for the lifetime of one orchestrator invocation.
///
/// The lock file is created with create-new semantics, so a second
/// invocation against the same output directory fails before building any
/// job. The file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Takes the lock in `logs_dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// `ConfigError::Locked` if another run holds it; filesystem errors
    /// otherwise.
    pub fn acquire(logs_dir: impl AsRef<Path>, run_id: Uuid) -> Result<Self, SeqflowError> {
        let logs_dir = logs_dir.as_ref();
        std::fs::create_dir_all(logs_dir).map_err(|e| SeqflowError::filesystem(logs_dir, e))?;

        let path = logs_dir.join(LOCK_FILE_NAME);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let owner = std::fs::read_to_string(&path)
                    .map(|s| s.trim().replace('\n', ", "))
                    .unwrap_or_else(|_| "unknown owner".to_string());
                return Err(ConfigError::Locked { path, owner }.into());
            }
            Err(e) => return Err(SeqflowError::filesystem(&path, e)),
        };

        writeln!(file, "pid={}", std::process::id())
            .and_then(|()| writeln!(file, "run_id={run_id}"))
            .map_err(|e| SeqflowError::filesystem(&path, e))?;

        tracing::debug!(lock = %path.display(), "Acquired output directory lock");
        Ok(Self { path })
    }

    /// The lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), error = %e, "Failed to remove lock file");
        }
    }
}
