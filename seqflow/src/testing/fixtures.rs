//! Filesystem fixtures.

use std::io;
use std::path::Path;

/// Writes a non-empty artifact, creating parent directories.
pub fn write_artifact(path: impl AsRef<Path>, contents: &str) -> io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = if contents.is_empty() { "done\n" } else { contents };
    std::fs::write(path, contents)
}

/// Writes a zero-byte artifact, creating parent directories.
pub fn write_empty_artifact(path: impl AsRef<Path>) -> io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, "")
}
