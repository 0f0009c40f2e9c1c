//! Artifacts: filesystem outputs that prove a stage already ran.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// Suffix of completion sentinels.
pub const COMPLETE_SUFFIX: &str = ".COMPLETE";
/// Suffix of checksum sentinels.
pub const MD5_SUFFIX: &str = ".md5";

/// How an artifact signals completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// The stage's primary output file.
    #[default]
    Primary,
    /// A `<stem>.COMPLETE` marker touched once the stage succeeded.
    CompleteMarker,
    /// A `<file>.md5` checksum written after the file it describes.
    Md5Marker,
}

/// A path whose presence and non-zero size signals stage completion.
///
/// Sentinels are used where the primary output is large, multi-file or
/// streamed, so its own existence says little about whether it is finished.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    /// Filesystem location.
    pub path: PathBuf,
    /// Completion protocol.
    #[serde(default)]
    pub kind: ArtifactKind,
}

impl Artifact {
    /// A primary output file.
    #[must_use]
    pub fn output(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ArtifactKind::Primary,
        }
    }

    /// The `<stem>.COMPLETE` sentinel for a stem path.
    #[must_use]
    pub fn complete_marker(stem: impl AsRef<Path>) -> Self {
        Self {
            path: with_suffix(stem.as_ref(), COMPLETE_SUFFIX),
            kind: ArtifactKind::CompleteMarker,
        }
    }

    /// The `<file>.md5` sentinel describing `target`.
    #[must_use]
    pub fn md5_marker(target: impl AsRef<Path>) -> Self {
        Self {
            path: with_suffix(target.as_ref(), MD5_SUFFIX),
            kind: ArtifactKind::Md5Marker,
        }
    }

    /// Infers the kind from the file name.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.to_string_lossy();
        let kind = if name.ends_with(COMPLETE_SUFFIX) {
            ArtifactKind::CompleteMarker
        } else if name.ends_with(MD5_SUFFIX) {
            ArtifactKind::Md5Marker
        } else {
            ArtifactKind::Primary
        };
        Self { path, kind }
    }

    /// For an md5 sentinel, the file whose digest it records.
    #[must_use]
    pub fn checksum_target(&self) -> Option<PathBuf> {
        if self.kind != ArtifactKind::Md5Marker {
            return None;
        }
        let name = self.path.to_string_lossy();
        name.strip_suffix(MD5_SUFFIX).map(PathBuf::from)
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
