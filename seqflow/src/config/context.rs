//! Immutable per-run settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::ConfigError;
use crate::monitor::MonitorConfig;
use crate::scheduler::BackendKind;

/// Reference genome build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RefBuild {
    /// UCSC hg19.
    Hg19,
    /// UCSC hg38.
    Hg38,
    /// GRC build 37.
    Grch37,
    /// GRC build 38.
    Grch38,
}

impl RefBuild {
    const NAMES: [&'static str; 4] = ["hg19", "hg38", "GRCh37", "GRCh38"];

    /// Canonical name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hg19 => "hg19",
            Self::Hg38 => "hg38",
            Self::Grch37 => "GRCh37",
            Self::Grch38 => "GRCh38",
        }
    }

    /// The GRC assembly this build corresponds to.
    #[must_use]
    pub fn assembly(self) -> &'static str {
        match self {
            Self::Hg19 | Self::Grch37 => "GRCh37",
            Self::Hg38 | Self::Grch38 => "GRCh38",
        }
    }

    /// Contig prefix used by the build's naming convention.
    #[must_use]
    pub fn chromosome_prefix(self) -> &'static str {
        match self {
            Self::Hg19 | Self::Hg38 => "chr",
            Self::Grch37 | Self::Grch38 => "",
        }
    }
}

impl fmt::Display for RefBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefBuild {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hg19" => Ok(Self::Hg19),
            "hg38" => Ok(Self::Hg38),
            "grch37" => Ok(Self::Grch37),
            "grch38" => Ok(Self::Grch38),
            _ => Err(ConfigError::unsupported("ref_type", s, &Self::NAMES)),
        }
    }
}

impl TryFrom<String> for RefBuild {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RefBuild> for String {
    fn from(value: RefBuild) -> Self {
        value.as_str().to_string()
    }
}

/// Sequencing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SeqType {
    /// Whole genome.
    Wgs,
    /// Whole exome capture.
    Exome,
    /// Targeted panel.
    Targeted,
    /// Transcriptome.
    Rna,
}

impl SeqType {
    const NAMES: [&'static str; 4] = ["wgs", "exome", "targeted", "rna"];

    /// Canonical name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wgs => "wgs",
            Self::Exome => "exome",
            Self::Targeted => "targeted",
            Self::Rna => "rna",
        }
    }

    /// True for capture-based strategies that restrict calling to intervals.
    #[must_use]
    pub fn is_capture(self) -> bool {
        match self {
            Self::Exome | Self::Targeted => true,
            Self::Wgs | Self::Rna => false,
        }
    }
}

impl fmt::Display for SeqType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeqType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wgs" => Ok(Self::Wgs),
            "exome" => Ok(Self::Exome),
            "targeted" => Ok(Self::Targeted),
            "rna" => Ok(Self::Rna),
            _ => Err(ConfigError::unsupported("seq_type", s, &Self::NAMES)),
        }
    }
}

impl TryFrom<String> for SeqType {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SeqType> for String {
    fn from(value: SeqType) -> Self {
        value.as_str().to_string()
    }
}

/// Granularity at which stage chains fan out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitScope {
    /// One unit per patient, owning all its samples.
    #[default]
    Patient,
    /// One unit per sample.
    Sample,
}

/// Settings for one invocation, built once and shared read-only.
#[derive(Debug, Clone)]
pub struct RunContext {
    tool: String,
    out_dir: PathBuf,
    ref_build: RefBuild,
    seq_type: SeqType,
    unit_scope: UnitScope,
    backend: BackendKind,
    remove: bool,
    dry_run: bool,
    no_wait: bool,
    monitor: MonitorConfig,
}

impl RunContext {
    /// Creates a context with the default backend and all flags off.
    #[must_use]
    pub fn new(
        tool: impl Into<String>,
        out_dir: impl Into<PathBuf>,
        ref_build: RefBuild,
        seq_type: SeqType,
    ) -> Self {
        Self {
            tool: tool.into(),
            out_dir: out_dir.into(),
            ref_build,
            seq_type,
            unit_scope: UnitScope::default(),
            backend: BackendKind::default(),
            remove: false,
            dry_run: false,
            no_wait: false,
            monitor: MonitorConfig::default(),
        }
    }

    /// Sets the unit scope.
    #[must_use]
    pub fn with_unit_scope(mut self, scope: UnitScope) -> Self {
        self.unit_scope = scope;
        self
    }

    /// Sets the scheduler backend.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Enables cleanup jobs.
    #[must_use]
    pub fn with_remove(mut self, remove: bool) -> Self {
        self.remove = remove;
        self
    }

    /// Enables dry-run.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Skips waiting on the metrics job.
    #[must_use]
    pub fn with_no_wait(mut self, no_wait: bool) -> Self {
        self.no_wait = no_wait;
        self
    }

    /// Sets the monitor configuration.
    #[must_use]
    pub fn with_monitor(mut self, monitor: MonitorConfig) -> Self {
        self.monitor = monitor;
        self
    }

    /// Tool name.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Output root.
    #[must_use]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Reference build.
    #[must_use]
    pub fn ref_build(&self) -> RefBuild {
        self.ref_build
    }

    /// Sequencing type.
    #[must_use]
    pub fn seq_type(&self) -> SeqType {
        self.seq_type
    }

    /// Unit scope.
    #[must_use]
    pub fn unit_scope(&self) -> UnitScope {
        self.unit_scope
    }

    /// Scheduler backend.
    #[must_use]
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Whether cleanup jobs are submitted.
    #[must_use]
    pub fn remove(&self) -> bool {
        self.remove
    }

    /// Whether submissions are suppressed.
    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Whether the metrics job is left unwatched.
    #[must_use]
    pub fn no_wait(&self) -> bool {
        self.no_wait
    }

    /// Monitor settings.
    #[must_use]
    pub fn monitor(&self) -> MonitorConfig {
        self.monitor
    }

    /// `<out_dir>/logs`.
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.out_dir.join("logs")
    }

    /// `<out_dir>/<unit>`.
    #[must_use]
    pub fn unit_dir(&self, unit: &str) -> PathBuf {
        self.out_dir.join(unit)
    }

    /// `<out_dir>/<unit>/logs`, where unit scripts are rendered.
    #[must_use]
    pub fn unit_logs_dir(&self, unit: &str) -> PathBuf {
        self.unit_dir(unit).join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_build_parsing() {
        assert_eq!("GRCh38".parse::<RefBuild>().unwrap(), RefBuild::Grch38);
        assert_eq!("hg19".parse::<RefBuild>().unwrap(), RefBuild::Hg19);
        let err = "mm10".parse::<RefBuild>().unwrap_err();
        assert!(err.to_string().contains("hg19, hg38, GRCh37, GRCh38"));
    }

    #[test]
    fn test_ref_build_conventions() {
        assert_eq!(RefBuild::Hg19.assembly(), "GRCh37");
        assert_eq!(RefBuild::Hg38.chromosome_prefix(), "chr");
        assert_eq!(RefBuild::Grch38.chromosome_prefix(), "");
    }

    #[test]
    fn test_seq_type_parsing() {
        assert_eq!("WGS".parse::<SeqType>().unwrap(), SeqType::Wgs);
        assert!(SeqType::Exome.is_capture());
        assert!(!SeqType::Rna.is_capture());
        assert!("panel".parse::<SeqType>().is_err());
    }

    #[test]
    fn test_enums_deserialize_strictly() {
        let build: RefBuild = serde_yaml::from_str("GRCh37").unwrap();
        assert_eq!(build, RefBuild::Grch37);
        assert!(serde_yaml::from_str::<SeqType>("chip").is_err());
    }

    #[test]
    fn test_context_paths() {
        let ctx = RunContext::new("mutect2", "/out", RefBuild::Hg38, SeqType::Wgs)
            .with_remove(true)
            .with_dry_run(true);

        assert_eq!(ctx.logs_dir(), PathBuf::from("/out/logs"));
        assert_eq!(ctx.unit_logs_dir("P1"), PathBuf::from("/out/P1/logs"));
        assert!(ctx.remove());
        assert!(ctx.dry_run());
        assert!(!ctx.no_wait());
        assert_eq!(ctx.unit_scope(), UnitScope::Patient);
    }
}
