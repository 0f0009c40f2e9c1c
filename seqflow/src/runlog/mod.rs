//! Per-run narration log and run counter.
//!
//! Everything lives under `<out_dir>/logs/`:
//!
//! - `run_N_job_metrics_<timestamp>.txt`: touched on open, before any
//!   submission, so the next invocation counts it
//! - `run_N_<tool>_pipeline.log`: append-only narration
//! - `run_N_summary.json`: written once the run finishes
//!
//! `N` is one more than the number of `run_*` files whose name contains
//! `job_metrics`. The accounting job's own script and stdout share the
//! marker but not the prefix.

mod lock;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::core::RunPhase;
use crate::errors::SeqflowError;

pub use lock::{RunLock, LOCK_FILE_NAME};

/// Marker used to count previous runs.
pub const METRICS_MARKER: &str = "job_metrics";

/// Append-only narration for one pipeline run.
#[derive(Debug)]
pub struct RunLog {
    run_number: u32,
    run_id: Uuid,
    logs_dir: PathBuf,
    log_path: PathBuf,
    metrics_path: PathBuf,
    summary_path: PathBuf,
    file: Mutex<File>,
}

impl RunLog {
    /// Opens the log for a new run, creating `logs_dir` if needed.
    ///
    /// Derives the run counter and touches the metrics file before returning.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if the directory or files cannot be created.
    pub fn open(logs_dir: impl AsRef<Path>, tool: &str, run_id: Uuid) -> Result<Self, SeqflowError> {
        let logs_dir = logs_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&logs_dir).map_err(|e| SeqflowError::filesystem(&logs_dir, e))?;

        let run_number = next_run_number(&logs_dir)?;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");

        let metrics_path = logs_dir.join(format!("run_{run_number}_{METRICS_MARKER}_{stamp}.txt"));
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&metrics_path)
            .map_err(|e| SeqflowError::filesystem(&metrics_path, e))?;

        let log_path = logs_dir.join(format!("run_{run_number}_{tool}_pipeline.log"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| SeqflowError::filesystem(&log_path, e))?;

        let summary_path = logs_dir.join(format!("run_{run_number}_summary.json"));

        let log = Self {
            run_number,
            run_id,
            logs_dir,
            log_path,
            metrics_path,
            summary_path,
            file: Mutex::new(file),
        };
        log.narrate(&format!("run {run_number} ({run_id}) started for {tool}"))?;
        Ok(log)
    }

    /// Appends one timestamped line and mirrors it to `tracing`.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if the line cannot be written.
    pub fn narrate(&self, message: &str) -> Result<(), SeqflowError> {
        tracing::info!(run = self.run_number, "{message}");

        let line = format!("[{}] {message}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"));
        let mut file = self.file.lock();
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| SeqflowError::filesystem(&self.log_path, e))
    }

    /// Narrates a run state transition.
    pub fn phase(&self, from: RunPhase, to: RunPhase) -> Result<(), SeqflowError> {
        self.narrate(&format!("state {from} -> {to}"))
    }

    /// Writes the run summary as pretty JSON, replacing any previous one.
    pub fn write_summary<T: Serialize>(&self, summary: &T) -> Result<(), SeqflowError> {
        let json = serde_json::to_string_pretty(summary)
            .map_err(|e| SeqflowError::Serialization(e.to_string()))?;
        std::fs::write(&self.summary_path, json)
            .map_err(|e| SeqflowError::filesystem(&self.summary_path, e))
    }

    /// The run counter `N`.
    #[must_use]
    pub fn run_number(&self) -> u32 {
        self.run_number
    }

    /// Unique id of this run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The logs directory.
    #[must_use]
    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// The narration file.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// The metrics file the accounting job writes to.
    #[must_use]
    pub fn metrics_path(&self) -> &Path {
        &self.metrics_path
    }

    /// Where the summary is written.
    #[must_use]
    pub fn summary_path(&self) -> &Path {
        &self.summary_path
    }
}

fn next_run_number(logs_dir: &Path) -> Result<u32, SeqflowError> {
    let entries = std::fs::read_dir(logs_dir).map_err(|e| SeqflowError::filesystem(logs_dir, e))?;

    let mut previous = 0u32;
    for entry in entries {
        let entry = entry.map_err(|e| SeqflowError::filesystem(logs_dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("run_") && name.contains(METRICS_MARKER) {
            previous += 1;
        }
    }
    Ok(previous + 1)
}
