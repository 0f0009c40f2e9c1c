//! seqflow: submit a genomics tool's stage graph for a cohort to an HPC
//! batch scheduler.
//!
//! # Usage
//!
//! ```bash
//! seqflow -t mutect2.yaml -d cohort.yaml -o /scratch/run1
//! seqflow -t mutect2.yaml -d cohort.yaml -o /scratch/run1 --dry-run
//! RUST_LOG=seqflow=debug seqflow -t mutect2.yaml -d cohort.yaml -o /scratch/run1 --no-wait
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use seqflow::config::{DataConfig, RunContext, ToolConfig};
use seqflow::monitor::MonitorConfig;
use seqflow::runlog::{RunLock, RunLog};
use seqflow::runner::{CataloguePlan, PipelineRunner};
use seqflow::scheduler::{BackendKind, SchedulerClient};

#[derive(Debug, Parser)]
#[command(name = "seqflow", version, about)]
struct Cli {
    /// Tool descriptor (YAML).
    #[arg(short = 't', long)]
    tool: PathBuf,

    /// Data descriptor (YAML).
    #[arg(short = 'd', long)]
    data: PathBuf,

    /// Output directory; logs go to `<out_dir>/logs`.
    #[arg(short = 'o', long = "out_dir")]
    out_dir: PathBuf,

    /// Scheduler backend.
    #[arg(short = 'c', long, value_enum, default_value_t = BackendKind::Slurm)]
    cluster: BackendKind,

    /// Submit cleanup jobs that remove intermediates once final outputs exist.
    #[arg(long)]
    remove: bool,

    /// Decide and log everything, submit nothing.
    #[arg(long)]
    dry_run: bool,

    /// Do not wait for the job-metrics job.
    #[arg(long)]
    no_wait: bool,

    /// Seconds between accounting polls.
    #[arg(long, value_name = "SECS")]
    poll_interval: Option<u64>,

    /// Debug-level console output.
    #[arg(short, long)]
    verbose: bool,
}

/// `RUST_LOG` when set and parseable, otherwise the `--verbose` default.
fn console_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    let fallback = if verbose { "seqflow=debug" } else { "seqflow=info" };
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(fallback))
}

fn init_tracing(verbose: bool) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(console_filter(verbose, rust_log.as_deref()))
        .try_init()?;
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let tool = ToolConfig::load(&cli.tool)
        .with_context(|| format!("Failed to load tool descriptor {}", cli.tool.display()))?;
    let data = DataConfig::load(&cli.data)
        .with_context(|| format!("Failed to load data descriptor {}", cli.data.display()))?;
    let cohort = data.to_cohort(tool.unit_scope);

    let mut monitor = MonitorConfig::default();
    if let Some(secs) = cli.poll_interval {
        monitor = monitor.with_poll_interval(Duration::from_secs(secs));
    }

    let ctx = RunContext::new(tool.tool.clone(), cli.out_dir, tool.ref_type, tool.seq_type)
        .with_unit_scope(tool.unit_scope)
        .with_backend(cli.cluster)
        .with_remove(cli.remove)
        .with_dry_run(cli.dry_run)
        .with_no_wait(cli.no_wait)
        .with_monitor(monitor);

    let run_id = Uuid::new_v4();
    let _lock = RunLock::acquire(ctx.logs_dir(), run_id).context("Failed to lock output directory")?;
    let log = RunLog::open(ctx.logs_dir(), ctx.tool(), run_id).context("Failed to open run log")?;

    tracing::info!(
        tool = ctx.tool(),
        units = cohort.len(),
        run = log.run_number(),
        "Starting run"
    );

    let client = SchedulerClient::for_backend(ctx.backend(), ctx.dry_run());
    let runner = PipelineRunner::new(ctx, client, log);
    let summary = runner
        .run(&cohort, &CataloguePlan::new(tool))
        .await
        .context("Run failed")?;

    tracing::info!(
        run = summary.run_number,
        jobs = summary.jobs.len(),
        skipped = summary.skipped_stages,
        summary = %runner.log().summary_path().display(),
        "Run finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("seqflow: failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("seqflow: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(filter: EnvFilter) -> String {
        filter.to_string().to_lowercase()
    }

    #[test]
    fn test_rust_log_overrides_default_level() {
        assert_eq!(rendered(console_filter(false, Some("seqflow=debug"))), "seqflow=debug");
        assert_eq!(rendered(console_filter(true, Some("seqflow=warn"))), "seqflow=warn");
    }

    #[test]
    fn test_default_level_without_rust_log() {
        assert_eq!(rendered(console_filter(false, None)), "seqflow=info");
        assert_eq!(rendered(console_filter(true, None)), "seqflow=debug");
        assert_eq!(rendered(console_filter(true, Some("  "))), "seqflow=debug");
    }

    #[test]
    fn test_unparseable_rust_log_falls_back() {
        assert_eq!(rendered(console_filter(false, Some("seqflow=loud"))), "seqflow=info");
    }
}
