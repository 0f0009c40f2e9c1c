//! Rendering a stage into a Slurm batch script on disk.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::core::{JobHandle, ResourceProfile};
use crate::errors::SeqflowError;
use crate::scheduler::dependency_expression;
use crate::script::command::{quote, CommandScript};

/// Everything needed to render one job script.
#[derive(Debug, Clone)]
pub struct ScriptProfile {
    /// Job name.
    pub name: String,
    /// Directory receiving the script and the job's stdout/stderr.
    pub log_dir: PathBuf,
    /// Command body.
    pub command: CommandScript,
    /// Modules to load.
    pub modules: Vec<String>,
    /// Wall-time limit.
    pub max_time: String,
    /// Memory request.
    pub memory: String,
    /// CPUs per task.
    pub cpus_per_task: u32,
    /// Upstream jobs. Empty handles are ignored.
    pub dependencies: Vec<JobHandle>,
    /// Extra scheduler directives.
    pub extra_scheduler_args: Vec<String>,
    /// Whether upstream failure cancels the job.
    pub kill_on_error: bool,
}

impl ScriptProfile {
    /// Creates a profile with default resources and no dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>, log_dir: impl Into<PathBuf>, command: CommandScript) -> Self {
        let defaults = ResourceProfile::default();
        Self {
            name: name.into(),
            log_dir: log_dir.into(),
            command,
            modules: defaults.modules,
            max_time: defaults.max_time,
            memory: defaults.memory,
            cpus_per_task: defaults.cpus_per_task,
            dependencies: Vec::new(),
            extra_scheduler_args: defaults.extra_args,
            kill_on_error: true,
        }
    }

    /// Copies time, memory, CPUs, extra flags and modules from a resource profile.
    #[must_use]
    pub fn with_resources(mut self, resources: &ResourceProfile) -> Self {
        self.max_time.clone_from(&resources.max_time);
        self.memory.clone_from(&resources.memory);
        self.cpus_per_task = resources.cpus_per_task;
        self.extra_scheduler_args.clone_from(&resources.extra_args);
        self.modules.clone_from(&resources.modules);
        self
    }

    /// Sets the upstream jobs.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<JobHandle>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Sets whether upstream failure cancels the job.
    #[must_use]
    pub fn with_kill_on_error(mut self, kill_on_error: bool) -> Self {
        self.kill_on_error = kill_on_error;
        self
    }

    /// Path the script is written to.
    #[must_use]
    pub fn script_path(&self) -> PathBuf {
        self.log_dir.join(format!("{}.sh", script_stem(&self.name)))
    }
}

/// A rendered script, ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptHandle {
    /// Job name.
    pub name: String,
    /// Script location.
    pub path: PathBuf,
    /// Non-empty upstream handles embedded in the script.
    pub dependencies: Vec<JobHandle>,
    /// Whether upstream failure cancels the job.
    pub kill_on_error: bool,
}

/// Derives a file-safe, collision-free stem from a job name.
///
/// Characters outside `[A-Za-z0-9._-]` become `_`. If anything was replaced,
/// a short digest of the original name is appended so two names that
/// sanitize alike still get distinct files.
#[must_use]
pub fn script_stem(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized == name && !name.is_empty() {
        return sanitized;
    }

    let digest = Sha256::digest(name.as_bytes());
    format!("{sanitized}_{}", hex::encode(&digest[..4]))
}

/// Renders the script text without touching the filesystem.
#[must_use]
pub fn render_text(profile: &ScriptProfile) -> String {
    let stem = script_stem(&profile.name);
    let log_dir = profile.log_dir.display();
    let mut lines = vec![
        "#!/bin/bash".to_string(),
        format!("#SBATCH --job-name={stem}"),
        format!("#SBATCH --time={}", profile.max_time),
        format!("#SBATCH --mem={}", profile.memory),
        format!("#SBATCH --cpus-per-task={}", profile.cpus_per_task),
        format!("#SBATCH --output={log_dir}/{stem}.%j.out"),
        format!("#SBATCH --error={log_dir}/{stem}.%j.err"),
    ];

    if let Some(expr) = dependency_expression(&profile.dependencies, profile.kill_on_error) {
        lines.push(format!("#SBATCH --dependency={expr}"));
        if profile.kill_on_error {
            lines.push("#SBATCH --kill-on-invalid-dep=yes".to_string());
        }
    }
    lines.extend(profile.extra_scheduler_args.iter().map(|arg| format!("#SBATCH {arg}")));

    lines.push(String::new());
    lines.extend(profile.modules.iter().map(|module| format!("module load {}", quote(module))));
    lines.push("set -eo pipefail".to_string());
    lines.push(String::new());
    lines.push(profile.command.render());

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Writes the script for `profile` into its log directory.
///
/// Re-rendering the same name overwrites the previous script. Nothing is
/// executed.
pub fn render(profile: &ScriptProfile) -> Result<ScriptHandle, SeqflowError> {
    std::fs::create_dir_all(&profile.log_dir)
        .map_err(|e| SeqflowError::filesystem(&profile.log_dir, e))?;

    let path = profile.script_path();
    let text = render_text(profile);
    std::fs::write(&path, text).map_err(|e| SeqflowError::filesystem(&path, e))?;
    make_executable(&path)?;

    tracing::debug!(job = %profile.name, script = %path.display(), "Rendered job script");

    Ok(ScriptHandle {
        name: profile.name.clone(),
        path,
        dependencies: JobHandle::submitted(&profile.dependencies),
        kill_on_error: profile.kill_on_error,
    })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), SeqflowError> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)
        .map_err(|e| SeqflowError::filesystem(path, e))?
        .permissions();
    perms.set_mode(0o750);
    std::fs::set_permissions(path, perms).map_err(|e| SeqflowError::filesystem(path, e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), SeqflowError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ShellCommand;

    fn profile(dir: &Path) -> ScriptProfile {
        ScriptProfile::new(
            "P1_call",
            dir,
            CommandScript::new().run(ShellCommand::new("gatk").args(["Mutect2", "-I", "/data/P1 T.bam"])),
        )
    }

    #[test]
    fn test_script_stem_keeps_safe_names() {
        assert_eq!(script_stem("P1_call"), "P1_call");
        assert_eq!(script_stem("run.bwa-mem"), "run.bwa-mem");
    }

    #[test]
    fn test_script_stem_disambiguates_sanitized_names() {
        let a = script_stem("P1/call");
        let b = script_stem("P1 call");
        assert!(a.starts_with("P1_call_"));
        assert!(b.starts_with("P1_call_"));
        assert_ne!(a, b);
        assert_ne!(a, "P1_call");
    }

    #[test]
    fn test_render_text_directives() {
        let dir = PathBuf::from("/out/P1/logs");
        let resources = ResourceProfile::new("24:00:00", "8G")
            .with_cpus(4)
            .with_extra_arg("--partition=himem")
            .with_modules(["gatk/4.2.6.1"]);
        let text = render_text(&profile(&dir).with_resources(&resources));

        assert!(text.starts_with("#!/bin/bash\n"));
        assert!(text.contains("#SBATCH --job-name=P1_call\n"));
        assert!(text.contains("#SBATCH --time=24:00:00\n"));
        assert!(text.contains("#SBATCH --mem=8G\n"));
        assert!(text.contains("#SBATCH --cpus-per-task=4\n"));
        assert!(text.contains("#SBATCH --partition=himem\n"));
        assert!(text.contains("module load gatk/4.2.6.1\n"));
        assert!(text.contains("gatk Mutect2 -I '/data/P1 T.bam'"));
        assert!(!text.contains("--dependency"));
    }

    #[test]
    fn test_render_text_layout() {
        let dir = PathBuf::from("/out/P1/logs");
        let resources = ResourceProfile::new("01:00:00", "2G")
            .with_cpus(2)
            .with_modules(["gatk/4.2.6.1"]);
        let text = render_text(
            &profile(&dir)
                .with_resources(&resources)
                .with_dependencies(vec![JobHandle::new("5")]),
        );

        assert_eq!(
            text,
            "#!/bin/bash\n\
             #SBATCH --job-name=P1_call\n\
             #SBATCH --time=01:00:00\n\
             #SBATCH --mem=2G\n\
             #SBATCH --cpus-per-task=2\n\
             #SBATCH --output=/out/P1/logs/P1_call.%j.out\n\
             #SBATCH --error=/out/P1/logs/P1_call.%j.err\n\
             #SBATCH --dependency=afterok:5\n\
             #SBATCH --kill-on-invalid-dep=yes\n\
             \n\
             module load gatk/4.2.6.1\n\
             set -eo pipefail\n\
             \n\
             gatk Mutect2 -I '/data/P1 T.bam'\n"
        );
    }

    #[test]
    fn test_render_text_dependencies_filter_empty() {
        let dir = PathBuf::from("/out/P1/logs");
        let text = render_text(
            &profile(&dir).with_dependencies(vec![
                JobHandle::new("11"),
                JobHandle::empty(),
                JobHandle::new("12"),
            ]),
        );
        assert!(text.contains("#SBATCH --dependency=afterok:11:12\n"));
        assert!(text.contains("#SBATCH --kill-on-invalid-dep=yes\n"));
    }

    #[test]
    fn test_render_text_keep_going_uses_afterany() {
        let dir = PathBuf::from("/out/logs");
        let text = render_text(
            &profile(&dir)
                .with_dependencies(vec![JobHandle::new("7")])
                .with_kill_on_error(false),
        );
        assert!(text.contains("#SBATCH --dependency=afterany:7\n"));
        assert!(!text.contains("kill-on-invalid-dep"));
    }

    #[test]
    fn test_render_writes_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        let first = render(&profile(&log_dir)).unwrap();
        assert!(first.path.exists());
        assert_eq!(first.path, log_dir.join("P1_call.sh"));

        let second = render(
            &profile(&log_dir).with_dependencies(vec![JobHandle::new("99"), JobHandle::empty()]),
        )
        .unwrap();
        assert_eq!(first.path, second.path);
        assert_eq!(second.dependencies, vec![JobHandle::new("99")]);

        let text = std::fs::read_to_string(&second.path).unwrap();
        assert_eq!(text.matches("#!/bin/bash").count(), 1);
        assert!(text.contains("afterok:99"));
    }
}
