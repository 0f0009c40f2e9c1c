//! Structured command model.
//!
//! Commands are kept as a program plus an argument vector and only turned
//! into shell text at render time, with every word quoted explicitly. Paths
//! with spaces or quotes therefore never change the shape of a command.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

const INDENT: &str = "    ";

/// Quotes a word for a POSIX shell.
///
/// Words made only of safe characters are left as they are; everything else
/// is wrapped in single quotes, with embedded single quotes spliced as `'\''`.
#[must_use]
pub fn quote(word: &str) -> Cow<'_, str> {
    let safe = !word.is_empty()
        && word
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"_@%+=:,./-".contains(&b));
    if safe {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy()).into_owned()
}

/// A program invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
    /// Truncated and written when set.
    stdout: Option<PathBuf>,
}

impl ShellCommand {
    /// Creates a command for a program.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdout: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends a path argument.
    #[must_use]
    pub fn path_arg(self, path: impl AsRef<Path>) -> Self {
        let arg = path.as_ref().to_string_lossy().into_owned();
        self.arg(arg)
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sends stdout to a file, truncating it.
    #[must_use]
    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    /// The program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The argument vector.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Renders the command as one quoted shell line.
    #[must_use]
    pub fn render(&self) -> String {
        let mut words: Vec<Cow<'_, str>> = Vec::with_capacity(self.args.len() + 1);
        words.push(quote(&self.program));
        words.extend(self.args.iter().map(|a| quote(a)));
        let mut line = words.join(" ");
        if let Some(path) = &self.stdout {
            line.push_str(" > ");
            line.push_str(&quote_path(path));
        }
        line
    }
}

/// One step of a job's command body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptStep {
    /// Run a program.
    Run(ShellCommand),
    /// Print a message to the job log.
    Echo(String),
    /// Branch on a shell-level existence and size check of every path.
    ///
    /// `then` runs only if every path passes `[ -s ]`. With no paths the
    /// check can never pass and only `otherwise` is rendered.
    RequireArtifacts {
        /// Paths that must all exist and be non-empty.
        paths: Vec<PathBuf>,
        /// Steps when all paths pass.
        then: Vec<ScriptStep>,
        /// Steps when any path fails.
        otherwise: Vec<ScriptStep>,
    },
}

impl ScriptStep {
    fn render_into(&self, out: &mut Vec<String>, depth: usize) {
        let pad = INDENT.repeat(depth);
        match self {
            Self::Run(cmd) => out.push(format!("{pad}{}", cmd.render())),
            Self::Echo(msg) => out.push(format!("{pad}echo {}", quote(msg))),
            Self::RequireArtifacts {
                paths,
                then,
                otherwise,
            } => {
                if paths.is_empty() {
                    render_block(otherwise, out, depth);
                    return;
                }
                let test = paths
                    .iter()
                    .map(|p| format!("[ -s {} ]", quote_path(p)))
                    .collect::<Vec<_>>()
                    .join(" && ");
                out.push(format!("{pad}if {test}; then"));
                render_block(then, out, depth + 1);
                out.push(format!("{pad}else"));
                render_block(otherwise, out, depth + 1);
                out.push(format!("{pad}fi"));
            }
        }
    }
}

fn render_block(steps: &[ScriptStep], out: &mut Vec<String>, depth: usize) {
    if steps.is_empty() {
        out.push(format!("{}:", INDENT.repeat(depth)));
        return;
    }
    for step in steps {
        step.render_into(out, depth);
    }
}

/// The command body of a stage: an ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandScript {
    steps: Vec<ScriptStep>,
}

impl CommandScript {
    /// Creates an empty command script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a program invocation.
    #[must_use]
    pub fn run(mut self, command: ShellCommand) -> Self {
        self.steps.push(ScriptStep::Run(command));
        self
    }

    /// Appends an echo.
    #[must_use]
    pub fn echo(mut self, message: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Echo(message.into()));
        self
    }

    /// Appends an artifact-gated branch.
    #[must_use]
    pub fn require_artifacts(
        mut self,
        paths: impl IntoIterator<Item = impl Into<PathBuf>>,
        then: Vec<ScriptStep>,
        otherwise: Vec<ScriptStep>,
    ) -> Self {
        self.steps.push(ScriptStep::RequireArtifacts {
            paths: paths.into_iter().map(Into::into).collect(),
            then,
            otherwise,
        });
        self
    }

    /// Appends a step.
    pub fn push(&mut self, step: ScriptStep) {
        self.steps.push(step);
    }

    /// The steps in order.
    #[must_use]
    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }

    /// Returns true if there are no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Renders the body as shell text, one line per step.
    #[must_use]
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        render_block(&self.steps, &mut lines, 0);
        lines.join("\n")
    }
}
