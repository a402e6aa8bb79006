//! Command execution module.
//!
//! Every external tool (sh, tmux, docker, terraform, ssh) is started through
//! a [`CommandRunner`]. [`ShellRunner`] spawns real processes on the tokio
//! runtime; [`DryRunRunner`] only records and prints what would be run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;

/// How a child process is wired to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdioMode {
    /// Pass stdin/stdout/stderr through so output streams live
    #[default]
    Inherit,
    /// Capture stdout and stderr
    Capture,
}

/// A fully described process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute
    pub program: String,

    /// Arguments passed to the program
    pub args: Vec<String>,

    /// Working directory (inherits the current one when unset)
    pub cwd: Option<PathBuf>,

    /// Extra environment variables layered over the inherited environment
    pub env: BTreeMap<String, String>,

    /// Stdio handling
    pub stdio: StdioMode,
}

impl CommandSpec {
    /// Create a spec for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            stdio: StdioMode::Inherit,
        }
    }

    /// Run `command` through the platform shell.
    pub fn shell(command: &str) -> Self {
        let (shell, shell_arg) = get_shell();
        Self::new(shell).arg(shell_arg).arg(command)
    }

    /// Run `command` through a specific shell (`<shell> -c <command>`).
    pub fn shell_with(shell: Option<&str>, command: &str) -> Self {
        match shell {
            Some(shell) => Self::new(shell).arg("-c").arg(command),
            None => Self::shell(command),
        }
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add environment variables.
    #[must_use]
    pub fn envs<'a>(mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        self.env.extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Capture output instead of inheriting the terminal.
    #[must_use]
    pub fn capture(mut self) -> Self {
        self.stdio = StdioMode::Capture;
        self
    }

    /// Human readable form, e.g. `tmux split-window -h -t "dev:api.0"`.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote_arg)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        return arg.to_string();
    }
    format!("\"{}\"", arg.replace('"', "\\\""))
}

/// Result of executing a command.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Exit code (`None` when terminated by a signal)
    pub code: Option<i32>,

    /// Standard output (empty unless captured)
    pub stdout: String,

    /// Standard error (empty unless captured)
    pub stderr: String,

    /// Time taken to execute
    pub duration: Duration,
}

impl ExecutionResult {
    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Something that can run a [`CommandSpec`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion.
    ///
    /// A non-zero exit is reported through [`ExecutionResult::code`]; `Err` is
    /// reserved for failures to start the process at all.
    async fn run(&self, spec: &CommandSpec) -> anyhow::Result<ExecutionResult>;
}

/// Spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl ShellRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, spec: &CommandSpec) -> anyhow::Result<ExecutionResult> {
        let start = Instant::now();

        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args);

        if let Some(ref dir) = spec.cwd {
            cmd.current_dir(dir);
        }
        cmd.envs(&spec.env);

        tracing::debug!(command = %spec.display(), "Spawning process");

        match spec.stdio {
            StdioMode::Inherit => {
                cmd.stdin(Stdio::inherit());
                cmd.stdout(Stdio::inherit());
                cmd.stderr(Stdio::inherit());

                let status = cmd
                    .status()
                    .await
                    .with_context(|| format!("failed to start `{}`", spec.program))?;

                Ok(ExecutionResult {
                    code: status.code(),
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: start.elapsed(),
                })
            }
            StdioMode::Capture => {
                cmd.stdin(Stdio::null());
                cmd.stdout(Stdio::piped());
                cmd.stderr(Stdio::piped());

                let output = cmd
                    .output()
                    .await
                    .with_context(|| format!("failed to start `{}`", spec.program))?;

                Ok(ExecutionResult {
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    duration: start.elapsed(),
                })
            }
        }
    }
}

/// Records invocations instead of running them.
///
/// Backs the global `--dry-run` flag. Commands whose display form contains a
/// `fail_when` pattern report exit code 1, and `respond_with` supplies canned
/// stdout for matching commands.
#[derive(Debug, Default)]
pub struct DryRunRunner {
    invocations: Mutex<Vec<CommandSpec>>,
    failing: Vec<String>,
    responses: Vec<(String, String)>,
    echo: bool,
}

impl DryRunRunner {
    /// Create a silent recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Print each invocation to stdout as it is recorded.
    #[must_use]
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Report failure for commands containing `pattern`.
    #[must_use]
    pub fn fail_when(mut self, pattern: impl Into<String>) -> Self {
        self.failing.push(pattern.into());
        self
    }

    /// Return `stdout` for commands containing `pattern`.
    #[must_use]
    pub fn respond_with(mut self, pattern: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.responses.push((pattern.into(), stdout.into()));
        self
    }

    /// All recorded invocations, in the order they were run.
    pub fn invocations(&self) -> Vec<CommandSpec> {
        self.invocations.lock().clone()
    }

    /// Display strings of all recorded invocations.
    pub fn commands(&self) -> Vec<String> {
        self.invocations.lock().iter().map(CommandSpec::display).collect()
    }
}

#[async_trait]
impl CommandRunner for DryRunRunner {
    async fn run(&self, spec: &CommandSpec) -> anyhow::Result<ExecutionResult> {
        let display = spec.display();
        if self.echo {
            match spec.cwd {
                Some(ref dir) => println!("[DRY RUN] ({}) {display}", dir.display()),
                None => println!("[DRY RUN] {display}"),
            }
        }

        self.invocations.lock().push(spec.clone());

        let failed = self.failing.iter().any(|p| display.contains(p.as_str()));
        let stdout = self
            .responses
            .iter()
            .find(|(p, _)| display.contains(p.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();

        Ok(ExecutionResult {
            code: Some(i32::from(failed)),
            stdout,
            stderr: String::new(),
            duration: Duration::ZERO,
        })
    }
}

/// Get the shell and argument for the current platform.
pub fn get_shell() -> (&'static str, &'static str) {
    if cfg!(target_os = "windows") {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    }
}
