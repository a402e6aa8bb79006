//! Execution of resolved routine trees.

use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;

use super::{ExecutionNode, Mode, RoutineError};
use crate::core::{CommandRunner, CommandSpec, ExecutionContext};

/// Runs [`ExecutionNode`] trees through a [`CommandRunner`].
#[derive(Clone)]
pub struct RoutineExecutor {
    runner: Arc<dyn CommandRunner>,
    shell: Option<String>,
}

impl RoutineExecutor {
    /// Create an executor on top of `runner`.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner, shell: None }
    }

    /// Shell used for leaf commands instead of the platform default.
    #[must_use]
    pub fn shell(mut self, shell: Option<String>) -> Self {
        self.shell = shell;
        self
    }

    /// Run `node` starting from `context`. The caller's context is not
    /// changed.
    pub async fn run(&self, node: &ExecutionNode, context: &ExecutionContext) -> Result<(), RoutineError> {
        let mut context = context.clone();
        self.execute(node, &mut context).await
    }

    /// Run `node` in `context`. A top-level `cd` leaf updates `context`.
    pub fn execute<'a>(
        &'a self,
        node: &'a ExecutionNode,
        context: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<(), RoutineError>> {
        async move {
            match node {
                ExecutionNode::Command(command) => self.run_command(command, context).await,
                ExecutionNode::Group { mode: Mode::Sequence, tasks } => {
                    let mut scoped = context.clone();
                    for task in tasks {
                        self.execute(task, &mut scoped).await?;
                    }
                    Ok(())
                }
                ExecutionNode::Group { mode: Mode::Parallel, tasks } => {
                    self.run_parallel(tasks, context).await
                }
                ExecutionNode::Project(project) => {
                    tracing::info!(
                        project = %project.project,
                        routine = %project.routine,
                        "Running project routine"
                    );
                    let mut forked = context.fork_in(&project.directory);
                    self.execute(&project.task, &mut forked).await
                }
            }
        }
        .boxed()
    }

    async fn run_parallel(
        &self,
        tasks: &[ExecutionNode],
        context: &ExecutionContext,
    ) -> Result<(), RoutineError> {
        let branches = tasks.iter().map(|task| {
            let mut forked = context.fork();
            async move { self.execute(task, &mut forked).await }
        });

        let total = tasks.len();
        let mut errors: Vec<RoutineError> =
            join_all(branches).await.into_iter().filter_map(Result::err).collect();

        match errors.len() {
            0 => Ok(()),
            1 if total == 1 => Err(errors.remove(0)),
            failed => {
                for error in &errors {
                    tracing::error!(error = %error, "Parallel task failed");
                }
                Err(RoutineError::Parallel { failed, total, first: Box::new(errors.remove(0)) })
            }
        }
    }

    async fn run_command(&self, command: &str, context: &mut ExecutionContext) -> Result<(), RoutineError> {
        if let Some(target) = cd_target(command) {
            let target = target.map_err(|arg| RoutineError::Directory {
                path: arg.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "cd needs exactly one directory"),
            })?;
            let directory_error = |source| RoutineError::Directory { path: target.dir.to_string(), source };
            let dir = if target.expand {
                context.expand(target.dir).map_err(directory_error)?
            } else {
                target.dir.to_string()
            };
            let cwd = context.change_dir(&dir).map_err(directory_error)?;
            tracing::debug!(cwd = %cwd.display(), "Changed directory");
            return Ok(());
        }

        let spec = CommandSpec::shell_with(self.shell.as_deref(), command)
            .cwd(context.cwd())
            .envs(context.env());

        tracing::debug!(command, cwd = %context.cwd().display(), "Running command");

        let result = self
            .runner
            .run(&spec)
            .await
            .map_err(|source| RoutineError::Spawn { command: command.to_string(), source })?;

        if result.success() {
            Ok(())
        } else {
            Err(RoutineError::CommandFailed { command: command.to_string(), code: result.code })
        }
    }
}

/// Directory argument of a `cd` leaf.
#[derive(Debug, PartialEq, Eq)]
struct CdTarget<'a> {
    dir: &'a str,

    /// `~` and variables still need expanding (not single-quoted)
    expand: bool,
}

/// Target of a `cd <dir>` leaf. The argument may be one unquoted word or
/// one fully quoted string. Compound commands such as `cd app; make` go to
/// the shell (`None`). Any other argument that does not name exactly one
/// path is returned as `Err`.
fn cd_target(command: &str) -> Option<Result<CdTarget<'_>, &str>> {
    let command = command.trim();
    if command == "cd" {
        return Some(Ok(CdTarget { dir: "~", expand: true }));
    }

    let target = command.strip_prefix("cd ")?.trim();
    let quoted = match target.chars().next()? {
        quote @ ('"' | '\'') => target[1..]
            .strip_suffix(quote)
            .filter(|inner| !inner.contains(quote))
            .map(|inner| (inner, quote == '"')),
        _ => None,
    };

    let parsed = match quoted {
        Some((inner, expand)) => Some(CdTarget { dir: inner, expand }),
        None if target.contains(|c| matches!(c, ';' | '|' | '&' | '<' | '>')) => return None,
        None if target.split_whitespace().count() == 1
            && !target.contains(|c| matches!(c, '"' | '\'' | '\\' | '(' | ')')) =>
        {
            Some(CdTarget { dir: target, expand: true })
        }
        None => None,
    };

    let resolvable = parsed.filter(|t| {
        !t.dir.is_empty() && !(t.expand && (t.dir.contains("$(") || t.dir.contains(['`', '\\'])))
    });
    Some(resolvable.ok_or(target))
}
