//! Expansion of requested routine names into an execution tree.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{RoutineError, RoutineExpr};
use crate::meta::{Discovery, RoutineMap};

/// How the children of a group run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// All children concurrently, each in its own context
    Parallel,
    /// Children one after another in a shared context
    Sequence,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parallel => write!(f, "parallel"),
            Self::Sequence => write!(f, "sequence"),
        }
    }
}

/// A routine of a sub-project, produced by `every`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectTask {
    /// Project directory; the task runs there
    pub directory: PathBuf,

    /// Project name
    pub project: String,

    /// Routine name within the project
    pub routine: String,

    /// The routine resolved against the project's own routines
    pub task: Box<ExecutionNode>,
}

/// Resolved, ready-to-run routine tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExecutionNode {
    /// Shell command, or the `cd <path>` pseudo-command
    Command(String),

    /// Group of child nodes
    Group { mode: Mode, tasks: Vec<ExecutionNode> },

    /// Task rooted in another project
    Project(ProjectTask),
}

impl ExecutionNode {
    /// A leaf command.
    pub fn command(command: impl Into<String>) -> Self {
        Self::Command(command.into())
    }

    /// A parallel group.
    pub fn parallel(tasks: Vec<ExecutionNode>) -> Self {
        Self::Group { mode: Mode::Parallel, tasks }
    }

    /// A sequence group.
    pub fn sequence(tasks: Vec<ExecutionNode>) -> Self {
        Self::Group { mode: Mode::Sequence, tasks }
    }

    /// Leaf commands in tree order.
    pub fn commands(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_commands(&mut out);
        out
    }

    fn collect_commands<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Command(command) => out.push(command),
            Self::Group { tasks, .. } => tasks.iter().for_each(|t| t.collect_commands(out)),
            Self::Project(project) => project.task.collect_commands(out),
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match self {
            Self::Command(command) => writeln!(f, "{indent}{command}"),
            Self::Group { mode, tasks } => {
                writeln!(f, "{indent}{mode}")?;
                tasks.iter().try_for_each(|t| t.fmt_indented(f, depth + 1))
            }
            Self::Project(project) => {
                writeln!(
                    f,
                    "{indent}[{}] {} ({})",
                    project.project,
                    project.routine,
                    project.directory.display()
                )?;
                project.task.fmt_indented(f, depth + 1)
            }
        }
    }
}

impl fmt::Display for ExecutionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

/// Routines visible at one point of the expansion.
#[derive(Clone, Copy)]
struct Scope<'a> {
    routines: &'a RoutineMap,
    root: &'a Path,
}

/// Resolves routine names into [`ExecutionNode`] trees.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    discovery: Discovery,
    strict: bool,
}

impl Resolver {
    /// Create a resolver with default discovery settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat unknown routine names as errors instead of shell commands.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Walker used for `every`.
    #[must_use]
    pub fn discovery(mut self, discovery: Discovery) -> Self {
        self.discovery = discovery;
        self
    }

    /// Resolve `requested` against `routines`, with `root` as the project
    /// directory for `every`. The result is always a parallel group.
    pub fn resolve(
        &self,
        requested: &[String],
        routines: &RoutineMap,
        root: &Path,
    ) -> Result<ExecutionNode, RoutineError> {
        let scope = Scope { routines, root };
        let mut stack = Vec::new();

        let tasks = requested
            .iter()
            .map(|name| self.resolve_name(name, scope, &mut stack, self.strict))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ExecutionNode::parallel(tasks))
    }

    fn resolve_name(
        &self,
        name: &str,
        scope: Scope<'_>,
        stack: &mut Vec<(PathBuf, String)>,
        strict: bool,
    ) -> Result<ExecutionNode, RoutineError> {
        let Some(command) = scope.routines.get(name) else {
            if strict {
                return Err(RoutineError::NotFound(name.to_string()));
            }
            return Ok(ExecutionNode::command(name));
        };

        let key = (scope.root.to_path_buf(), name.to_string());
        if let Some(start) = stack.iter().position(|k| *k == key) {
            let mut chain: Vec<String> = stack[start..].iter().map(|(_, n)| n.clone()).collect();
            chain.push(name.to_string());
            return Err(RoutineError::Cyclic { chain });
        }

        tracing::debug!(routine = name, command = %command, "Expanding routine");
        stack.push(key);
        let node = self.resolve_expr(&RoutineExpr::parse(command), scope, stack);
        stack.pop();
        node
    }

    fn resolve_expr(
        &self,
        expr: &RoutineExpr,
        scope: Scope<'_>,
        stack: &mut Vec<(PathBuf, String)>,
    ) -> Result<ExecutionNode, RoutineError> {
        match expr {
            RoutineExpr::Literal(command) => Ok(ExecutionNode::command(command.as_str())),
            RoutineExpr::Parallel(names) => {
                Ok(ExecutionNode::parallel(self.resolve_all(names, scope, stack, self.strict)?))
            }
            RoutineExpr::Sequence(names) => {
                Ok(ExecutionNode::sequence(self.resolve_all(names, scope, stack, self.strict)?))
            }
            RoutineExpr::ShorthandAnd(parts) => {
                Ok(ExecutionNode::sequence(self.resolve_all(parts, scope, stack, false)?))
            }
            RoutineExpr::ShorthandAmp(parts) => {
                Ok(ExecutionNode::parallel(self.resolve_all(parts, scope, stack, false)?))
            }
            RoutineExpr::Every { include, exclude } => {
                self.resolve_every(include, exclude, scope, stack)
            }
        }
    }

    fn resolve_all(
        &self,
        names: &[String],
        scope: Scope<'_>,
        stack: &mut Vec<(PathBuf, String)>,
        strict: bool,
    ) -> Result<Vec<ExecutionNode>, RoutineError> {
        names.iter().map(|name| self.resolve_name(name, scope, stack, strict)).collect()
    }

    fn resolve_every(
        &self,
        include: &[String],
        exclude: &[String],
        scope: Scope<'_>,
        stack: &mut Vec<(PathBuf, String)>,
    ) -> Result<ExecutionNode, RoutineError> {
        let mut tasks = Vec::new();

        for project in self.discovery.projects(scope.root) {
            if exclude.iter().any(|name| name == project.name()) {
                tracing::debug!(project = project.name(), "Excluded from every");
                continue;
            }

            let routines = project.routines();
            let sub_scope = Scope { routines: &routines, root: project.dir() };

            for routine in include.iter().filter(|r| routines.contains_key(r.as_str())) {
                let task = self.resolve_name(routine, sub_scope, stack, false)?;
                tasks.push(ExecutionNode::Project(ProjectTask {
                    directory: project.dir().to_path_buf(),
                    project: project.name().to_string(),
                    routine: routine.clone(),
                    task: Box::new(task),
                }));
            }
        }

        if tasks.is_empty() {
            tracing::warn!(
                routines = %include.join(", "),
                root = %scope.root.display(),
                "No sub-project defines the requested routines"
            );
        }

        Ok(ExecutionNode::parallel(tasks))
    }
}

/// Resolve with default settings, rooted at the current directory.
pub fn resolve(requested: &[String], routines: &RoutineMap) -> Result<ExecutionNode, RoutineError> {
    let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    Resolver::new().resolve(requested, routines, &root)
}
