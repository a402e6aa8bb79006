//! tmux session management.
//!
//! Sessions are declared in the `tmux` section of `meta.json`
//! ([`spec`]), laid out by [`layout`] and created through the tmux CLI by
//! [`session::Tmux`].

pub mod layout;
pub mod session;
pub mod spec;

pub use layout::{plan_window, plan_window_with, LayoutError, PaneOrder, SshRoots, WindowLayout};
pub use session::{AttachOptions, InitOptions, PaneRef, PaneTarget, SessionPlan, Tmux};
pub use spec::{SessionSpec, TmuxConfig, WindowSpec};

use std::path::PathBuf;

use thiserror::Error;

use crate::meta::{ConfigError, ProjectConfig};

/// Errors raised by tmux commands.
#[derive(Debug, Error)]
pub enum TmuxError {
    #[error("Session '{0}' already exists (use --reset to recreate it)")]
    SessionExists(String),

    #[error("Session '{0}' is not running")]
    SessionNotFound(String),

    #[error("Session '{0}' is not defined in any meta.json")]
    SessionNotDefined(String),

    #[error("Session '{0}' has no windows that could be laid out")]
    NoWindows(String),

    #[error("Invalid pane target '{0}'")]
    InvalidTarget(String),

    #[error("Pane '{0}' not found in session")]
    TargetNotFound(String),

    #[error("`{command}` failed with exit code {}", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    CommandFailed { command: String, code: Option<i32> },

    #[error("Failed to run tmux")]
    Spawn(#[source] anyhow::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Sessions named `name` in `projects`, each paired with its project
/// directory, in project order.
pub fn collect_sessions(
    projects: &[ProjectConfig],
    name: &str,
) -> Result<Vec<(PathBuf, SessionSpec)>, TmuxError> {
    let mut found = Vec::new();
    for project in projects {
        let Some(config) = project.section::<TmuxConfig>("tmux")? else {
            continue;
        };
        found.extend(
            config
                .sessions
                .into_iter()
                .filter(|s| s.name == name)
                .map(|s| (project.dir().to_path_buf(), s)),
        );
    }

    if found.is_empty() {
        return Err(TmuxError::SessionNotDefined(name.to_string()));
    }

    tracing::debug!(session = name, sources = found.len(), "Collected session definitions");
    Ok(found)
}
