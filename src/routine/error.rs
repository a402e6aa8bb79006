//! Routine error types.

use thiserror::Error;

use crate::meta::ConfigError;

/// Errors raised while resolving or executing routines.
#[derive(Debug, Error)]
pub enum RoutineError {
    /// Name is not a routine (strict mode only)
    #[error("Routine '{0}' not found")]
    NotFound(String),

    /// A routine refers back to itself while being expanded
    #[error("Cyclic routine definition: {}", .chain.join(" -> "))]
    Cyclic { chain: Vec<String> },

    /// A command exited with a non-zero status
    #[error("Command `{command}` failed with {}", describe_code(.code))]
    CommandFailed { command: String, code: Option<i32> },

    /// A command could not be started
    #[error("Failed to start `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: anyhow::Error,
    },

    /// `cd` to a directory that does not exist
    #[error("Cannot change directory to '{path}'")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Some branches of a parallel group failed
    #[error("{failed} of {total} parallel tasks failed")]
    Parallel {
        failed: usize,
        total: usize,
        #[source]
        first: Box<RoutineError>,
    },

    /// Configuration of a discovered project could not be used
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn describe_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "no exit code (terminated by signal)".to_string(), |c| format!("exit code {c}"))
}

impl RoutineError {
    /// The innermost command failure, if any.
    pub fn failed_command(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { command, .. } | Self::Spawn { command, .. } => Some(command),
            Self::Parallel { first, .. } => first.failed_command(),
            _ => None,
        }
    }
}
