//! Core types shared by every command group.
//!
//! This module contains the subprocess primitive, the execution context
//! threaded through routines, and the global tool settings.

mod config;
mod context;
mod executor;

pub use config::{DiscoverySettings, GeneralSettings, Settings, TmuxSettings, LOCAL_SETTINGS_FILE};
pub use context::{resolve_path, ExecutionContext};
pub use executor::{
    get_shell, CommandRunner, CommandSpec, DryRunRunner, ExecutionResult, ShellRunner, StdioMode,
};
