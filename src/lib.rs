//! # metarun
//!
//! Project runner driven by `meta.json`.
//!
//! A project declares its routines, tmux sessions and tool settings in a
//! `meta.json` file at its root. The `run` binary resolves routine requests
//! into an execution tree and runs it, lays out tmux sessions from declared
//! windows and panes, and wraps docker, compose and terraform with the
//! project's settings.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the "dev" routine of the nearest meta.json
//! run routine dev
//!
//! # Pick a routine interactively
//! run routine
//!
//! # Create and attach a tmux session
//! run tmux init dev && run tmux attach dev
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::redundant_else)]
#![allow(clippy::if_not_else)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unnecessary_lazy_evaluations)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::or_fun_call)]

pub mod core;
pub mod meta;
pub mod routine;
pub mod tmux;
pub mod tools;
pub mod tui;

/// Version of metarun.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Binary name, used for completions and settings paths.
pub const APP_NAME: &str = "run";
