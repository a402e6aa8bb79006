//! Routine engine.
//!
//! Routines are named commands in the `routines` section of `meta.json`.
//! A request is parsed ([`RoutineExpr`]), expanded into an
//! [`ExecutionNode`] tree ([`Resolver`]) and run ([`RoutineExecutor`]).
//!
//! ```json
//! {
//!   "routines": {
//!     "dev": "api & web",
//!     "api": "cd api && cargo run",
//!     "web": "cd web && npm run dev",
//!     "ci": "sequence lint test",
//!     "lint": "cargo clippy",
//!     "test": "cargo test",
//!     "build-all": "every build !legacy"
//!   }
//! }
//! ```

mod error;
mod executor;
mod expr;
mod resolver;

pub use error::RoutineError;
pub use executor::RoutineExecutor;
pub use expr::RoutineExpr;
pub use resolver::{resolve, ExecutionNode, Mode, ProjectTask, Resolver};

use std::path::Path;

use crate::meta::ProjectConfig;

/// Load the project whose routines apply to `dir` (the nearest `meta.json`
/// at or above it).
pub fn load_project(dir: &Path) -> Result<ProjectConfig, RoutineError> {
    Ok(ProjectConfig::find(dir)?)
}
