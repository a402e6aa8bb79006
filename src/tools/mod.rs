//! Wrappers around external tools configured in `meta.json`.
//!
//! Each wrapper is a pure function from a project section plus CLI options to
//! a list of [`CommandSpec`]s, run in order by [`run_sequence`].

pub mod docker;
pub mod terraform;

use anyhow::Context;

use crate::core::{CommandRunner, CommandSpec};

/// Run `specs` one after another, stopping at the first failure.
pub async fn run_sequence(runner: &dyn CommandRunner, specs: &[CommandSpec]) -> anyhow::Result<()> {
    for spec in specs {
        let shown = spec.display();
        tracing::info!(command = %shown, "Running");

        let result = runner.run(spec).await.with_context(|| format!("Failed to start `{shown}`"))?;
        if !result.success() {
            match result.code {
                Some(code) => anyhow::bail!("`{shown}` failed with exit code {code}"),
                None => anyhow::bail!("`{shown}` was terminated by a signal"),
            }
        }
    }
    Ok(())
}
