//! run - project runner driven by meta.json.
//!
//! Routines, tmux sessions and tool wrappers for the project in the current
//! directory.

#![allow(clippy::single_match_else)]

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use metarun::core::{CommandRunner, DryRunRunner, ExecutionContext, Settings, ShellRunner};
use metarun::meta::{duplicate_ids, ConfigError, Discovery, ProjectConfig, PropertyFilter};
use metarun::routine::{self, Resolver, RoutineError, RoutineExecutor};
use metarun::tmux::{self, AttachOptions, InitOptions, PaneTarget, SessionPlan, SshRoots, Tmux, TmuxError};
use metarun::tools::{
    self,
    docker::{self, BuildOptions, ComposeAction, ComposeSection, DockerSection},
    terraform::{self, TerraformAction, TerraformSection},
};
use metarun::{tui, APP_NAME};

/// Project runner driven by meta.json
#[derive(Parser)]
#[command(name = "run")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Dry run mode - show what would be executed without running
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run routines from meta.json (opens a picker when none is given)
    Routine {
        /// Routine names or commands
        scripts: Vec<String>,

        /// Fail on names that are not defined routines
        #[arg(long)]
        strict: bool,

        /// List routines and exit
        #[arg(short, long)]
        list: bool,
    },

    /// Manage tmux sessions
    Tmux {
        #[command(subcommand)]
        operation: TmuxOperation,
    },

    /// Inspect and edit meta.json files
    Meta {
        #[command(subcommand)]
        operation: MetaOperation,
    },

    /// Build images and drive docker compose
    Docker {
        #[command(subcommand)]
        operation: DockerOperation,
    },

    /// Run terraform with the project's settings
    Terraform {
        #[command(subcommand)]
        operation: TerraformOperation,
    },

    /// Show settings
    Config {
        /// Show settings directory path
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// tmux operations.
#[derive(Subcommand)]
enum TmuxOperation {
    /// Create a session from its meta.json definition
    Init {
        /// Session name
        session: String,

        /// Merge definitions from every project under $SRC (or the current directory)
        #[arg(short, long)]
        all: bool,

        /// Kill the session first if it already exists
        #[arg(long)]
        reset: bool,

        /// Colour the status bar
        #[arg(long)]
        color: bool,

        /// Send each pane's command after creating it
        #[arg(short, long)]
        command: bool,
    },

    /// Attach to a running session
    Attach {
        /// Session name
        session: String,

        /// Send every pane's command before attaching
        #[arg(long)]
        run_all: bool,

        /// Send the command of a pane (`pane`, `window/pane` or `pane[2]`)
        #[arg(long = "run", value_name = "PANE")]
        run: Vec<String>,
    },

    /// Kill a session
    Terminate {
        /// Session name
        session: String,
    },

    /// List sessions, or the panes of one session
    List {
        /// Session name
        session: Option<String>,
    },
}

/// meta.json operations.
#[derive(Subcommand)]
enum MetaOperation {
    /// List projects under the current directory
    List {
        /// Only projects that have this property (dot path)
        #[arg(short, long)]
        property: Option<String>,

        /// ...with this value
        #[arg(long, requires = "property")]
        value: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Report projects that share an id
    CheckIds,

    /// Print a property of the nearest meta.json
    Get {
        /// Dot path, e.g. `docker.image`
        path: String,
    },

    /// Set a property of the nearest meta.json
    Set {
        /// Dot path, e.g. `docker.image`
        path: String,

        /// JSON value, or a plain string
        value: String,
    },
}

/// docker operations.
#[derive(Subcommand)]
enum DockerOperation {
    /// Build the project image
    Build {
        /// Image tag (default: latest)
        #[arg(short, long)]
        tag: Option<String>,

        /// Push the image after building
        #[arg(long)]
        push: bool,
    },

    /// Run docker compose for the project
    Compose {
        #[command(subcommand)]
        operation: ComposeOperation,
    },
}

/// docker compose operations.
#[derive(Subcommand)]
enum ComposeOperation {
    /// Start services
    Up {
        /// Run in the background
        #[arg(short, long)]
        detach: bool,

        /// Limit to these services
        #[arg(short, long = "service", value_name = "SERVICE")]
        services: Vec<String>,
    },

    /// Stop and remove services
    Down,

    /// Show service logs
    Logs {
        /// Follow log output
        #[arg(short, long)]
        follow: bool,

        /// Limit to these services
        #[arg(short, long = "service", value_name = "SERVICE")]
        services: Vec<String>,
    },

    /// List services
    Ps,
}

/// terraform operations.
#[derive(Subcommand)]
enum TerraformOperation {
    /// Initialise the working directory
    Init,

    /// Show the execution plan
    Plan,

    /// Apply changes
    Apply {
        /// Skip interactive approval
        #[arg(long)]
        auto_approve: bool,
    },

    /// Destroy managed infrastructure
    Destroy {
        /// Skip interactive approval
        #[arg(long)]
        auto_approve: bool,
    },

    /// Show outputs
    Output,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (settings, settings_error) = match Settings::load() {
        Ok(settings) => (settings, None),
        Err(e) => (Settings::default(), Some(e)),
    };

    // Setup logging
    let filter = EnvFilter::try_from_env("RUN_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_new(&settings.general.log_level).unwrap_or_else(|_| EnvFilter::new("warn"))
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    if let Some(e) = settings_error {
        tracing::warn!(error = %format!("{e:#}"), "Ignoring settings");
    }

    match cli.command {
        Commands::Routine { scripts, strict, list } => {
            cmd_routine(scripts, strict, list, &settings, cli.dry_run)?;
        }
        Commands::Tmux { operation } => {
            cmd_tmux(operation, &settings, cli.dry_run)?;
        }
        Commands::Meta { operation } => {
            cmd_meta(operation, &settings, cli.dry_run)?;
        }
        Commands::Docker { operation } => {
            cmd_docker(operation, cli.dry_run)?;
        }
        Commands::Terraform { operation } => {
            cmd_terraform(operation, cli.dry_run)?;
        }
        Commands::Config { path } => {
            cmd_config(path)?;
        }
        Commands::Completions { shell } => {
            cmd_completions(shell);
        }
    }

    Ok(())
}

/// Runner for external commands: real, or echoing in dry-run mode.
fn runner(dry_run: bool) -> Arc<dyn CommandRunner> {
    if dry_run {
        Arc::new(DryRunRunner::new().echo(true))
    } else {
        Arc::new(ShellRunner::new())
    }
}

/// Resolve and run routines.
fn cmd_routine(scripts: Vec<String>, strict: bool, list: bool, settings: &Settings, dry_run: bool) -> Result<()> {
    let cwd = std::env::current_dir()?;

    let project = match routine::load_project(&cwd) {
        Ok(project) => project,
        Err(RoutineError::Config(ConfigError::NotFound(_))) => {
            tracing::warn!(dir = %cwd.display(), "No meta.json found");
            println!("No routines found.");
            return Ok(());
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load meta.json");
            std::process::exit(1);
        }
    };
    let routines = project.routines();

    if list {
        if routines.is_empty() {
            println!("No routines found.");
        }
        for (name, command) in &routines {
            println!("{name:<20} {command}");
        }
        return Ok(());
    }

    if routines.is_empty() && scripts.is_empty() {
        tracing::warn!(path = %project.meta_path().display(), "No routines defined");
        println!("No routines found.");
        return Ok(());
    }

    let requested = if scripts.is_empty() {
        if !io::stdout().is_terminal() {
            anyhow::bail!("No routine given. Available: {}", routines.keys().cloned().collect::<Vec<_>>().join(", "));
        }
        match tui::pick_routine(&routines)? {
            Some(name) => vec![name],
            None => return Ok(()),
        }
    } else {
        scripts
    };

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        let resolver = Resolver::new().strict(strict).discovery(Discovery::from_settings(&settings.discovery));
        let tree = resolver.resolve(&requested, &routines, project.dir())?;
        tracing::debug!(tree = %tree, "Resolved routines");

        if dry_run {
            print!("{tree}");
        }

        let executor = RoutineExecutor::new(runner(dry_run)).shell(settings.general.shell.clone());
        executor.run(&tree, &ExecutionContext::new(project.dir())).await
    });

    match outcome {
        Ok(()) => {
            println!("All tasks executed successfully.");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Routine failed");
            if let Some(command) = e.failed_command() {
                tracing::debug!(command, "Failing command");
            }
            std::process::exit(1);
        }
    }
}

/// Session definitions for `session`: from the nearest project, or with
/// `all` from every project under `$SRC` (or the current directory).
fn session_specs(
    session: &str,
    all: bool,
    settings: &Settings,
) -> Result<Vec<(PathBuf, tmux::SessionSpec)>, TmuxError> {
    let cwd = std::env::current_dir().map_err(|e| TmuxError::Spawn(e.into()))?;

    let projects = if all {
        let root = std::env::var_os("SRC").map_or(cwd, PathBuf::from);
        Discovery::from_settings(&settings.discovery).projects_with_root(&root)
    } else {
        vec![ProjectConfig::find(&cwd)?]
    };

    tmux::collect_sessions(&projects, session)
}

/// Handle tmux commands.
fn cmd_tmux(operation: TmuxOperation, settings: &Settings, dry_run: bool) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;

    match operation {
        TmuxOperation::Init { session, all, reset, color, command } => {
            let runner: Arc<dyn CommandRunner> = if dry_run {
                // Plan as if the session did not exist yet.
                Arc::new(DryRunRunner::new().echo(true).fail_when("has-session"))
            } else {
                Arc::new(ShellRunner::new())
            };
            let tmux = Tmux::new(runner, settings.tmux.clone());

            let specs = session_specs(&session, all, settings)?;
            let plan = SessionPlan::build(&session, &specs, &SshRoots::from_env());
            rt.block_on(tmux.init(&plan, InitOptions { reset, color, run_commands: command }))?;

            if !dry_run {
                println!("Session '{session}' created with {} windows.", plan.windows.len());
            }
        }
        TmuxOperation::Attach { session, run_all, run } => {
            let tmux = Tmux::new(runner(dry_run), settings.tmux.clone());
            let targets = run.iter().map(|t| t.parse::<PaneTarget>()).collect::<Result<Vec<_>, _>>()?;

            let plan = if run_all || !targets.is_empty() {
                let specs = match session_specs(&session, false, settings) {
                    Err(TmuxError::SessionNotDefined(_) | TmuxError::Config(ConfigError::NotFound(_))) => {
                        session_specs(&session, true, settings)?
                    }
                    other => other?,
                };
                Some(SessionPlan::build(&session, &specs, &SshRoots::from_env()))
            } else {
                None
            };

            let options = AttachOptions { run_all, targets, inside_tmux: std::env::var_os("TMUX").is_some() };
            rt.block_on(tmux.attach(&session, plan.as_ref(), &options))?;
        }
        TmuxOperation::Terminate { session } => {
            let tmux = Tmux::new(runner(dry_run), settings.tmux.clone());
            rt.block_on(tmux.terminate(&session))?;
        }
        TmuxOperation::List { session } => {
            let tmux = Tmux::new(runner(dry_run), settings.tmux.clone());
            rt.block_on(tmux.list(session.as_deref()))?;
        }
    }

    Ok(())
}

/// Handle meta.json commands.
fn cmd_meta(operation: MetaOperation, settings: &Settings, dry_run: bool) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let discovery = Discovery::from_settings(&settings.discovery);

    let all_projects = || discovery.projects_with_root(&cwd);

    match operation {
        MetaOperation::List { property, value, format } => {
            let mut projects = all_projects();
            if let Some(property) = property {
                let filter = PropertyFilter::new(property, value);
                projects.retain(|p| filter.matches(p));
            }

            match format.as_str() {
                "json" => {
                    let entries: Vec<serde_json::Value> = projects
                        .iter()
                        .map(|p| {
                            serde_json::json!({
                                "name": p.name(),
                                "id": p.id(),
                                "type": p.project_type().map(|t| t.as_str()),
                                "path": p.dir(),
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                }
                _ => {
                    for p in &projects {
                        println!(
                            "{:<24} {:<20} {:<8} {}",
                            p.name(),
                            p.id().unwrap_or("-"),
                            p.project_type().map_or("-", |t| t.as_str()),
                            p.dir().display()
                        );
                    }
                    println!("\nTotal: {} projects", projects.len());
                }
            }
        }
        MetaOperation::CheckIds => {
            let duplicates = duplicate_ids(&all_projects());
            if duplicates.is_empty() {
                println!("All project ids are unique.");
                return Ok(());
            }

            for (id, dirs) in &duplicates {
                println!("Duplicate id '{id}':");
                for dir in dirs {
                    println!("  {}", dir.display());
                }
            }
            std::process::exit(1);
        }
        MetaOperation::Get { path } => {
            let project = ProjectConfig::find(&cwd)?;
            let value = project
                .get(&path)
                .with_context(|| format!("Property '{path}' not found in {}", project.meta_path().display()))?;

            match value {
                serde_json::Value::String(s) => println!("{s}"),
                other => println!("{}", serde_json::to_string_pretty(other)?),
            }
        }
        MetaOperation::Set { path, value } => {
            let mut project = ProjectConfig::find(&cwd)?;
            let parsed = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
            project.set(&path, parsed)?;

            if dry_run {
                println!("[DRY RUN] Would write {}:", project.meta_path().display());
                println!("{}", serde_json::to_string_pretty(project.raw())?);
            } else {
                project.save()?;
                println!("Set {path} in {}", project.meta_path().display());
            }
        }
    }

    Ok(())
}

/// Handle docker commands.
fn cmd_docker(operation: DockerOperation, dry_run: bool) -> Result<()> {
    let project = ProjectConfig::find(&std::env::current_dir()?)?;

    let commands = match operation {
        DockerOperation::Build { tag, push } => {
            let section: DockerSection = project.section("docker")?.unwrap_or_default();
            docker::build_commands(&project, &section, &BuildOptions { tag, push })
        }
        DockerOperation::Compose { operation } => {
            let section: ComposeSection = project.section("compose")?.unwrap_or_default();
            let (action, services) = match operation {
                ComposeOperation::Up { detach, services } => (ComposeAction::Up { detach }, services),
                ComposeOperation::Down => (ComposeAction::Down, Vec::new()),
                ComposeOperation::Logs { follow, services } => (ComposeAction::Logs { follow }, services),
                ComposeOperation::Ps => (ComposeAction::Ps, Vec::new()),
            };
            vec![docker::compose_command(&project, &section, &action, &services)]
        }
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(tools::run_sequence(runner(dry_run).as_ref(), &commands))
}

/// Handle terraform commands.
fn cmd_terraform(operation: TerraformOperation, dry_run: bool) -> Result<()> {
    let project = ProjectConfig::find(&std::env::current_dir()?)?;
    let section: TerraformSection = project.section("terraform")?.unwrap_or_default();

    let (action, auto_approve) = match operation {
        TerraformOperation::Init => (TerraformAction::Init, false),
        TerraformOperation::Plan => (TerraformAction::Plan, false),
        TerraformOperation::Apply { auto_approve } => (TerraformAction::Apply, auto_approve),
        TerraformOperation::Destroy { auto_approve } => (TerraformAction::Destroy, auto_approve),
        TerraformOperation::Output => (TerraformAction::Output, false),
    };

    let env = std::env::var("ENV").ok();
    let commands = terraform::terraform_commands(&project, &section, action, auto_approve, env.as_deref());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(tools::run_sequence(runner(dry_run).as_ref(), &commands))
}

/// Show settings.
fn cmd_config(show_path: bool) -> Result<()> {
    if show_path {
        if let Some(path) = Settings::config_dir() {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let settings = Settings::load()?;
    let toml = toml::to_string_pretty(&settings)?;
    println!("{toml}");

    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
}
