//! Session lifecycle: create, attach, terminate and list tmux sessions.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use super::layout::{plan_window_with, SshRoots, WindowLayout};
use super::spec::SessionSpec;
use super::TmuxError;
use crate::core::{resolve_path, CommandRunner, CommandSpec, ExecutionResult, TmuxSettings};

/// All windows of a session, planned and ready to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlan {
    pub name: String,

    /// Colour from the first session spec that sets one
    pub color: Option<String>,

    pub windows: Vec<WindowLayout>,
}

impl SessionPlan {
    /// Plan every window of `specs`, each relative to its own project
    /// directory. Windows that cannot be laid out are logged and skipped.
    pub fn build(name: &str, specs: &[(PathBuf, SessionSpec)], ssh: &SshRoots) -> Self {
        let mut windows = Vec::new();
        let mut color = None;

        for (project_dir, spec) in specs {
            let base = resolve_path(project_dir, spec.path.as_deref());
            color = color.or_else(|| spec.color.clone());

            for window in &spec.windows {
                match plan_window_with(window, &base, ssh) {
                    Ok(layout) => windows.push(layout),
                    Err(e) => {
                        tracing::error!(session = name, window = %window.name, error = %e, "Skipping window");
                    }
                }
            }
        }

        Self { name: name.to_string(), color, windows }
    }
}

/// Options for [`Tmux::init`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Kill an existing session of the same name first
    pub reset: bool,

    /// Colour the status bar
    pub color: bool,

    /// Type each pane's command into it
    pub run_commands: bool,
}

/// A pane named on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaneRef {
    /// `editor`
    Name(String),
    /// `pane[2]`, final pane index
    Index(usize),
}

/// `--run` target: `<pane>`, `pane[<n>]`, `<window>/<pane>` or
/// `<window>/pane[<n>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneTarget {
    pub window: Option<String>,
    pub pane: PaneRef,
}

impl FromStr for PaneTarget {
    type Err = TmuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TmuxError::InvalidTarget(s.to_string());
        let (window, pane) = match s.split_once('/') {
            Some((window, pane)) => (Some(window.trim()), pane.trim()),
            None => (None, s.trim()),
        };

        if pane.is_empty() || window.is_some_and(str::is_empty) {
            return Err(invalid());
        }

        let pane = match pane.strip_prefix("pane[").and_then(|rest| rest.strip_suffix(']')) {
            Some(index) => PaneRef::Index(index.trim().parse().map_err(|_| invalid())?),
            None => PaneRef::Name(pane.to_string()),
        };

        Ok(Self { window: window.map(str::to_string), pane })
    }
}

/// Options for [`Tmux::attach`].
#[derive(Debug, Clone, Default)]
pub struct AttachOptions {
    /// Send every pane's command before attaching
    pub run_all: bool,

    /// Send the commands of these panes before attaching
    pub targets: Vec<PaneTarget>,

    /// Already inside tmux: switch the client instead of attaching
    pub inside_tmux: bool,
}

/// tmux driven through a [`CommandRunner`].
pub struct Tmux {
    runner: Arc<dyn CommandRunner>,
    settings: TmuxSettings,
}

impl Tmux {
    /// Create a session manager.
    pub fn new(runner: Arc<dyn CommandRunner>, settings: TmuxSettings) -> Self {
        Self { runner, settings }
    }

    /// Check whether a session exists.
    pub async fn has_session(&self, name: &str) -> Result<bool, TmuxError> {
        let spec = CommandSpec::new("tmux").args(["has-session", "-t", name]).capture();
        let result = self.runner.run(&spec).await.map_err(TmuxError::Spawn)?;
        Ok(result.success())
    }

    /// Create the session described by `plan`.
    pub async fn init(&self, plan: &SessionPlan, options: InitOptions) -> Result<(), TmuxError> {
        let session = plan.name.as_str();
        let Some((first, rest)) = plan.windows.split_first() else {
            return Err(TmuxError::NoWindows(session.to_string()));
        };

        if self.has_session(session).await? {
            if !options.reset {
                return Err(TmuxError::SessionExists(session.to_string()));
            }
            tracing::info!(session, "Resetting existing session");
            self.tmux(&["kill-session", "-t", session]).await?;
        }

        let first_path = first.path.to_string_lossy();
        self.tmux(&["new-session", "-d", "-s", session, "-n", first.name.as_str(), "-c", &*first_path]).await?;

        let target = format!("{session}:");
        for window in rest {
            let path = window.path.to_string_lossy();
            self.tmux(&["new-window", "-t", target.as_str(), "-n", window.name.as_str(), "-c", &*path]).await?;
        }

        // Windows of a fresh session are numbered from base-index in
        // creation order, so merged plans may repeat window names.
        let bases = self.base_indices().await;
        for (position, window) in plan.windows.iter().enumerate() {
            self.build_window(session, window, bases.window(position), bases.pane, options.run_commands).await?;
        }

        if options.color {
            let color = self.color_for(plan);
            let style = format!("bg={color}");
            self.tmux(&["set-option", "-t", session, "status-style", style.as_str()]).await?;
        }

        tracing::info!(session, windows = plan.windows.len(), "Session created");
        Ok(())
    }

    async fn build_window(
        &self,
        session: &str,
        window: &WindowLayout,
        window_index: usize,
        base: usize,
        run_commands: bool,
    ) -> Result<(), TmuxError> {
        for split in &window.splits {
            let target = pane_address(session, window_index, split.target + base);
            let path = split.path.to_string_lossy();
            let mut args = vec!["split-window", "-t", target.as_str(), split.direction.flag()];
            if let Some(size) = &split.size {
                args.extend(["-l", size.as_str()]);
            }
            args.extend(["-c", &*path]);
            self.tmux(&args).await?;
        }

        if let Some(layout) = &window.select_layout {
            let target = format!("{session}:{window_index}");
            self.tmux(&["select-layout", "-t", target.as_str(), layout.as_str()]).await?;
        }

        for pane in &window.panes {
            let target = pane_address(session, window_index, pane.index + base);
            if let Err(e) = self.tmux(&["select-pane", "-t", target.as_str(), "-T", pane.name.as_str()]).await {
                tracing::warn!(pane = %target, error = %e, "Could not set pane title");
            }

            if run_commands {
                if let Some(command) = &pane.command {
                    self.send_keys(&target, command).await;
                }
            }
        }

        Ok(())
    }

    /// Send pane commands, then attach to (or switch to) the session.
    pub async fn attach(
        &self,
        session: &str,
        plan: Option<&SessionPlan>,
        options: &AttachOptions,
    ) -> Result<(), TmuxError> {
        if !self.has_session(session).await? {
            return Err(TmuxError::SessionNotFound(session.to_string()));
        }

        if options.run_all || !options.targets.is_empty() {
            let plan = plan.ok_or_else(|| TmuxError::SessionNotDefined(session.to_string()))?;
            let bases = self.base_indices().await;

            let mut commands = Vec::new();
            if options.run_all {
                for (position, window) in plan.windows.iter().enumerate() {
                    for pane in &window.panes {
                        commands.push((position, pane));
                    }
                }
            }
            for target in &options.targets {
                commands.push(find_target(plan, target)?);
            }

            for (position, pane) in commands {
                if let Some(command) = &pane.command {
                    let address = pane_address(session, bases.window(position), pane.index + bases.pane);
                    self.send_keys(&address, command).await;
                }
            }
        }

        if options.inside_tmux {
            self.tmux(&["switch-client", "-t", session]).await
        } else {
            self.tmux(&["attach-session", "-t", session]).await
        }
    }

    /// Kill a session.
    pub async fn terminate(&self, session: &str) -> Result<(), TmuxError> {
        if !self.has_session(session).await? {
            return Err(TmuxError::SessionNotFound(session.to_string()));
        }
        self.tmux(&["kill-session", "-t", session]).await?;
        tracing::info!(session, "Session terminated");
        Ok(())
    }

    /// List sessions, or the panes of one session.
    pub async fn list(&self, session: Option<&str>) -> Result<(), TmuxError> {
        match session {
            Some(session) => {
                self.tmux(&[
                    "list-panes",
                    "-s",
                    "-t",
                    session,
                    "-F",
                    "#{window_name}.#{pane_index} #{pane_title} (#{pane_current_command})",
                ])
                .await
            }
            None => {
                self.tmux(&["list-sessions", "-F", "#{session_name}: #{session_windows} windows"])
                    .await
            }
        }
    }

    /// Status bar colour: the session's, the configured default, or a
    /// palette entry picked from the session name.
    pub fn color_for(&self, plan: &SessionPlan) -> String {
        plan.color
            .clone()
            .or_else(|| self.settings.default_color.clone())
            .or_else(|| {
                let palette = &self.settings.palette;
                (!palette.is_empty()).then(|| palette[name_hash(&plan.name) % palette.len()].clone())
            })
            .unwrap_or_else(|| "default".to_string())
    }

    async fn base_indices(&self) -> BaseIndices {
        BaseIndices { window: self.show_index("base-index").await, pane: self.show_index("pane-base-index").await }
    }

    async fn show_index(&self, option: &str) -> usize {
        let spec = CommandSpec::new("tmux").args(["show-options", "-gv", option]).capture();
        match self.runner.run(&spec).await {
            Ok(result) if result.success() => result.stdout.trim().parse().unwrap_or(0),
            Ok(_) => 0,
            Err(e) => {
                tracing::debug!(option, error = %e, "Could not read tmux option");
                0
            }
        }
    }

    /// Type `command` into a pane. Failures are logged and the pane is
    /// skipped.
    async fn send_keys(&self, target: &str, command: &str) {
        if let Err(e) = self.tmux(&["send-keys", "-t", target, command, "Enter"]).await {
            tracing::warn!(pane = target, error = %e, "Could not send command to pane");
        }
    }

    async fn tmux(&self, args: &[&str]) -> Result<(), TmuxError> {
        let spec = CommandSpec::new("tmux").args(args.iter().copied());
        let result: ExecutionResult = self.runner.run(&spec).await.map_err(TmuxError::Spawn)?;
        if result.success() {
            Ok(())
        } else {
            Err(TmuxError::CommandFailed { command: spec.display(), code: result.code })
        }
    }
}

/// `base-index` and `pane-base-index` of the tmux server.
#[derive(Debug, Clone, Copy)]
struct BaseIndices {
    window: usize,
    pane: usize,
}

impl BaseIndices {
    fn window(self, position: usize) -> usize {
        self.window + position
    }
}

fn pane_address(session: &str, window: usize, pane: usize) -> String {
    format!("{session}:{window}.{pane}")
}

fn name_hash(name: &str) -> usize {
    name.bytes().fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(usize::from(b)))
}

/// The pane `target` names, with the position of its window in the plan.
/// A window name matches every window of that name, first match wins.
fn find_target<'p>(
    plan: &'p SessionPlan,
    target: &PaneTarget,
) -> Result<(usize, &'p super::layout::PlacedPane), TmuxError> {
    let not_found = || TmuxError::TargetNotFound(describe_target(target));

    plan.windows
        .iter()
        .enumerate()
        .filter(|(_, window)| target.window.as_ref().map_or(true, |name| window.name == *name))
        .find_map(|(position, window)| {
            let pane = match &target.pane {
                PaneRef::Name(name) => window.pane(name),
                PaneRef::Index(index) => window.pane_at(*index),
            };
            pane.map(|p| (position, p))
        })
        .ok_or_else(not_found)
}

fn describe_target(target: &PaneTarget) -> String {
    let pane = match &target.pane {
        PaneRef::Name(name) => name.clone(),
        PaneRef::Index(index) => format!("pane[{index}]"),
    };
    match &target.window {
        Some(window) => format!("{window}/{pane}"),
        None => pane,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DryRunRunner;
    use crate::tmux::spec::TmuxConfig;
    use serde_json::json;

    fn session_spec() -> SessionSpec {
        let config: TmuxConfig = serde_json::from_value(json!({
            "sessions": [{
                "name": "dev",
                "path": "services",
                "color": "colour33",
                "windows": [
                    {"name": "code", "panes": [
                        {"name": "editor", "command": "nvim"},
                        {"name": "shell", "split": "vertical", "size": 25}
                    ]},
                    {"name": "ops", "grid": [
                        {"row": 1, "col": 1, "name": "logs", "command": "tail -f app.log"},
                        {"row": 0, "col": 0, "name": "api", "command": "cargo run"},
                        {"row": 0, "col": 1, "name": "web", "command": "npm start"},
                        {"row": 1, "col": 0, "name": "db"}
                    ]},
                    {"name": "broken", "steps": [{"target": "missing", "newPane": "x"}]}
                ]
            }]
        }))
        .unwrap();
        config.sessions[0].clone()
    }

    fn plan() -> SessionPlan {
        SessionPlan::build("dev", &[(PathBuf::from("/src/proj"), session_spec())], &SshRoots::default())
    }

    fn tmux(runner: &Arc<DryRunRunner>) -> Tmux {
        Tmux::new(Arc::clone(runner) as Arc<dyn CommandRunner>, TmuxSettings::default())
    }

    #[test]
    fn test_plan_skips_broken_windows() {
        let plan = plan();
        assert_eq!(plan.windows.iter().map(|w| w.name.as_str()).collect::<Vec<_>>(), vec!["code", "ops"]);
        assert_eq!(plan.windows[0].path, PathBuf::from("/src/proj/services"));
        assert_eq!(plan.color.as_deref(), Some("colour33"));
    }

    #[test]
    fn test_parse_targets() {
        assert_eq!(
            "editor".parse::<PaneTarget>().unwrap(),
            PaneTarget { window: None, pane: PaneRef::Name("editor".into()) }
        );
        assert_eq!(
            "ops/pane[3]".parse::<PaneTarget>().unwrap(),
            PaneTarget { window: Some("ops".into()), pane: PaneRef::Index(3) }
        );
        assert_eq!(
            "pane[0]".parse::<PaneTarget>().unwrap(),
            PaneTarget { window: None, pane: PaneRef::Index(0) }
        );
        assert!("ops/".parse::<PaneTarget>().is_err());
        assert!("pane[x]".parse::<PaneTarget>().is_err());
        assert!("/api".parse::<PaneTarget>().is_err());
    }

    #[tokio::test]
    async fn test_init_issues_commands_in_order() {
        let runner = Arc::new(DryRunRunner::new().fail_when("has-session"));
        let options = InitOptions { reset: false, color: true, run_commands: true };

        tmux(&runner).init(&plan(), options).await.unwrap();

        let commands = runner.commands();
        assert_eq!(commands[0], "tmux has-session -t dev");
        assert_eq!(commands[1], "tmux new-session -d -s dev -n code -c /src/proj/services");
        assert_eq!(commands[2], "tmux new-window -t dev: -n ops -c /src/proj/services");
        assert_eq!(commands[3], "tmux show-options -gv base-index");
        assert_eq!(commands[4], "tmux show-options -gv pane-base-index");
        assert!(commands.contains(&"tmux split-window -t dev:0.0 -v -l 25% -c /src/proj/services".to_string()));
        assert!(commands.contains(&"tmux split-window -t dev:1.2 -h -l 50% -c /src/proj/services".to_string()));
        assert!(commands.contains(&"tmux select-pane -t dev:1.3 -T logs".to_string()));
        assert!(commands.contains(&"tmux send-keys -t dev:1.0 \"cargo run\" Enter".to_string()));
        assert!(commands.contains(&"tmux send-keys -t dev:1.3 \"tail -f app.log\" Enter".to_string()));
        assert_eq!(commands.last().unwrap(), "tmux set-option -t dev status-style bg=colour33");
    }

    #[tokio::test]
    async fn test_init_without_command_flag_sends_no_keys() {
        let runner = Arc::new(DryRunRunner::new().fail_when("has-session"));
        tmux(&runner).init(&plan(), InitOptions::default()).await.unwrap();
        assert!(runner.commands().iter().all(|c| !c.contains("send-keys")));
    }

    #[tokio::test]
    async fn test_init_respects_pane_base_index() {
        let runner = Arc::new(DryRunRunner::new().fail_when("has-session").respond_with("pane-base-index", "1\n"));
        tmux(&runner).init(&plan(), InitOptions::default()).await.unwrap();
        assert!(runner.commands().contains(&"tmux select-pane -t dev:1.4 -T logs".to_string()));
    }

    #[tokio::test]
    async fn test_init_respects_window_base_index() {
        let runner =
            Arc::new(DryRunRunner::new().fail_when("has-session").respond_with("-gv base-index", "1\n"));
        tmux(&runner).init(&plan(), InitOptions::default()).await.unwrap();

        let commands = runner.commands();
        assert!(commands.contains(&"tmux select-pane -t dev:1.0 -T editor".to_string()));
        assert!(commands.contains(&"tmux select-pane -t dev:2.3 -T logs".to_string()));
    }

    #[tokio::test]
    async fn test_init_merged_plan_with_duplicate_window_names() {
        let spec = |command: &str| -> SessionSpec {
            serde_json::from_value(json!({
                "name": "dev",
                "windows": [{"name": "main", "panes": [{"name": "left", "command": command}, {"name": "right"}]}]
            }))
            .unwrap()
        };
        let plan = SessionPlan::build(
            "dev",
            &[(PathBuf::from("/src/api"), spec("cargo run")), (PathBuf::from("/src/web"), spec("npm start"))],
            &SshRoots::default(),
        );
        assert_eq!(plan.windows.len(), 2);

        let runner = Arc::new(DryRunRunner::new().fail_when("has-session"));
        tmux(&runner).init(&plan, InitOptions { run_commands: true, ..InitOptions::default() }).await.unwrap();

        let commands = runner.commands();
        assert!(commands.contains(&"tmux split-window -t dev:0.0 -h -c /src/api".to_string()));
        assert!(commands.contains(&"tmux split-window -t dev:1.0 -h -c /src/web".to_string()));
        assert!(commands.contains(&"tmux send-keys -t dev:0.0 \"cargo run\" Enter".to_string()));
        assert!(commands.contains(&"tmux send-keys -t dev:1.0 \"npm start\" Enter".to_string()));
        assert!(commands.iter().all(|c| !c.contains("dev:main")));
    }

    #[tokio::test]
    async fn test_init_skips_panes_that_reject_keys() {
        let runner = Arc::new(DryRunRunner::new().fail_when("has-session").fail_when("send-keys -t dev:0.0"));
        let options = InitOptions { color: true, run_commands: true, ..InitOptions::default() };

        tmux(&runner).init(&plan(), options).await.unwrap();

        let commands = runner.commands();
        assert!(commands.contains(&"tmux select-pane -t dev:0.1 -T shell".to_string()));
        assert!(commands.contains(&"tmux send-keys -t dev:1.0 \"cargo run\" Enter".to_string()));
        assert_eq!(commands.last().unwrap(), "tmux set-option -t dev status-style bg=colour33");
    }

    #[tokio::test]
    async fn test_init_continues_when_pane_title_fails() {
        let runner = Arc::new(DryRunRunner::new().fail_when("has-session").fail_when("select-pane"));
        tmux(&runner).init(&plan(), InitOptions { run_commands: true, ..InitOptions::default() }).await.unwrap();
        assert!(runner.commands().contains(&"tmux send-keys -t dev:1.3 \"tail -f app.log\" Enter".to_string()));
    }

    #[tokio::test]
    async fn test_init_existing_session() {
        let runner = Arc::new(DryRunRunner::new());
        let err = tmux(&runner).init(&plan(), InitOptions::default()).await.unwrap_err();
        assert!(matches!(err, TmuxError::SessionExists(ref s) if s == "dev"));

        let runner = Arc::new(DryRunRunner::new());
        tmux(&runner).init(&plan(), InitOptions { reset: true, ..InitOptions::default() }).await.unwrap();
        assert_eq!(runner.commands()[1], "tmux kill-session -t dev");
    }

    #[tokio::test]
    async fn test_attach_runs_targets_then_attaches() {
        let runner = Arc::new(DryRunRunner::new());
        let options = AttachOptions {
            run_all: false,
            targets: vec!["ops/api".parse().unwrap(), "pane[0]".parse().unwrap()],
            inside_tmux: false,
        };

        tmux(&runner).attach("dev", Some(&plan()), &options).await.unwrap();

        let commands = runner.commands();
        assert_eq!(
            commands,
            vec![
                "tmux has-session -t dev",
                "tmux show-options -gv base-index",
                "tmux show-options -gv pane-base-index",
                "tmux send-keys -t dev:1.0 \"cargo run\" Enter",
                "tmux send-keys -t dev:0.0 nvim Enter",
                "tmux attach-session -t dev",
            ]
        );
    }

    #[tokio::test]
    async fn test_attach_continues_after_failed_send() {
        let runner = Arc::new(DryRunRunner::new().fail_when("send-keys -t dev:0.0"));
        let options = AttachOptions { run_all: true, ..AttachOptions::default() };

        tmux(&runner).attach("dev", Some(&plan()), &options).await.unwrap();

        let commands = runner.commands();
        assert!(commands.contains(&"tmux send-keys -t dev:1.3 \"tail -f app.log\" Enter".to_string()));
        assert_eq!(commands.last().unwrap(), "tmux attach-session -t dev");
    }

    #[tokio::test]
    async fn test_attach_unknown_target() {
        let runner = Arc::new(DryRunRunner::new());
        let options = AttachOptions { targets: vec!["ops/nope".parse().unwrap()], ..AttachOptions::default() };
        let err = tmux(&runner).attach("dev", Some(&plan()), &options).await.unwrap_err();
        assert!(matches!(err, TmuxError::TargetNotFound(ref t) if t == "ops/nope"));
    }

    #[tokio::test]
    async fn test_attach_inside_tmux_switches_client() {
        let runner = Arc::new(DryRunRunner::new());
        let options = AttachOptions { inside_tmux: true, ..AttachOptions::default() };
        tmux(&runner).attach("dev", None, &options).await.unwrap();
        assert_eq!(runner.commands().last().unwrap(), "tmux switch-client -t dev");
    }

    #[tokio::test]
    async fn test_terminate_missing_session() {
        let runner = Arc::new(DryRunRunner::new().fail_when("has-session"));
        let err = tmux(&runner).terminate("dev").await.unwrap_err();
        assert!(matches!(err, TmuxError::SessionNotFound(_)));
    }

    #[test]
    fn test_color_fallbacks() {
        let runner = Arc::new(DryRunRunner::new());
        let manager = tmux(&runner);
        let mut plan = plan();
        assert_eq!(manager.color_for(&plan), "colour33");

        plan.color = None;
        let picked = manager.color_for(&plan);
        assert!(TmuxSettings::default().palette.contains(&picked));
        assert_eq!(manager.color_for(&plan), picked);
    }
}
