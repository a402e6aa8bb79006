//! Declarative session description read from the `tmux` section of
//! `meta.json`.
//!
//! ```json
//! {
//!   "tmux": {
//!     "sessions": [{
//!       "name": "dev",
//!       "windows": [
//!         {"name": "code", "panes": [{"name": "editor"}, {"name": "shell", "split": "vertical", "size": 30}]},
//!         {"name": "ops", "layout": "grid", "grid": [
//!           {"row": 0, "col": 0, "name": "api", "command": "cargo run"},
//!           {"row": 0, "col": 1, "name": "web", "command": "npm run dev"},
//!           {"row": 1, "col": 0, "name": "db", "sshTarget": "db-host"},
//!           {"row": 1, "col": 1, "name": "logs"}
//!         ]}
//!       ]
//!     }]
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};

/// The `tmux` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmuxConfig {
    /// Sessions defined by the project
    #[serde(default)]
    pub sessions: Vec<SessionSpec>,
}

impl TmuxConfig {
    /// Find a session by name.
    pub fn session(&self, name: &str) -> Option<&SessionSpec> {
        self.sessions.iter().find(|s| s.name == name)
    }
}

/// A tmux session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSpec {
    /// Session name
    pub name: String,

    /// Base directory, relative to the project directory
    #[serde(default)]
    pub path: Option<String>,

    /// Status bar colour used with `--color`
    #[serde(default)]
    pub color: Option<String>,

    /// Windows in creation order
    #[serde(default)]
    pub windows: Vec<WindowSpec>,
}

/// A tmux window.
///
/// Exactly one of `grid`, `sections` or `steps` is normally given; without
/// them the flat `panes` list is laid out manually. With `steps`, `panes`
/// only supplies commands and paths by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSpec {
    /// Window name
    pub name: String,

    /// Directory, relative to the session directory
    #[serde(default)]
    pub path: Option<String>,

    /// `grid`, `sections`, `steps`, `manual`, or a tmux layout name passed
    /// to `select-layout`
    #[serde(default)]
    pub layout: Option<String>,

    /// Flat pane list
    #[serde(default)]
    pub panes: Vec<PaneSpec>,

    /// 2x2 grid cells
    #[serde(default)]
    pub grid: Option<Vec<GridCell>>,

    /// Recursive section tree
    #[serde(default)]
    pub sections: Option<SectionSpec>,

    /// Explicit split steps
    #[serde(default)]
    pub steps: Option<Vec<StepSpec>>,

    /// Name of the pane the window starts with (steps only)
    #[serde(default)]
    pub initial_pane: Option<String>,
}

/// A single pane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaneSpec {
    /// Pane name, used as its title and for `--run` targets
    #[serde(default)]
    pub name: Option<String>,

    /// Command typed into the pane
    #[serde(default)]
    pub command: Option<String>,

    /// Directory, relative to the window directory
    #[serde(default)]
    pub path: Option<String>,

    /// How this pane is split off its target
    #[serde(default)]
    pub split: SplitDirection,

    /// Size of the new pane
    #[serde(default)]
    pub size: Option<PaneSize>,

    /// List position of the pane to split (defaults to the previous pane)
    #[serde(default)]
    pub target: Option<usize>,

    /// Host to run the command on over ssh
    #[serde(default)]
    pub ssh_target: Option<String>,
}

impl PaneSpec {
    /// Name, or `pane<index>` for unnamed panes.
    pub fn label(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| format!("pane{index}"))
    }
}

/// Split direction, in tmux terms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitDirection {
    /// Side by side (`split-window -h`)
    #[default]
    #[serde(alias = "h")]
    Horizontal,
    /// Stacked (`split-window -v`)
    #[serde(alias = "v")]
    Vertical,
}

impl SplitDirection {
    /// The `split-window` flag.
    pub fn flag(self) -> &'static str {
        match self {
            Self::Horizontal => "-h",
            Self::Vertical => "-v",
        }
    }
}

/// Pane size: a percentage, or a raw tmux size (`20`, `30%`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaneSize {
    Percent(u32),
    Raw(String),
}

impl PaneSize {
    /// Value for `split-window -l`.
    pub fn to_arg(&self) -> String {
        match self {
            Self::Percent(p) => format!("{p}%"),
            Self::Raw(raw) => raw.trim().to_string(),
        }
    }
}

/// One cell of a 2x2 grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
    #[serde(flatten)]
    pub pane: PaneSpec,
}

/// A section of a sections layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSpec {
    /// Direction the section's children are laid out in
    #[serde(default)]
    pub split: SplitDirection,

    /// Size of the section within its parent
    #[serde(default)]
    pub size: Option<PaneSize>,

    /// Nested sections or panes
    pub children: Vec<SectionChild>,
}

/// Child of a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionChild {
    Section(SectionSpec),
    Pane(PaneSpec),
}

impl SectionChild {
    /// Size requested for the child's slot.
    pub fn size(&self) -> Option<&PaneSize> {
        match self {
            Self::Section(section) => section.size.as_ref(),
            Self::Pane(pane) => pane.size.as_ref(),
        }
    }
}

/// Step actions. Only `split` exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    #[default]
    Split,
}

/// One explicit split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    #[serde(default)]
    pub action: StepAction,

    /// Name of the pane to split
    pub target: String,

    #[serde(default)]
    pub direction: SplitDirection,

    #[serde(default)]
    pub size: Option<PaneSize>,

    /// Name given to the new pane
    pub new_pane: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_session() {
        let config: TmuxConfig = serde_json::from_value(json!({
            "sessions": [{
                "name": "dev",
                "windows": [{
                    "name": "code",
                    "panes": [
                        {"name": "editor", "command": "nvim"},
                        {"name": "shell", "split": "v", "size": 30, "sshTarget": "box"}
                    ]
                }]
            }]
        }))
        .unwrap();

        let session = config.session("dev").unwrap();
        let panes = &session.windows[0].panes;
        assert_eq!(panes[0].split, SplitDirection::Horizontal);
        assert_eq!(panes[1].split, SplitDirection::Vertical);
        assert_eq!(panes[1].size, Some(PaneSize::Percent(30)));
        assert_eq!(panes[1].ssh_target.as_deref(), Some("box"));
        assert!(config.session("prod").is_none());
    }

    #[test]
    fn test_parse_grid_cell_flattens_pane() {
        let cell: GridCell =
            serde_json::from_value(json!({"row": 1, "col": 0, "name": "db", "command": "psql"})).unwrap();
        assert_eq!((cell.row, cell.col), (1, 0));
        assert_eq!(cell.pane.command.as_deref(), Some("psql"));
    }

    #[test]
    fn test_parse_sections_tree() {
        let section: SectionSpec = serde_json::from_value(json!({
            "split": "horizontal",
            "children": [
                {"name": "left"},
                {"split": "vertical", "size": "40%", "children": [{"name": "top"}, {"name": "bottom"}]}
            ]
        }))
        .unwrap();

        assert!(matches!(section.children[0], SectionChild::Pane(_)));
        let SectionChild::Section(right) = &section.children[1] else { panic!("expected section") };
        assert_eq!(right.split, SplitDirection::Vertical);
        assert_eq!(section.children[1].size().map(PaneSize::to_arg).as_deref(), Some("40%"));
    }

    #[test]
    fn test_parse_steps() {
        let step: StepSpec =
            serde_json::from_value(json!({"target": "main", "direction": "vertical", "newPane": "logs"}))
                .unwrap();
        assert_eq!(step.action, StepAction::Split);
        assert_eq!(step.new_pane, "logs");
        assert!(step.size.is_none());
    }

    #[test]
    fn test_size_args() {
        assert_eq!(PaneSize::Percent(25).to_arg(), "25%");
        assert_eq!(PaneSize::Raw(" 12 ".into()).to_arg(), "12");
    }
}
