//! Window layout planning.
//!
//! A [`WindowSpec`] is turned into the ordered `split-window` operations that
//! build it plus the final index of every pane. tmux numbers panes by their
//! position in the window's pane list, and a split inserts the new pane
//! directly after the pane it was split from, so indices shift as the layout
//! is built. [`PaneOrder`] replays the splits to know which index a pane has
//! at any point.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::resolve_path;

use super::spec::{GridCell, PaneSize, PaneSpec, SectionChild, SectionSpec, SplitDirection, StepSpec, WindowSpec};

/// Name of the initial pane in a steps layout without `initialPane`.
const DEFAULT_INITIAL_PANE: &str = "main";

/// Errors raised while planning a window.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    /// A step refers to a pane that does not exist yet
    #[error("Target pane '{name}' not found. Available panes: {}", .available.join(", "))]
    PaneNotFound { name: String, available: Vec<String> },

    /// The grid is not exactly the four cells of a 2x2 grid
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    /// A section has no children
    #[error("Window '{0}' has an empty section")]
    EmptyWindow(String),

    /// A pane targets itself or a pane defined after it
    #[error("Pane '{pane}' cannot split from pane {target}")]
    InvalidTarget { pane: String, target: usize },
}

/// Local and remote source roots used to translate paths for ssh panes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshRoots {
    /// Local source root (`SRC`)
    pub local: Option<String>,

    /// Source root on remote hosts (`LOCALHOST_SRC`)
    pub remote: Option<String>,
}

impl SshRoots {
    /// Read `SRC` and `LOCALHOST_SRC` from the environment.
    pub fn from_env() -> Self {
        Self { local: std::env::var("SRC").ok(), remote: std::env::var("LOCALHOST_SRC").ok() }
    }

    /// Translate a local path into the remote one. Only paths at or below
    /// the local root, compared by whole components, are translated.
    pub fn remote_path(&self, path: &Path) -> String {
        let (Some(local), Some(remote)) = (&self.local, &self.remote) else {
            return path.to_string_lossy().into_owned();
        };
        if local.is_empty() {
            return path.to_string_lossy().into_owned();
        }

        match path.strip_prefix(local) {
            Ok(rest) if rest.as_os_str().is_empty() => remote.clone(),
            Ok(rest) => format!("{}/{}", remote.trim_end_matches('/'), rest.to_string_lossy()),
            Err(_) => path.to_string_lossy().into_owned(),
        }
    }

    /// Wrap `command` so it runs on `target` inside the translated path and
    /// leaves a login shell behind.
    pub fn wrap(&self, target: &str, path: &Path, command: Option<&str>) -> String {
        let mut inner = format!("cd {}", self.remote_path(path));
        if let Some(command) = command.filter(|c| !c.trim().is_empty()) {
            inner.push_str("; ");
            inner.push_str(command);
        }
        inner.push_str("; exec \\$SHELL -l");
        format!("ssh {target} -t \"{}\"", escape_double_quotes(&inner))
    }
}

fn escape_double_quotes(s: &str) -> String {
    s.replace('"', "\\\"")
}

/// One `split-window` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOp {
    /// Index of the pane being split, at the time of the split
    pub target: usize,

    pub direction: SplitDirection,

    /// Value for `-l`
    pub size: Option<String>,

    /// Directory of the new pane
    pub path: PathBuf,
}

/// A pane in its final position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedPane {
    pub name: String,

    /// Final pane index (0-based, before `pane-base-index`)
    pub index: usize,

    /// Command to type, already wrapped for ssh
    pub command: Option<String>,

    pub path: PathBuf,

    pub ssh_target: Option<String>,
}

/// The plan for one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowLayout {
    pub name: String,

    /// Directory of the initial pane
    pub path: PathBuf,

    /// Splits in execution order
    pub splits: Vec<SplitOp>,

    /// Layout passed to `select-layout` after splitting
    pub select_layout: Option<String>,

    /// Panes sorted by final index
    pub panes: Vec<PlacedPane>,
}

impl WindowLayout {
    /// Pane name to final index.
    pub fn pane_map(&self) -> BTreeMap<String, usize> {
        self.panes.iter().map(|p| (p.name.clone(), p.index)).collect()
    }

    /// Find a pane by name.
    pub fn pane(&self, name: &str) -> Option<&PlacedPane> {
        self.panes.iter().find(|p| p.name == name)
    }

    /// Find a pane by final index.
    pub fn pane_at(&self, index: usize) -> Option<&PlacedPane> {
        self.panes.iter().find(|p| p.index == index)
    }
}

/// Live pane order of a window being built. Panes are identified by the
/// order they were created in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneOrder {
    order: Vec<usize>,
    next_id: usize,
}

impl Default for PaneOrder {
    fn default() -> Self {
        Self { order: vec![0], next_id: 1 }
    }
}

impl PaneOrder {
    /// A window with its initial pane (id 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Current index of pane `id`.
    pub fn index_of(&self, id: usize) -> Option<usize> {
        self.order.iter().position(|&p| p == id)
    }

    /// Split pane `id`. Returns the index it had when split and the new
    /// pane's id.
    pub fn split(&mut self, id: usize) -> Option<(usize, usize)> {
        let index = self.index_of(id)?;
        let new_id = self.next_id;
        self.next_id += 1;
        self.order.insert(index + 1, new_id);
        Some((index, new_id))
    }

    /// Pane ids by current index.
    pub fn ids(&self) -> &[usize] {
        &self.order
    }
}

/// How a window is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    Manual,
    Grid,
    Sections,
    Steps,
}

impl LayoutKind {
    /// The kind named by `layout`, or implied by which fields are set.
    pub fn of(window: &WindowSpec) -> Self {
        match window.layout.as_deref() {
            Some("grid") => Self::Grid,
            Some("sections") => Self::Sections,
            Some("steps") => Self::Steps,
            Some("manual") => Self::Manual,
            _ if window.grid.is_some() => Self::Grid,
            _ if window.sections.is_some() => Self::Sections,
            _ if window.steps.is_some() => Self::Steps,
            _ => Self::Manual,
        }
    }

    fn is_keyword(layout: &str) -> bool {
        matches!(layout, "grid" | "sections" | "steps" | "manual")
    }
}

/// Plan a window under `base_path`, reading ssh roots from the environment.
pub fn plan_window(window: &WindowSpec, base_path: &Path) -> Result<WindowLayout, LayoutError> {
    plan_window_with(window, base_path, &SshRoots::from_env())
}

/// Plan a window under `base_path`.
pub fn plan_window_with(
    window: &WindowSpec,
    base_path: &Path,
    ssh: &SshRoots,
) -> Result<WindowLayout, LayoutError> {
    let path = resolve_path(base_path, window.path.as_deref());
    let mut builder = Builder { window, path: path.clone(), order: PaneOrder::new(), splits: Vec::new() };

    let placed = match LayoutKind::of(window) {
        LayoutKind::Manual => builder.manual()?,
        LayoutKind::Grid => builder.grid(window.grid.as_deref().unwrap_or_default())?,
        LayoutKind::Sections => match &window.sections {
            Some(root) => {
                let mut placed = Vec::new();
                builder.section(root, 0, &mut placed)?;
                placed
            }
            None => return Err(LayoutError::EmptyWindow(window.name.clone())),
        },
        LayoutKind::Steps => builder.steps(window.steps.as_deref().unwrap_or_default())?,
    };

    let mut panes: Vec<PlacedPane> = placed
        .into_iter()
        .map(|(id, name, pane)| builder.place(id, name, pane, ssh))
        .collect();
    panes.sort_by_key(|p| p.index);

    let select_layout =
        window.layout.clone().filter(|l| !l.trim().is_empty() && !LayoutKind::is_keyword(l));

    tracing::debug!(
        window = %window.name,
        splits = builder.splits.len(),
        panes = panes.len(),
        "Planned window layout"
    );

    Ok(WindowLayout { name: window.name.clone(), path, splits: builder.splits, select_layout, panes })
}

/// Pane id, display name and definition.
type Placement<'w> = (usize, String, Option<&'w PaneSpec>);

struct Builder<'w> {
    window: &'w WindowSpec,
    path: PathBuf,
    order: PaneOrder,
    splits: Vec<SplitOp>,
}

impl<'w> Builder<'w> {
    fn split(
        &mut self,
        id: usize,
        direction: SplitDirection,
        size: Option<String>,
        pane: Option<&PaneSpec>,
    ) -> usize {
        // Every id handed out comes from `order`, so the lookup cannot miss.
        let (target, new_id) = self.order.split(id).unwrap_or((0, id));
        let path = resolve_path(&self.path, pane.and_then(|p| p.path.as_deref()));
        self.splits.push(SplitOp { target, direction, size, path });
        new_id
    }

    fn manual(&mut self) -> Result<Vec<Placement<'w>>, LayoutError> {
        let window = self.window;
        let panes = &window.panes;
        if panes.is_empty() {
            return Ok(vec![(0, DEFAULT_INITIAL_PANE.to_string(), None)]);
        }

        let mut ids = vec![0];
        for (i, pane) in panes.iter().enumerate().skip(1) {
            let target = pane.target.unwrap_or(i - 1);
            if target >= i {
                return Err(LayoutError::InvalidTarget { pane: pane.label(i), target });
            }
            let id = self.split(ids[target], pane.split, pane.size.as_ref().map(PaneSize::to_arg), Some(pane));
            ids.push(id);
        }

        Ok(panes.iter().enumerate().map(|(i, pane)| (ids[i], pane.label(i), Some(pane))).collect())
    }

    fn grid(&mut self, cells: &'w [GridCell]) -> Result<Vec<Placement<'w>>, LayoutError> {
        const POSITIONS: [(usize, usize); 4] = [(0, 0), (0, 1), (1, 0), (1, 1)];

        if cells.len() != POSITIONS.len() {
            return Err(LayoutError::InvalidGrid(format!("expected 4 cells, got {}", cells.len())));
        }

        let mut by_position: [Option<&'w GridCell>; 4] = [None; 4];
        for cell in cells {
            let slot = POSITIONS
                .iter()
                .position(|&p| p == (cell.row, cell.col))
                .ok_or_else(|| {
                    LayoutError::InvalidGrid(format!("cell ({}, {}) is outside the 2x2 grid", cell.row, cell.col))
                })?;
            if by_position[slot].replace(cell).is_some() {
                return Err(LayoutError::InvalidGrid(format!(
                    "cell ({}, {}) is defined twice",
                    cell.row, cell.col
                )));
            }
        }

        let [Some(top_left), Some(top_right), Some(bottom_left), Some(bottom_right)] = by_position else {
            return Err(LayoutError::InvalidGrid("missing cells".to_string()));
        };

        let half = Some("50%".to_string());
        let bottom = self.split(0, SplitDirection::Vertical, half.clone(), Some(&bottom_left.pane));
        let right = self.split(0, SplitDirection::Horizontal, half.clone(), Some(&top_right.pane));
        let corner = self.split(bottom, SplitDirection::Horizontal, half, Some(&bottom_right.pane));

        Ok([(0, top_left), (right, top_right), (bottom, bottom_left), (corner, bottom_right)]
            .into_iter()
            .map(|(id, cell)| (id, cell.pane.label(id), Some(&cell.pane)))
            .collect())
    }

    fn section(
        &mut self,
        section: &'w SectionSpec,
        slot: usize,
        placed: &mut Vec<Placement<'w>>,
    ) -> Result<(), LayoutError> {
        let count = section.children.len();
        if count == 0 {
            return Err(LayoutError::EmptyWindow(self.window.name.clone()));
        }

        let mut slots = vec![slot];
        for (k, child) in section.children.iter().enumerate().skip(1) {
            let size = child.size().map(PaneSize::to_arg).or_else(|| Some(equal_share(count - k)));
            let last = slots[slots.len() - 1];
            let pane = match child {
                SectionChild::Pane(pane) => Some(pane),
                SectionChild::Section(_) => None,
            };
            slots.push(self.split(last, section.split, size, pane));
        }

        for (child, id) in section.children.iter().zip(slots) {
            match child {
                SectionChild::Section(nested) => self.section(nested, id, placed)?,
                SectionChild::Pane(pane) => {
                    let name = pane.label(placed.len());
                    placed.push((id, name, Some(pane)));
                }
            }
        }

        Ok(())
    }

    fn steps(&mut self, steps: &[StepSpec]) -> Result<Vec<Placement<'w>>, LayoutError> {
        let initial = self
            .window
            .initial_pane
            .clone()
            .or_else(|| self.window.panes.first().and_then(|p| p.name.clone()))
            .unwrap_or_else(|| DEFAULT_INITIAL_PANE.to_string());

        let mut names: Vec<(String, usize)> = vec![(initial, 0)];

        for step in steps {
            let Some(&(_, target)) = names.iter().find(|(n, _)| *n == step.target) else {
                return Err(LayoutError::PaneNotFound {
                    name: step.target.clone(),
                    available: names.iter().map(|(n, _)| n.clone()).collect(),
                });
            };
            let definition = self.definition(&step.new_pane);
            let id = self.split(target, step.direction, step.size.as_ref().map(PaneSize::to_arg), definition);
            names.push((step.new_pane.clone(), id));
        }

        Ok(names
            .into_iter()
            .map(|(name, id)| {
                let definition = self.definition(&name);
                (id, name, definition)
            })
            .collect())
    }

    fn definition(&self, name: &str) -> Option<&'w PaneSpec> {
        self.window.panes.iter().find(|p| p.name.as_deref() == Some(name))
    }

    fn place(&self, id: usize, name: String, pane: Option<&PaneSpec>, ssh: &SshRoots) -> PlacedPane {
        let index = self.order.index_of(id).unwrap_or(id);
        let path = resolve_path(&self.path, pane.and_then(|p| p.path.as_deref()));
        let ssh_target = pane.and_then(|p| p.ssh_target.clone()).filter(|t| !t.trim().is_empty());
        let command = pane.and_then(|p| p.command.as_deref());

        let command = match &ssh_target {
            Some(target) => Some(ssh.wrap(target, &path, command)),
            None => command.map(str::to_string),
        };

        PlacedPane { name, index, command, path, ssh_target }
    }
}

/// Percentage for the new pane when the last slot is split to make room for
/// `remaining` more equal children.
fn equal_share(remaining: usize) -> String {
    let share = (100 * remaining + (remaining + 1) / 2) / (remaining + 1);
    format!("{share}%")
}
