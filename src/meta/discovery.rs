//! Recursive project discovery.
//!
//! Walks a source tree collecting directories, skipping `.git`,
//! `node_modules` and hidden folders at every depth, and loads the
//! `meta.json` of every directory that has one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use walkdir::WalkDir;

use super::{ConfigError, ProjectConfig, META_FILE};
use crate::core::DiscoverySettings;

/// Directory names that are never descended into.
pub const EXCLUDED_DIRS: &[&str] = &[".git", "node_modules"];

/// Directory walker configured from [`DiscoverySettings`].
#[derive(Debug, Clone)]
pub struct Discovery {
    /// Extra directory names to skip
    ignore_dirs: Vec<String>,

    /// Maximum depth below the root
    max_depth: usize,
}

impl Default for Discovery {
    fn default() -> Self {
        Self::from_settings(&DiscoverySettings::default())
    }
}

impl Discovery {
    /// Create a walker with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a walker from settings.
    pub fn from_settings(settings: &DiscoverySettings) -> Self {
        Self { ignore_dirs: settings.ignore_dirs.clone(), max_depth: settings.max_depth.max(1) }
    }

    /// Limit how deep the walk goes.
    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    /// Skip another directory name.
    #[must_use]
    pub fn ignore(mut self, name: impl Into<String>) -> Self {
        self.ignore_dirs.push(name.into());
        self
    }

    /// Check whether a directory name is skipped.
    pub fn is_excluded(&self, name: &str) -> bool {
        name.starts_with('.')
            || EXCLUDED_DIRS.contains(&name)
            || self.ignore_dirs.iter().any(|d| d == name)
    }

    /// All eligible directories below `root` (not including `root`), sorted
    /// by path.
    pub fn directories(&self, root: &Path) -> Vec<PathBuf> {
        WalkDir::new(root)
            .min_depth(1)
            .max_depth(self.max_depth)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || (entry.file_type().is_dir()
                        && !self.is_excluded(&entry.file_name().to_string_lossy()))
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.into_path()),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unreadable entry");
                    None
                }
            })
            .collect()
    }

    /// Every project below `root`. Invalid `meta.json` files are logged and
    /// skipped.
    pub fn projects(&self, root: &Path) -> Vec<ProjectConfig> {
        let projects: Vec<ProjectConfig> = self
            .directories(root)
            .into_iter()
            .filter(|dir| dir.join(META_FILE).is_file())
            .filter_map(|dir| match ProjectConfig::load(&dir) {
                Ok(project) => Some(project),
                Err(e) => {
                    tracing::warn!(path = %dir.display(), error = %e, "Skipping invalid project");
                    None
                }
            })
            .collect();

        tracing::debug!(root = %root.display(), count = projects.len(), "Discovered projects");
        projects
    }

    /// The project at `root` itself, if any, followed by every project
    /// below it. An invalid root `meta.json` is logged and skipped like any
    /// other.
    pub fn projects_with_root(&self, root: &Path) -> Vec<ProjectConfig> {
        let mut projects = Vec::new();
        match ProjectConfig::load(root) {
            Ok(project) => projects.push(project),
            Err(ConfigError::NotFound(_)) => {}
            Err(e) => tracing::warn!(path = %root.display(), error = %e, "Skipping invalid project"),
        }
        projects.extend(self.projects(root));
        projects
    }

    /// Projects below `root` whose configuration matches `filter`.
    pub fn projects_matching(&self, root: &Path, filter: &PropertyFilter) -> Vec<ProjectConfig> {
        self.projects(root).into_iter().filter(|p| filter.matches(p)).collect()
    }
}

/// Predicate on a project property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyFilter {
    /// Dotted property path
    pub property: String,

    /// Expected value; `None` only requires the property to exist
    pub value: Option<String>,
}

impl PropertyFilter {
    /// Create a filter.
    pub fn new(property: impl Into<String>, value: Option<String>) -> Self {
        Self { property: property.into(), value }
    }

    /// Check a project against the filter.
    ///
    /// Strings compare directly; other values compare by their JSON text
    /// (`true`, `3`).
    pub fn matches(&self, project: &ProjectConfig) -> bool {
        match (project.get(&self.property), &self.value) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(Value::String(actual)), Some(expected)) => actual == expected,
            (Some(actual), Some(expected)) => actual.to_string() == *expected,
        }
    }
}

/// Ids used by more than one project, with the directories using them.
pub fn duplicate_ids(projects: &[ProjectConfig]) -> BTreeMap<String, Vec<PathBuf>> {
    let mut by_id: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for project in projects {
        if let Some(id) = project.id() {
            by_id.entry(id.to_string()).or_default().push(project.dir().to_path_buf());
        }
    }
    by_id.retain(|_, dirs| dirs.len() > 1);
    by_id
}
