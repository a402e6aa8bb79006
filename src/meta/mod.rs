//! Project configuration (`meta.json`).
//!
//! Every project directory carries a `meta.json` document with at least an
//! `id`, a `name` and a `type`, plus optional sections (`routines`, `tmux`,
//! `docker`, `compose`, `terraform`, ...). Documents are read fresh on every
//! invocation and resolved through [`resolve_templates`].

mod discovery;
mod template;

pub use discovery::{duplicate_ids, Discovery, PropertyFilter, EXCLUDED_DIRS};
pub use template::{resolve_templates, substitute_env, Variables};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// File name of the per-project configuration document.
pub const META_FILE: &str = "meta.json";

/// Routine name to routine command.
pub type RoutineMap = BTreeMap<String, String>;

/// Errors raised while loading or editing project configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No `meta.json` in the directory (or any parent, for lookups)
    #[error("No meta.json found in {}", .0.display())]
    NotFound(PathBuf),

    /// The file could not be read or written
    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON
    #[error("Invalid JSON in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A required section is absent
    #[error("Project '{project}' has no '{section}' section")]
    MissingSection { project: String, section: String },

    /// A section does not have the expected shape
    #[error("Invalid '{section}' section in project '{project}': {source}")]
    InvalidSection {
        project: String,
        section: String,
        #[source]
        source: serde_json::Error,
    },

    /// A property path cannot be used for the requested operation
    #[error("Invalid property path '{0}'")]
    InvalidPath(String),
}

/// Kind of project a `meta.json` describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    /// A top-level project grouping apps
    Project,
    /// A deployable application
    App,
    /// Shared configuration
    Config,
}

impl ProjectType {
    /// Get the lowercase name used in `meta.json`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::App => "app",
            Self::Config => "config",
        }
    }
}

/// A loaded `meta.json`.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// Directory containing the file
    dir: PathBuf,

    /// Document as written on disk
    raw: Value,

    /// Document with placeholders substituted
    resolved: Value,
}

impl ProjectConfig {
    /// Load `meta.json` from `dir`, using the process environment and the
    /// project's `.env` for placeholders.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        Self::load_with(dir, &Variables::for_project(dir))
    }

    /// Load `meta.json` from `dir` with explicit variables.
    pub fn load_with(dir: &Path, vars: &Variables) -> Result<Self, ConfigError> {
        let path = dir.join(META_FILE);
        if !path.is_file() {
            return Err(ConfigError::NotFound(dir.to_path_buf()));
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
        let raw: Value =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?;

        tracing::debug!(dir = %dir.display(), "Loaded project configuration");
        Ok(Self::from_value(dir, raw, vars))
    }

    /// Build a config from an in-memory document.
    pub fn from_value(dir: impl Into<PathBuf>, raw: Value, vars: &Variables) -> Self {
        let resolved = resolve_templates(&raw, vars);
        Self { dir: dir.into(), raw, resolved }
    }

    /// Find the nearest `meta.json` in `start` or one of its parents.
    pub fn find(start: &Path) -> Result<Self, ConfigError> {
        start
            .ancestors()
            .find(|dir| dir.join(META_FILE).is_file())
            .map_or_else(|| Err(ConfigError::NotFound(start.to_path_buf())), Self::load)
    }

    /// Directory containing `meta.json`.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the `meta.json` file.
    pub fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }

    /// The resolved document.
    pub fn document(&self) -> &Value {
        &self.resolved
    }

    /// The document as written on disk.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Project id.
    pub fn id(&self) -> Option<&str> {
        self.resolved.get("id").and_then(Value::as_str)
    }

    /// Project name, falling back to the directory name.
    pub fn name(&self) -> &str {
        self.resolved
            .get("name")
            .and_then(Value::as_str)
            .or_else(|| self.dir.file_name().and_then(|n| n.to_str()))
            .unwrap_or_default()
    }

    /// Project type, when present and valid.
    pub fn project_type(&self) -> Option<ProjectType> {
        self.resolved.get("type").cloned().and_then(|v| serde_json::from_value(v).ok())
    }

    /// Resolved value at a dotted path (`docker.image`, `hosts.0`).
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.resolved, path)
    }

    /// The `routines` section. Non-string entries are skipped.
    pub fn routines(&self) -> RoutineMap {
        let Some(Value::Object(routines)) = self.resolved.get("routines") else {
            return RoutineMap::new();
        };

        routines
            .iter()
            .filter_map(|(name, command)| match command.as_str() {
                Some(command) => Some((name.clone(), command.to_string())),
                None => {
                    tracing::warn!(project = self.name(), routine = %name, "Ignoring non-string routine");
                    None
                }
            })
            .collect()
    }

    /// Deserialize an optional section.
    pub fn section<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        match self.resolved.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::deserialize(value).map(Some).map_err(|source| {
                ConfigError::InvalidSection {
                    project: self.name().to_string(),
                    section: name.to_string(),
                    source,
                }
            }),
        }
    }

    /// Deserialize a section that must be present.
    pub fn require_section<T: DeserializeOwned>(&self, name: &str) -> Result<T, ConfigError> {
        self.section(name)?.ok_or_else(|| ConfigError::MissingSection {
            project: self.name().to_string(),
            section: name.to_string(),
        })
    }

    /// Set a value at a dotted path, creating intermediate objects.
    ///
    /// The raw document is updated as well, so [`ProjectConfig::save`]
    /// persists the change.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), ConfigError> {
        set_path(&mut self.raw, path, value.clone())?;
        set_path(&mut self.resolved, path, value)
    }

    /// Write the raw document back to `meta.json`.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = self.meta_path();
        let mut content = serde_json::to_string_pretty(&self.raw)
            .map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
        content.push('\n');
        std::fs::write(&path, content).map_err(|source| ConfigError::Io { path, source })
    }
}

fn path_segments(path: &str) -> Vec<String> {
    path.replace('[', ".").replace(']', "").split('.').map(str::to_string).collect()
}

/// Look up a dotted path (`a.b.0` or `a.b[0]`) in a JSON value.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path_segments(path).iter().try_fold(value, |current, segment| {
        if segment.is_empty() {
            return None;
        }
        match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    })
}

fn set_path(root: &mut Value, path: &str, value: Value) -> Result<(), ConfigError> {
    let segments = path_segments(path);
    if segments.iter().any(String::is_empty) {
        return Err(ConfigError::InvalidPath(path.to_string()));
    }

    let (last, parents) =
        segments.split_last().ok_or_else(|| ConfigError::InvalidPath(path.to_string()))?;

    let mut current = root;
    for segment in parents {
        current = match current {
            Value::Object(map) => {
                map.entry(segment.clone()).or_insert_with(|| Value::Object(Map::new()))
            }
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| ConfigError::InvalidPath(path.to_string()))?,
            _ => return Err(ConfigError::InvalidPath(path.to_string())),
        };
    }

    match current {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            let slot = last
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| ConfigError::InvalidPath(path.to_string()))?;
            *slot = value;
            Ok(())
        }
        _ => Err(ConfigError::InvalidPath(path.to_string())),
    }
}
