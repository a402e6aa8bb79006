//! Tool settings for metarun.
//!
//! Settings are global preferences (shell, logging, discovery limits, tmux
//! colors) loaded from TOML. Per-project behaviour lives in `meta.json`, see
//! [`crate::meta`].

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Local settings file name, looked up in the current directory.
pub const LOCAL_SETTINGS_FILE: &str = ".run.toml";

/// Application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// General settings
    pub general: GeneralSettings,

    /// Project discovery settings
    pub discovery: DiscoverySettings,

    /// tmux settings
    pub tmux: TmuxSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Shell used for routine commands (defaults to `sh`)
    pub shell: Option<String>,

    /// Log filter used when neither `--verbose` nor `RUN_LOG` is given
    pub log_level: String,
}

/// Project discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Extra directory names to skip (`.git`, `node_modules` and dot-folders
    /// are always skipped)
    pub ignore_dirs: Vec<String>,

    /// Maximum depth below the root to look for projects
    pub max_depth: usize,
}

/// tmux settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TmuxSettings {
    /// Status bar color used by `--color` when the session has none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_color: Option<String>,

    /// Colors picked from (by session name) when nothing else is set
    pub palette: Vec<String>,
}

impl Settings {
    /// Load settings from the default location.
    ///
    /// Looks for settings in:
    /// 1. `.run.toml` in the current directory
    /// 2. `~/.config/metarun/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let local = PathBuf::from(LOCAL_SETTINGS_FILE);
        if local.exists() {
            return Self::load_from_file(&local);
        }

        if let Some(path) = Self::config_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load settings from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        Ok(settings)
    }

    /// Get the settings directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("metarun"))
    }

    /// Get the global settings file path.
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("config.toml"))
    }
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self { shell: None, log_level: "warn".to_string() }
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self { ignore_dirs: Vec::new(), max_depth: 8 }
    }
}

impl Default for TmuxSettings {
    fn default() -> Self {
        Self {
            default_color: None,
            palette: ["colour24", "colour28", "colour54", "colour94", "colour124", "colour130"]
                .iter()
                .map(|c| (*c).to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.general.shell.is_none());
        assert_eq!(settings.general.log_level, "warn");
        assert_eq!(settings.discovery.max_depth, 8);
        assert!(settings.discovery.ignore_dirs.is_empty());
        assert!(!settings.tmux.palette.is_empty());
    }

    #[test]
    fn test_settings_serialization() {
        let toml_str = toml::to_string(&Settings::default()).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[discovery]"));
        assert!(toml_str.contains("[tmux]"));
    }

    #[test]
    fn test_settings_deserialization() {
        let toml_str = r#"
            [general]
            shell = "bash"

            [discovery]
            ignore_dirs = ["vendor"]
            max_depth = 3

            [tmux]
            default_color = "colour33"
        "#;

        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.general.shell.as_deref(), Some("bash"));
        assert_eq!(settings.general.log_level, "warn");
        assert_eq!(settings.discovery.ignore_dirs, vec!["vendor"]);
        assert_eq!(settings.discovery.max_depth, 3);
        assert_eq!(settings.tmux.default_color.as_deref(), Some("colour33"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(LOCAL_SETTINGS_FILE);
        std::fs::write(&path, "[general]\nlog_level = \"info\"\n").unwrap();

        let settings = Settings::load_from_file(&path).unwrap();
        assert_eq!(settings.general.log_level, "info");
    }

    #[test]
    fn test_load_from_invalid_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(LOCAL_SETTINGS_FILE);
        std::fs::write(&path, "[general\n").unwrap();

        assert!(Settings::load_from_file(&path).is_err());
    }
}
