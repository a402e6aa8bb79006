//! Placeholder substitution for `meta.json` documents.
//!
//! Two placeholder forms are supported inside any string value:
//!
//! - `${NAME}` / `${NAME:-fallback}`: an environment variable
//! - `${this.path.to.value}`: another value of the same document
//!
//! Environment placeholders are substituted first, so self references see
//! already-substituted values. Unknown placeholders are left untouched.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use super::lookup;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"));

const SELF_PREFIX: &str = "this.";

/// Upper bound on self-reference passes (chains like a -> b -> c).
const MAX_PASSES: usize = 8;

/// Variables available to `${NAME}` placeholders.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: HashMap<String, String>,
}

impl Variables {
    /// Create an empty set of variables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables from the process environment.
    pub fn from_env() -> Self {
        std::env::vars().collect()
    }

    /// Variables for a project: its `.env` file overlaid by the process
    /// environment.
    pub fn for_project(dir: &Path) -> Self {
        let mut values = HashMap::new();

        let env_file = dir.join(".env");
        if env_file.is_file() {
            match dotenvy::from_path_iter(&env_file) {
                Ok(iter) => {
                    for item in iter {
                        match item {
                            Ok((key, value)) => {
                                values.insert(key, value);
                            }
                            Err(e) => {
                                tracing::warn!(path = %env_file.display(), error = %e, "Skipping .env line");
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %env_file.display(), error = %e, "Failed to read .env");
                }
            }
        }

        values.extend(std::env::vars());
        Self { values }
    }

    /// Set a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builder form of [`Variables::set`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Look up a variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

impl FromIterator<(String, String)> for Variables {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self { values: iter.into_iter().collect() }
    }
}

/// Substitute every placeholder in `document`, returning the resolved copy.
pub fn resolve_templates(document: &Value, vars: &Variables) -> Value {
    let mut resolved = document.clone();
    substitute_env_in(&mut resolved, vars);

    for pass in 0..MAX_PASSES {
        let snapshot = resolved.clone();
        if !substitute_self_in(&mut resolved, &snapshot) {
            break;
        }
        if pass + 1 == MAX_PASSES {
            tracing::debug!("Self references still changing after {MAX_PASSES} passes");
        }
    }

    resolved
}

fn substitute_env_in(value: &mut Value, vars: &Variables) {
    match value {
        Value::String(s) => {
            if s.contains("${") {
                *s = substitute_env(s, vars);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| substitute_env_in(v, vars)),
        Value::Object(map) => map.values_mut().for_each(|v| substitute_env_in(v, vars)),
        _ => {}
    }
}

/// Replace `${NAME}` and `${NAME:-fallback}` in a single string.
pub fn substitute_env(input: &str, vars: &Variables) -> String {
    PLACEHOLDER
        .replace_all(input, |caps: &Captures<'_>| {
            let expr = &caps[1];
            if expr.starts_with(SELF_PREFIX) {
                return caps[0].to_string();
            }

            let (name, fallback) = match expr.split_once(":-") {
                Some((name, fallback)) => (name, Some(fallback)),
                None => (expr, None),
            };

            match (vars.get(name).filter(|v| !v.is_empty()), fallback) {
                (Some(value), _) => value.to_string(),
                (None, Some(fallback)) => fallback.to_string(),
                (None, None) => {
                    tracing::debug!(variable = name, "Unset variable left in place");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// One pass of `${this.*}` substitution. Returns whether anything changed.
fn substitute_self_in(value: &mut Value, root: &Value) -> bool {
    match value {
        Value::String(s) => {
            if !s.contains("${this.") {
                return false;
            }

            // A string that is exactly one reference takes the referenced
            // value as-is, keeping numbers, booleans and objects typed.
            if let Some(path) = whole_reference(s) {
                if let Some(target) = lookup(root, path) {
                    if !target.is_string() {
                        *value = target.clone();
                        return true;
                    }
                }
            }

            let replaced = PLACEHOLDER
                .replace_all(s, |caps: &Captures<'_>| {
                    let Some(path) = caps[1].strip_prefix(SELF_PREFIX) else {
                        return caps[0].to_string();
                    };
                    lookup(root, path).map_or_else(|| caps[0].to_string(), render)
                })
                .into_owned();

            if replaced == *s {
                false
            } else {
                *s = replaced;
                true
            }
        }
        Value::Array(items) => {
            items.iter_mut().fold(false, |changed, v| substitute_self_in(v, root) | changed)
        }
        Value::Object(map) => {
            map.values_mut().fold(false, |changed, v| substitute_self_in(v, root) | changed)
        }
        _ => false,
    }
}

fn whole_reference(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("${")?.strip_suffix('}')?;
    if inner.contains('}') {
        return None;
    }
    inner.strip_prefix(SELF_PREFIX)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
