//! Execution context threaded through routine execution.
//!
//! The working directory and extra environment are plain values: a
//! `sequence` carries one context forward from step to step, while each
//! `parallel` branch gets its own fork. Nothing here touches the process-wide
//! current directory.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Working directory and environment for a branch of execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Directory commands run in
    cwd: PathBuf,

    /// Variables added on top of the inherited environment
    env: BTreeMap<String, String>,
}

impl ExecutionContext {
    /// Create a context rooted at `cwd`.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into(), env: BTreeMap::new() }
    }

    /// Create a context for the process's current directory.
    pub fn current() -> io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// The extra environment.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// An independent copy for a concurrent branch.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// An independent copy whose working directory is `dir`.
    pub fn fork_in(&self, dir: &Path) -> Self {
        Self { cwd: self.cwd.join(dir), env: self.env.clone() }
    }

    /// Expand `~` and `$VAR`/`${VAR}` in `input`. Variables come from the
    /// extra environment first, then the process environment. An unset
    /// variable is an error.
    pub fn expand(&self, input: &str) -> io::Result<String> {
        let home = || dirs::home_dir().map(|p| p.to_string_lossy().into_owned());
        let lookup = |var: &str| match self.env.get(var) {
            Some(value) => Ok(Some(value.clone())),
            None => std::env::var(var).map(Some),
        };

        shellexpand::full_with_context(input, home, lookup)
            .map(|expanded| expanded.into_owned())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
    }

    /// Apply a `cd <target>`. `target` is taken literally, relative
    /// targets resolve against the current context directory. The target
    /// must exist.
    pub fn change_dir(&mut self, target: impl AsRef<Path>) -> io::Result<&Path> {
        let candidate = self.cwd.join(target);

        if !candidate.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", candidate.display()),
            ));
        }

        self.cwd = candidate;
        Ok(&self.cwd)
    }
}

/// Resolve an optional relative path against `base`, expanding `~`.
pub fn resolve_path(base: &Path, path: Option<&str>) -> PathBuf {
    match path.map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) => base.join(&*shellexpand::tilde(path)),
        None => base.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_change_dir_relative() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("api")).unwrap();

        let mut ctx = ExecutionContext::new(temp.path());
        ctx.change_dir("api").unwrap();

        assert_eq!(ctx.cwd(), temp.path().join("api"));
    }

    #[test]
    fn test_change_dir_absolute() {
        let temp = TempDir::new().unwrap();
        let mut ctx = ExecutionContext::new("/");
        ctx.change_dir(temp.path()).unwrap();

        assert_eq!(ctx.cwd(), temp.path());
    }

    #[test]
    fn test_change_dir_missing_keeps_cwd() {
        let temp = TempDir::new().unwrap();
        let mut ctx = ExecutionContext::new(temp.path());

        let err = ctx.change_dir("does-not-exist").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(ctx.cwd(), temp.path());
    }

    #[test]
    fn test_change_dir_keeps_spaces() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("my app")).unwrap();

        let mut ctx = ExecutionContext::new(temp.path());
        ctx.change_dir("my app").unwrap();
        assert_eq!(ctx.cwd(), temp.path().join("my app"));
    }

    #[test]
    fn test_expand_prefers_context_env() {
        let ctx = ExecutionContext::new("/").with_env("RUN_TEST_APP_DIR", "services/api");
        assert_eq!(ctx.expand("$RUN_TEST_APP_DIR/src").unwrap(), "services/api/src");
        assert_eq!(ctx.expand("${RUN_TEST_APP_DIR}").unwrap(), "services/api");
    }

    #[test]
    fn test_expand_unset_variable_fails() {
        let ctx = ExecutionContext::new("/");
        let err = ctx.expand("$RUN_TEST_SURELY_UNSET_VAR/app").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("RUN_TEST_SURELY_UNSET_VAR"));
    }

    #[test]
    fn test_fork_is_independent() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("web")).unwrap();

        let parent = ExecutionContext::new(temp.path()).with_env("ENV", "dev");
        let mut child = parent.fork();
        child.change_dir("web").unwrap();

        assert_eq!(parent.cwd(), temp.path());
        assert_eq!(child.cwd(), temp.path().join("web"));
        assert_eq!(child.env().get("ENV").map(String::as_str), Some("dev"));
    }

    #[test]
    fn test_fork_in_absolute_dir() {
        let parent = ExecutionContext::new("/somewhere");
        let child = parent.fork_in(Path::new("/projects/api"));
        assert_eq!(child.cwd(), Path::new("/projects/api"));
    }

    #[test]
    fn test_resolve_path() {
        assert_eq!(resolve_path(Path::new("/a"), None), PathBuf::from("/a"));
        assert_eq!(resolve_path(Path::new("/a"), Some(" ")), PathBuf::from("/a"));
        assert_eq!(resolve_path(Path::new("/a"), Some("b")), PathBuf::from("/a/b"));
        assert_eq!(resolve_path(Path::new("/a"), Some("/abs")), PathBuf::from("/abs"));
    }
}
