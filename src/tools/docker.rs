//! `docker build` and `docker compose` from the `docker` and `compose`
//! sections.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::CommandSpec;
use crate::meta::ProjectConfig;

/// Compose files looked for when `compose.file` is not set.
const COMPOSE_FILES: &[&str] = &["docker-compose.yml", "docker-compose.yaml", "compose.yaml", "compose.yml"];

/// The `docker` section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DockerSection {
    /// Image name, defaults to the project name
    #[serde(default)]
    pub image: Option<String>,

    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,

    /// Build context, relative to the project directory
    #[serde(default = "default_context")]
    pub context: String,

    #[serde(default)]
    pub build_args: BTreeMap<String, String>,

    #[serde(default)]
    pub platform: Option<String>,
}

impl Default for DockerSection {
    fn default() -> Self {
        Self {
            image: None,
            dockerfile: default_dockerfile(),
            context: default_context(),
            build_args: BTreeMap::new(),
            platform: None,
        }
    }
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

fn default_context() -> String {
    ".".to_string()
}

/// The `compose` section.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComposeSection {
    #[serde(default)]
    pub file: Option<String>,

    /// Compose project name, defaults to the project name
    #[serde(default)]
    pub project: Option<String>,

    #[serde(default)]
    pub env_file: Option<String>,
}

/// Options for `run docker build`.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub tag: Option<String>,
    pub push: bool,
}

/// A compose subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeAction {
    Up { detach: bool },
    Down,
    Logs { follow: bool },
    Ps,
}

/// Image reference for a build: `image:tag`.
pub fn image_reference(project: &ProjectConfig, section: &DockerSection, tag: Option<&str>) -> String {
    let image = section.image.clone().unwrap_or_else(|| project.name().to_string());
    let has_tag = image.rsplit('/').next().is_some_and(|last| last.contains(':'));

    match tag {
        Some(tag) => {
            let base = if has_tag { image.rsplit_once(':').map_or(image.as_str(), |(b, _)| b) } else { &image };
            format!("{base}:{tag}")
        }
        None if has_tag => image,
        None => format!("{image}:latest"),
    }
}

/// `docker build` (and `docker push`) for the project.
pub fn build_commands(project: &ProjectConfig, section: &DockerSection, options: &BuildOptions) -> Vec<CommandSpec> {
    let reference = image_reference(project, section, options.tag.as_deref());

    let mut build = CommandSpec::new("docker")
        .args(["build", "-f", section.dockerfile.as_str(), "-t", reference.as_str()])
        .cwd(project.dir());
    if let Some(platform) = &section.platform {
        build = build.args(["--platform", platform.as_str()]);
    }
    for (key, value) in &section.build_args {
        build = build.arg("--build-arg").arg(format!("{key}={value}"));
    }
    build = build.arg(section.context.as_str());

    let mut commands = vec![build];
    if options.push {
        commands.push(CommandSpec::new("docker").args(["push", reference.as_str()]).cwd(project.dir()));
    }
    commands
}

/// Find the compose file in `dir`.
pub fn find_compose_file(dir: &Path) -> Option<PathBuf> {
    COMPOSE_FILES.iter().map(|name| dir.join(name)).find(|path| path.is_file())
}

/// `docker compose` for the project.
pub fn compose_command(
    project: &ProjectConfig,
    section: &ComposeSection,
    action: &ComposeAction,
    services: &[String],
) -> CommandSpec {
    let file = section
        .file
        .clone()
        .or_else(|| {
            find_compose_file(project.dir())
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        })
        .unwrap_or_else(|| COMPOSE_FILES[0].to_string());
    let name = section.project.clone().unwrap_or_else(|| project.name().to_string());

    let mut spec = CommandSpec::new("docker").args(["compose", "-f", file.as_str(), "-p", name.as_str()]);
    if let Some(env_file) = &section.env_file {
        spec = spec.args(["--env-file", env_file.as_str()]);
    }

    spec = match action {
        ComposeAction::Up { detach } => {
            let spec = spec.arg("up");
            if *detach {
                spec.arg("-d")
            } else {
                spec
            }
        }
        ComposeAction::Down => spec.arg("down"),
        ComposeAction::Logs { follow } => {
            let spec = spec.arg("logs");
            if *follow {
                spec.arg("-f")
            } else {
                spec
            }
        }
        ComposeAction::Ps => spec.arg("ps"),
    };

    spec.args(services.iter().map(String::as_str)).cwd(project.dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Variables;
    use serde_json::json;
    use tempfile::TempDir;

    fn project(dir: &Path, doc: serde_json::Value) -> ProjectConfig {
        ProjectConfig::from_value(dir, doc, &Variables::new())
    }

    #[test]
    fn test_image_reference() {
        let p = project(Path::new("/src/api"), json!({"name": "api"}));
        let mut section = DockerSection::default();
        assert_eq!(image_reference(&p, &section, None), "api:latest");
        assert_eq!(image_reference(&p, &section, Some("v2")), "api:v2");

        section.image = Some("registry.local:5000/team/api:1.0".into());
        assert_eq!(image_reference(&p, &section, None), "registry.local:5000/team/api:1.0");
        assert_eq!(image_reference(&p, &section, Some("2.0")), "registry.local:5000/team/api:2.0");

        section.image = Some("registry.local:5000/team/api".into());
        assert_eq!(image_reference(&p, &section, None), "registry.local:5000/team/api:latest");
    }

    #[test]
    fn test_build_commands() {
        let p = project(
            Path::new("/src/api"),
            json!({"name": "api", "docker": {"image": "acme/api", "dockerfile": "docker/Dockerfile",
                   "buildArgs": {"PROFILE": "release"}, "platform": "linux/amd64"}}),
        );
        let section: DockerSection = p.require_section("docker").unwrap();
        let commands = build_commands(&p, &section, &BuildOptions { tag: Some("v1".into()), push: true });

        assert_eq!(
            commands.iter().map(CommandSpec::display).collect::<Vec<_>>(),
            vec![
                "docker build -f docker/Dockerfile -t acme/api:v1 --platform linux/amd64 --build-arg PROFILE=release .",
                "docker push acme/api:v1",
            ]
        );
        assert_eq!(commands[0].cwd.as_deref(), Some(Path::new("/src/api")));
    }

    #[test]
    fn test_compose_command_finds_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("compose.yaml"), "services: {}\n").unwrap();
        let p = project(temp.path(), json!({"name": "shop"}));

        let spec = compose_command(&p, &ComposeSection::default(), &ComposeAction::Up { detach: true }, &[]);
        assert_eq!(spec.display(), "docker compose -f compose.yaml -p shop up -d");
    }

    #[test]
    fn test_compose_command_with_section() {
        let p = project(Path::new("/src/shop"), json!({"name": "shop"}));
        let section = ComposeSection {
            file: Some("deploy/compose.yml".into()),
            project: Some("shop-dev".into()),
            env_file: Some(".env.dev".into()),
        };

        let spec = compose_command(&p, &section, &ComposeAction::Logs { follow: true }, &["api".to_string()]);
        assert_eq!(
            spec.display(),
            "docker compose -f deploy/compose.yml -p shop-dev --env-file .env.dev logs -f api"
        );
    }
}
