//! `terraform` from the `terraform` section.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::core::{resolve_path, CommandSpec};
use crate::meta::ProjectConfig;

/// The `terraform` section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TerraformSection {
    /// Configuration directory, relative to the project directory
    #[serde(default = "default_dir")]
    pub dir: String,

    #[serde(default)]
    pub var_file: Option<String>,

    /// Workspace, defaults to `$ENV`
    #[serde(default)]
    pub workspace: Option<String>,

    #[serde(default)]
    pub backend_config: BTreeMap<String, String>,

    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

impl Default for TerraformSection {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            var_file: None,
            workspace: None,
            backend_config: BTreeMap::new(),
            vars: BTreeMap::new(),
        }
    }
}

fn default_dir() -> String {
    "terraform".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerraformAction {
    Init,
    Plan,
    Apply,
    Destroy,
    Output,
}

impl TerraformAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
            Self::Output => "output",
        }
    }

    fn takes_vars(self) -> bool {
        matches!(self, Self::Plan | Self::Apply | Self::Destroy)
    }
}

/// Commands for `action`: workspace selection (except for `init`) followed
/// by the action itself. `env` is the fallback workspace.
pub fn terraform_commands(
    project: &ProjectConfig,
    section: &TerraformSection,
    action: TerraformAction,
    auto_approve: bool,
    env: Option<&str>,
) -> Vec<CommandSpec> {
    let dir = resolve_path(project.dir(), Some(section.dir.as_str()));
    let chdir = format!("-chdir={}", dir.display());
    let base = || CommandSpec::new("terraform").arg(chdir.as_str()).cwd(project.dir());

    let mut commands = Vec::new();

    let workspace = section
        .workspace
        .as_deref()
        .or(env)
        .map(str::trim)
        .filter(|w| !w.is_empty());
    if action != TerraformAction::Init {
        if let Some(workspace) = workspace {
            commands.push(base().args(["workspace", "select", "-or-create", workspace]));
        }
    }

    let mut spec = base().arg(action.as_str());
    match action {
        TerraformAction::Init => {
            for (key, value) in &section.backend_config {
                spec = spec.arg(format!("-backend-config={key}={value}"));
            }
        }
        _ if action.takes_vars() => {
            if let Some(var_file) = &section.var_file {
                spec = spec.arg(format!("-var-file={var_file}"));
            }
            for (key, value) in &section.vars {
                spec = spec.arg("-var").arg(format!("{key}={value}"));
            }
            if auto_approve && action != TerraformAction::Plan {
                spec = spec.arg("-auto-approve");
            }
        }
        _ => {}
    }
    commands.push(spec);

    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Variables;
    use serde_json::json;
    use std::path::Path;

    fn project(doc: serde_json::Value) -> ProjectConfig {
        ProjectConfig::from_value(Path::new("/src/infra"), doc, &Variables::new())
    }

    fn displays(commands: &[CommandSpec]) -> Vec<String> {
        commands.iter().map(CommandSpec::display).collect()
    }

    #[test]
    fn test_init_uses_backend_config_and_no_workspace() {
        let p = project(json!({"terraform": {"backendConfig": {"bucket": "state"}}}));
        let section: TerraformSection = p.require_section("terraform").unwrap();

        let commands = terraform_commands(&p, &section, TerraformAction::Init, false, Some("dev"));
        assert_eq!(
            displays(&commands),
            vec!["terraform -chdir=/src/infra/terraform init -backend-config=bucket=state"]
        );
    }

    #[test]
    fn test_apply_selects_env_workspace() {
        let p = project(json!({"terraform": {"dir": "tf", "varFile": "dev.tfvars", "vars": {"region": "eu"}}}));
        let section: TerraformSection = p.require_section("terraform").unwrap();

        let commands = terraform_commands(&p, &section, TerraformAction::Apply, true, Some("staging"));
        assert_eq!(
            displays(&commands),
            vec![
                "terraform -chdir=/src/infra/tf workspace select -or-create staging",
                "terraform -chdir=/src/infra/tf apply -var-file=dev.tfvars -var region=eu -auto-approve",
            ]
        );
    }

    #[test]
    fn test_configured_workspace_wins_and_plan_ignores_auto_approve() {
        let section = TerraformSection { workspace: Some("prod".into()), ..TerraformSection::default() };
        let commands = terraform_commands(&project(json!({})), &section, TerraformAction::Plan, true, Some("dev"));
        assert_eq!(
            displays(&commands),
            vec![
                "terraform -chdir=/src/infra/terraform workspace select -or-create prod",
                "terraform -chdir=/src/infra/terraform plan",
            ]
        );
    }

    #[test]
    fn test_output_without_workspace() {
        let commands =
            terraform_commands(&project(json!({})), &TerraformSection::default(), TerraformAction::Output, false, None);
        assert_eq!(displays(&commands), vec!["terraform -chdir=/src/infra/terraform output"]);
    }
}
