// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Writes a commented skiff.yml template.

use std::path::Path;

use crate::error::{Error, Result};

use super::{CONFIG_FILENAME, Config};

/// Write a template `skiff.yml` into `dir`.
///
/// The project name defaults to the directory name. An existing file is only
/// replaced with `force`.
pub fn init_config(dir: &Path, project: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let project = match project {
        Some(project) => project.to_string(),
        None => default_project(dir),
    };

    let yaml = generate_template_yaml(&project);
    // The template must stay loadable.
    Config::from_yaml(&yaml)?;
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn default_project(dir: &Path) -> String {
    let name: String = dir
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let name = name.trim_matches('-');
    if name.is_empty() {
        "app".to_string()
    } else {
        name.to_string()
    }
}

fn generate_template_yaml(project: &str) -> String {
    format!(
        r#"project: {project}
server: deploy@server.example.com
# directory: /opt/skiff/{project}

services:
  web:
    build: .
    domains: [{project}.example.com]
    port: 3000
    healthcheck:
      cmd: "curl -fsS http://localhost:3000/up"
      path: /up
    # depends_on: {{db: healthy}}
    # env:
    #   SECRET_KEY: {{env: SECRET_KEY}}
    # strategy: auto   # auto | rollout | recreate
"#
    )
}
