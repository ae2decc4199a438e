// ABOUTME: Configuration types and parsing for skiff.yml.
// ABOUTME: Handles YAML parsing, validation, env var interpolation, and stack resolution.

mod env_value;
mod healthcheck;
mod init;
mod restart_policy;
mod server;
mod service;
mod validate;

pub use env_value::{EnvValue, resolve_env_map};
pub use healthcheck::HealthcheckConfig;
pub use init::init_config;
pub use restart_policy::RestartPolicy;
pub use server::ServerConfig;
pub use service::{BuildEntry, DependsOn, ServiceConfig};

use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::stack::{
    Dependency, ImageSource, Routing, ServiceDescriptor, Stack, VolumeMount,
};
use crate::types::ServiceName;
use server::ServerEntry;

pub const CONFIG_FILENAME: &str = "skiff.yml";
pub const CONFIG_FILENAME_ALT: &str = "skiff.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".skiff/config.yml";

/// Parent of per-project target directories when none is configured.
pub const DEFAULT_DIRECTORY_ROOT: &str = "/opt/skiff";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub project: String,

    #[serde(deserialize_with = "deserialize_server")]
    pub server: ServerConfig,

    /// Target directory on the server; defaults to `/opt/skiff/<project>`.
    #[serde(default)]
    pub directory: Option<String>,

    #[serde(default = "default_image_prefix")]
    pub image_prefix: String,

    pub services: BTreeMap<String, ServiceConfig>,
}

fn default_image_prefix() -> String {
    "skiff".to_string()
}

impl Config {
    /// Parse and validate configuration text.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load the first config file found in `dir`.
    pub fn discover(dir: &Path) -> Result<Self> {
        Self::find(dir)
            .ok_or_else(|| Error::ConfigNotFound(dir.to_path_buf()))
            .and_then(|path| Self::load(&path))
    }

    /// Path of the first config file present in `dir`.
    pub fn find(dir: &Path) -> Option<std::path::PathBuf> {
        [CONFIG_FILENAME, CONFIG_FILENAME_ALT, CONFIG_FILENAME_DIR]
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    /// Check everything the deploy core relies on without re-checking.
    pub fn validate(&self) -> Result<()> {
        validate::validate(self)
    }

    /// Target directory on the server.
    pub fn directory(&self) -> String {
        self.directory
            .clone()
            .unwrap_or_else(|| format!("{}/{}", DEFAULT_DIRECTORY_ROOT, self.project))
    }

    /// Resolve every service into descriptors for the deploy core.
    ///
    /// Relative build contexts are resolved against `base_dir`, normally the
    /// directory holding the config file. `{env: VAR}` values are read from
    /// the local environment now.
    pub fn into_stack(&self, base_dir: &Path) -> Result<Stack> {
        self.validate()?;
        let directory = self.directory();

        let services = self
            .services
            .iter()
            .map(|(name, service)| self.descriptor(name, service, &directory, base_dir))
            .collect::<Result<Vec<_>>>()?;

        Ok(Stack::new(&self.project, directory, services))
    }

    fn descriptor(
        &self,
        name: &str,
        service: &ServiceConfig,
        directory: &str,
        base_dir: &Path,
    ) -> Result<ServiceDescriptor> {
        let name = ServiceName::new(name).map_err(|e| Error::InvalidConfig(e.to_string()))?;

        let source = match (&service.build, &service.image) {
            (Some(build), _) => ImageSource::Build {
                context: base_dir.join(build.context()),
                dockerfile: build.dockerfile().to_string(),
                target: build.target().map(str::to_string),
            },
            (None, Some(image)) => ImageSource::Prebuilt(image.clone()),
            (None, None) => {
                return Err(Error::InvalidConfig(format!(
                    "service `{name}` has no image source"
                )));
            }
        };

        let routing = match (NonEmpty::from_vec(service.domains.clone()), service.port) {
            (Some(domains), Some(port)) => Some(Routing {
                domains,
                redirect_to: service.redirect_to.clone(),
                path: service.path.clone(),
                https: service.https,
                port,
            }),
            _ => None,
        };

        let depends_on = service
            .depends_on
            .entries()
            .into_iter()
            .map(|(dependency, condition)| {
                ServiceName::new(dependency)
                    .map(|service| Dependency { service, condition })
                    .map_err(|e| Error::InvalidConfig(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let volumes = service
            .volumes
            .iter()
            .map(|volume| {
                VolumeMount::parse(volume)
                    .ok_or_else(|| Error::InvalidConfig(format!("invalid volume `{volume}`")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ServiceDescriptor {
            name,
            project: self.project.clone(),
            directory: directory.to_string(),
            image_prefix: self.image_prefix.clone(),
            source,
            routing,
            depends_on,
            volumes,
            healthcheck: service.healthcheck.as_ref().map(HealthcheckConfig::to_spec),
            env: resolve_env_map(&service.env)?,
            restart: service.restart.clone(),
            strategy: service.strategy,
        })
    }
}

fn deserialize_server<'de, D>(deserializer: D) -> std::result::Result<ServerConfig, D::Error>
where
    D: serde::Deserializer<'de>,
{
    ServerEntry::deserialize(deserializer)?
        .into_server_config()
        .map_err(serde::de::Error::custom)
}
