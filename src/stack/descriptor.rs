// ABOUTME: Service descriptor types: image source, routing, dependencies, health.
// ABOUTME: Every field is validated upstream; the core never re-checks shell safety.

use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::RestartPolicy;
use crate::types::{ImageName, ServiceName};

/// Where a service's image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Built on the remote host from a local build context.
    Build {
        context: PathBuf,
        /// Dockerfile path relative to the context.
        dockerfile: String,
        target: Option<String>,
    },
    /// Externally owned image, pulled as-is and never tagged by skiff.
    Prebuilt(String),
}

/// Reverse-proxy routing for a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routing {
    pub domains: NonEmpty<String>,
    /// Member of `domains` the others redirect to.
    pub redirect_to: Option<String>,
    /// Path prefix; `None` routes every path.
    pub path: Option<String>,
    pub https: bool,
    /// Container port the proxy forwards to.
    pub port: u16,
}

/// When a dependency counts as ready for its dependent to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitCondition {
    /// The container is running.
    #[default]
    Started,
    /// The container reports healthy.
    Healthy,
    /// The container ran to completion with exit status 0.
    Completed,
}

impl WaitCondition {
    /// Compose `depends_on` condition for this wait.
    pub fn compose_condition(self) -> &'static str {
        match self {
            WaitCondition::Started => "service_started",
            WaitCondition::Healthy => "service_healthy",
            WaitCondition::Completed => "service_completed_successfully",
        }
    }
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitCondition::Started => write!(f, "started"),
            WaitCondition::Healthy => write!(f, "healthy"),
            WaitCondition::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub service: ServiceName,
    pub condition: WaitCondition,
}

/// Container health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSpec {
    /// Shell command run inside the container.
    pub command: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
    /// HTTP path the proxy probes on the primary, if any.
    pub path: Option<String>,
}

/// A `source:target[:ro]` mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl VolumeMount {
    /// Parse `source:target` or `source:target:ro|rw`.
    pub fn parse(spec: &str) -> Option<Self> {
        let parts: Vec<&str> = spec.split(':').collect();
        let (source, target, read_only) = match parts.as_slice() {
            [source, target] => (*source, *target, false),
            [source, target, "ro"] => (*source, *target, true),
            [source, target, "rw"] => (*source, *target, false),
            _ => return None,
        };
        if source.is_empty() || !target.starts_with('/') {
            return None;
        }
        Some(Self {
            source: source.to_string(),
            target: target.to_string(),
            read_only,
        })
    }

    /// Named volumes are declared at the manifest's top level; bind mounts are not.
    pub fn is_named(&self) -> bool {
        !self.source.starts_with('/') && !self.source.starts_with('.') && !self.source.starts_with('~')
    }
}

impl fmt::Display for VolumeMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.target)?;
        if self.read_only {
            write!(f, ":ro")?;
        }
        Ok(())
    }
}

/// Per-service deploy strategy preference from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyPreference {
    /// Canary when eligible, direct start otherwise.
    #[default]
    Auto,
    /// Always canary, even without a running primary.
    Rollout,
    /// Always a direct recreate.
    Recreate,
}

/// One service, fully resolved.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub name: ServiceName,
    pub project: String,
    /// Target directory on the remote host.
    pub directory: String,
    pub image_prefix: String,
    pub source: ImageSource,
    pub routing: Option<Routing>,
    pub depends_on: Vec<Dependency>,
    pub volumes: Vec<VolumeMount>,
    pub healthcheck: Option<HealthSpec>,
    pub env: BTreeMap<String, String>,
    pub restart: RestartPolicy,
    pub strategy: StrategyPreference,
}

impl ServiceDescriptor {
    /// Minimal descriptor for a pre-built image with no routing.
    pub fn prebuilt(
        name: ServiceName,
        project: impl Into<String>,
        directory: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            name,
            project: project.into(),
            directory: directory.into(),
            image_prefix: "skiff".to_string(),
            source: ImageSource::Prebuilt(image.into()),
            routing: None,
            depends_on: Vec::new(),
            volumes: Vec::new(),
            healthcheck: None,
            env: BTreeMap::new(),
            restart: RestartPolicy::default(),
            strategy: StrategyPreference::default(),
        }
    }

    /// Minimal descriptor built from a local context with a `Dockerfile`.
    pub fn built(
        name: ServiceName,
        project: impl Into<String>,
        directory: impl Into<String>,
        context: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: ImageSource::Build {
                context: context.into(),
                dockerfile: "Dockerfile".to_string(),
                target: None,
            },
            ..Self::prebuilt(name, project, directory, String::new())
        }
    }

    /// Untagged name of the image skiff builds for this service.
    pub fn image_name(&self) -> ImageName {
        ImageName::new(&self.image_prefix, &self.project, &self.name)
    }

    pub fn is_prebuilt(&self) -> bool {
        matches!(self.source, ImageSource::Prebuilt(_))
    }

    pub fn manifest_path(&self) -> String {
        format!("{}/{}", self.directory, super::MANIFEST_FILENAME)
    }

    /// Name used for the proxy router and service of this service.
    pub fn route_name(&self) -> String {
        format!("{}-{}", self.project, self.name)
    }

    /// Public URL of the first routed domain.
    pub fn url(&self) -> Option<String> {
        self.routing.as_ref().map(|routing| {
            let scheme = if routing.https { "https" } else { "http" };
            let host = routing.redirect_to.as_ref().unwrap_or(routing.domains.first());
            format!("{}://{}{}", scheme, host, routing.path.as_deref().unwrap_or(""))
        })
    }
}
