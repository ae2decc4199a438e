// ABOUTME: Per-service section of skiff.yml.
// ABOUTME: Image source, routing, dependencies, volumes, environment, and health check.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{EnvValue, HealthcheckConfig, RestartPolicy};
use crate::stack::{StrategyPreference, WaitCondition};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Build from local source. Exclusive with `image`.
    #[serde(default)]
    pub build: Option<BuildEntry>,

    /// Pre-built image pulled as named. Exclusive with `build`.
    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub domains: Vec<String>,

    #[serde(default)]
    pub redirect_to: Option<String>,

    #[serde(default)]
    pub path: Option<String>,

    #[serde(default = "default_https")]
    pub https: bool,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub depends_on: DependsOn,

    #[serde(default)]
    pub volumes: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,

    #[serde(default)]
    pub restart: RestartPolicy,

    #[serde(default)]
    pub healthcheck: Option<HealthcheckConfig>,

    #[serde(default)]
    pub strategy: StrategyPreference,
}

fn default_https() -> bool {
    true
}

/// `build: ./web` or `build: {context, dockerfile, target}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BuildEntry {
    Context(PathBuf),
    Detailed {
        #[serde(default = "default_context")]
        context: PathBuf,
        #[serde(default = "default_dockerfile")]
        dockerfile: String,
        #[serde(default)]
        target: Option<String>,
    },
}

fn default_context() -> PathBuf {
    PathBuf::from(".")
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

impl BuildEntry {
    pub fn context(&self) -> &PathBuf {
        match self {
            BuildEntry::Context(context) | BuildEntry::Detailed { context, .. } => context,
        }
    }

    pub fn dockerfile(&self) -> &str {
        match self {
            BuildEntry::Context(_) => "Dockerfile",
            BuildEntry::Detailed { dockerfile, .. } => dockerfile,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            BuildEntry::Context(_) => None,
            BuildEntry::Detailed { target, .. } => target.as_deref(),
        }
    }
}

/// `depends_on: [db]` waits for `started`; the map form names the condition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DependsOn {
    List(Vec<String>),
    Map(BTreeMap<String, WaitCondition>),
}

impl Default for DependsOn {
    fn default() -> Self {
        DependsOn::List(Vec::new())
    }
}

impl DependsOn {
    /// Dependencies with their wait conditions, in declaration order for lists
    /// and name order for maps.
    pub fn entries(&self) -> Vec<(&str, WaitCondition)> {
        match self {
            DependsOn::List(names) => names
                .iter()
                .map(|name| (name.as_str(), WaitCondition::Started))
                .collect(),
            DependsOn::Map(map) => map
                .iter()
                .map(|(name, condition)| (name.as_str(), *condition))
                .collect(),
        }
    }
}
