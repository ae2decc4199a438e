// ABOUTME: Compose manifest editor: parse, inspect, edit, and re-render.
// ABOUTME: Entries the caller does not touch survive a round trip unchanged.

mod entry;
mod error;
mod labels;

pub use entry::{EntryRole, ServiceEntry};
pub use error::ManifestError;
pub use labels::{CERT_RESOLVER, PROXY_NETWORK, routing_labels};

use serde_yaml::{Mapping, Value};
use std::time::Duration;

use crate::stack::Stack;

/// The compose document describing every service in a target directory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManifestDocument {
    root: Mapping,
}

impl ManifestDocument {
    /// A fresh manifest for `project`.
    pub fn new(project: &str) -> Self {
        let mut root = Mapping::new();
        root.insert("name".into(), project.into());
        root.insert("services".into(), Value::Mapping(Mapping::new()));
        Self { root }
    }

    /// Parse manifest text. Blank text is an empty manifest.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        let root = match serde_yaml::from_str::<Value>(text)? {
            Value::Mapping(root) => root,
            Value::Null => Mapping::new(),
            _ => return Err(ManifestError::NotAMapping),
        };

        match root.get("services") {
            None | Some(Value::Null) => {}
            Some(Value::Mapping(services)) => {
                for (name, entry) in services {
                    if !entry.is_mapping() {
                        return Err(ManifestError::ServiceNotAMapping {
                            service: display_key(name),
                        });
                    }
                }
            }
            Some(_) => return Err(ManifestError::ServicesNotAMapping),
        }

        Ok(Self { root })
    }

    pub fn render(&self) -> Result<String, ManifestError> {
        Ok(serde_yaml::to_string(&Value::Mapping(self.root.clone()))?)
    }

    pub fn service(&self, name: &str) -> Option<ServiceEntry> {
        self.services()?
            .get(name)
            .and_then(Value::as_mapping)
            .cloned()
            .map(ServiceEntry::from_mapping)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.services().is_some_and(|services| services.contains_key(name))
    }

    /// Service names in document order.
    pub fn service_names(&self) -> Vec<String> {
        self.services()
            .map(|services| services.keys().map(display_key).collect())
            .unwrap_or_default()
    }

    /// Insert or replace a service. A replaced entry keeps its position.
    pub fn upsert_service(&mut self, name: &str, entry: ServiceEntry) {
        self.services_mut()
            .insert(name.into(), Value::Mapping(entry.into_mapping()));
    }

    pub fn remove_service(&mut self, name: &str) -> Option<ServiceEntry> {
        let services = self.root.get_mut("services")?.as_mapping_mut()?;
        services
            .shift_remove(name)
            .and_then(|value| match value {
                Value::Mapping(map) => Some(ServiceEntry::from_mapping(map)),
                _ => None,
            })
    }

    /// Declare the stack-wide resources the stack's entries refer to.
    ///
    /// Adds the project name if missing, every named volume used by any
    /// service in `stack`, and the external proxy network when any service is
    /// routed. Existing declarations are left as they are.
    pub fn declare_stack_resources(&mut self, stack: &Stack) {
        if !self.root.contains_key("name") {
            self.root.insert("name".into(), stack.project().into());
        }

        let volumes: Vec<&str> = stack
            .services()
            .flat_map(|service| service.volumes.iter())
            .filter(|mount| mount.is_named())
            .map(|mount| mount.source.as_str())
            .collect();
        self.declare_volumes(volumes);

        if stack.services().any(|service| service.routing.is_some()) {
            self.declare_proxy_network();
        }
    }

    /// Declare named volumes at the top level when not already declared.
    pub fn declare_volumes<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        let mut names = names.into_iter().peekable();
        if names.peek().is_none() {
            return;
        }
        let volumes = top_level_mapping(&mut self.root, "volumes");
        for name in names {
            if !volumes.contains_key(name) {
                volumes.insert(name.into(), Value::Mapping(Mapping::new()));
            }
        }
    }

    /// Declare the proxy network as external.
    pub fn declare_proxy_network(&mut self) {
        let networks = top_level_mapping(&mut self.root, "networks");
        if !networks.contains_key(PROXY_NETWORK) {
            let mut external = Mapping::new();
            external.insert("external".into(), true.into());
            networks.insert(PROXY_NETWORK.into(), Value::Mapping(external));
        }
    }

    fn services(&self) -> Option<&Mapping> {
        self.root.get("services").and_then(Value::as_mapping)
    }

    fn services_mut(&mut self) -> &mut Mapping {
        top_level_mapping(&mut self.root, "services")
    }
}

/// Top-level mapping under `key`, created (or replacing a null) when absent.
fn top_level_mapping<'a>(root: &'a mut Mapping, key: &str) -> &'a mut Mapping {
    if !root.get(key).is_some_and(Value::is_mapping) {
        root.insert(key.into(), Value::Mapping(Mapping::new()));
    }
    match root.get_mut(key) {
        Some(Value::Mapping(map)) => map,
        _ => unreachable!("inserted a mapping above"),
    }
}

fn display_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Duration in compose notation: whole seconds, or milliseconds when needed.
pub fn compose_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
