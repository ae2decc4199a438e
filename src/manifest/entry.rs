// ABOUTME: A single service definition inside the compose manifest.
// ABOUTME: Built from a descriptor for primary or canary use, or read back from YAML.

use serde_yaml::{Mapping, Value};

use super::labels::{PROXY_NETWORK, routing_labels};
use crate::stack::ServiceDescriptor;

/// Which container an entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRole {
    /// The long-lived container serving the service.
    Primary,
    /// The short-lived `{service}-canary` container.
    Canary,
}

/// One entry under `services:`.
///
/// Entries read from an existing manifest keep every field, including ones
/// skiff never writes.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEntry(Mapping);

impl ServiceEntry {
    /// Entry running `image` for `descriptor`.
    pub fn for_service(descriptor: &ServiceDescriptor, image: &str, role: EntryRole) -> Self {
        let mut map = Mapping::new();
        map.insert("image".into(), image.into());

        let container = match role {
            EntryRole::Primary => descriptor.name.to_string(),
            EntryRole::Canary => descriptor.name.canary(),
        };
        map.insert("container_name".into(), container.into());

        // A canary left behind must not come back after a host reboot.
        let restart = match role {
            EntryRole::Primary => descriptor.restart.to_string(),
            EntryRole::Canary => "no".to_string(),
        };
        map.insert("restart".into(), restart.into());

        if !descriptor.env.is_empty() {
            let env: Mapping = descriptor
                .env
                .iter()
                .map(|(key, value)| (key.as_str().into(), value.replace('$', "$$").into()))
                .collect();
            map.insert("environment".into(), Value::Mapping(env));
        }

        if !descriptor.volumes.is_empty() {
            let volumes = descriptor
                .volumes
                .iter()
                .map(|mount| Value::from(mount.to_string()))
                .collect();
            map.insert("volumes".into(), Value::Sequence(volumes));
        }

        if !descriptor.depends_on.is_empty() {
            let deps: Mapping = descriptor
                .depends_on
                .iter()
                .map(|dep| {
                    let mut condition = Mapping::new();
                    condition.insert(
                        "condition".into(),
                        dep.condition.compose_condition().into(),
                    );
                    (dep.service.as_str().into(), Value::Mapping(condition))
                })
                .collect();
            map.insert("depends_on".into(), Value::Mapping(deps));
        }

        if let Some(health) = &descriptor.healthcheck {
            let mut check = Mapping::new();
            check.insert(
                "test".into(),
                Value::Sequence(vec!["CMD-SHELL".into(), health.command.as_str().into()]),
            );
            check.insert("interval".into(), super::compose_duration(health.interval).into());
            check.insert("timeout".into(), super::compose_duration(health.timeout).into());
            check.insert("retries".into(), Value::from(health.retries));
            map.insert("healthcheck".into(), Value::Mapping(check));
        }

        if let Some(routing) = &descriptor.routing {
            let proxy_health = match role {
                EntryRole::Primary => descriptor.healthcheck.as_ref(),
                EntryRole::Canary => None,
            };
            let labels: Mapping = routing_labels(&descriptor.route_name(), routing, proxy_health)
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect();
            map.insert("labels".into(), Value::Mapping(labels));
            map.insert(
                "networks".into(),
                Value::Sequence(vec!["default".into(), PROXY_NETWORK.into()]),
            );
        }

        Self(map)
    }

    pub(crate) fn from_mapping(map: Mapping) -> Self {
        Self(map)
    }

    pub(crate) fn into_mapping(self) -> Mapping {
        self.0
    }

    pub fn image(&self) -> Option<&str> {
        self.0.get("image").and_then(Value::as_str)
    }

    /// Point the entry at another image, leaving every other field alone.
    pub fn set_image(&mut self, image: &str) {
        self.0.insert("image".into(), image.into());
    }

    pub fn container_name(&self) -> Option<&str> {
        self.0.get("container_name").and_then(Value::as_str)
    }

    /// Label value, whether labels are written as a mapping or a `key=value` list.
    pub fn label(&self, key: &str) -> Option<&str> {
        match self.0.get("labels")? {
            Value::Mapping(labels) => labels.get(key).and_then(Value::as_str),
            Value::Sequence(labels) => labels.iter().filter_map(Value::as_str).find_map(|label| {
                label
                    .split_once('=')
                    .filter(|(name, _)| *name == key)
                    .map(|(_, value)| value)
            }),
            _ => None,
        }
    }

    /// Whether the entry declares a container health check.
    pub fn has_healthcheck(&self) -> bool {
        self.0.contains_key("healthcheck")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{HealthSpec, Routing};
    use crate::types::ServiceName;
    use nonempty::NonEmpty;
    use std::time::Duration;

    fn web() -> ServiceDescriptor {
        let mut web = ServiceDescriptor::built(
            ServiceName::new("web").unwrap(),
            "shop",
            "/opt/shop",
            ".",
        );
        web.routing = Some(Routing {
            domains: NonEmpty::new("shop.example".to_string()),
            redirect_to: None,
            path: None,
            https: true,
            port: 3000,
        });
        web.healthcheck = Some(HealthSpec {
            command: "curl -f http://localhost:3000/up".to_string(),
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
            retries: 3,
            path: Some("/up".to_string()),
        });
        web.env.insert("PRICE".to_string(), "$5".to_string());
        web
    }

    #[test]
    fn canary_shares_routing_but_not_proxy_health() {
        let web = web();
        let primary = ServiceEntry::for_service(&web, "skiff-shop-web:1", EntryRole::Primary);
        let canary = ServiceEntry::for_service(&web, "skiff-shop-web:2", EntryRole::Canary);

        let rule = "traefik.http.routers.shop-web.rule";
        assert_eq!(primary.label(rule), canary.label(rule));
        assert_eq!(canary.container_name(), Some("web-canary"));
        assert!(
            primary
                .label("traefik.http.services.shop-web.loadbalancer.healthcheck.path")
                .is_some()
        );
        assert!(
            canary
                .label("traefik.http.services.shop-web.loadbalancer.healthcheck.path")
                .is_none()
        );
        assert!(canary.has_healthcheck());
    }

    #[test]
    fn env_dollars_are_escaped_for_compose() {
        let entry = ServiceEntry::for_service(&web(), "skiff-shop-web:1", EntryRole::Primary);
        let env = entry.0.get("environment").and_then(Value::as_mapping).unwrap();
        assert_eq!(env.get("PRICE").and_then(Value::as_str), Some("$$5"));
    }

    #[test]
    fn label_lookup_accepts_list_form() {
        let entry: Mapping = serde_yaml::from_str("labels:\n  - traefik.enable=true\n").unwrap();
        let entry = ServiceEntry::from_mapping(entry);
        assert_eq!(entry.label("traefik.enable"), Some("true"));
        assert_eq!(entry.label("missing"), None);
    }
}
