// ABOUTME: Fully resolved service descriptors and the stack that groups them.
// ABOUTME: Produced by the config layer and consumed read-only by the deploy core.

mod descriptor;

pub use descriptor::{
    Dependency, HealthSpec, ImageSource, Routing, ServiceDescriptor, StrategyPreference,
    VolumeMount, WaitCondition,
};

use std::collections::{BTreeMap, BTreeSet};

use crate::types::ServiceName;

/// File name of the compose manifest inside a target directory.
pub const MANIFEST_FILENAME: &str = "compose.yml";

/// All services sharing one target directory and one manifest.
#[derive(Debug, Clone)]
pub struct Stack {
    project: String,
    directory: String,
    services: BTreeMap<ServiceName, ServiceDescriptor>,
}

impl Stack {
    pub fn new(
        project: impl Into<String>,
        directory: impl Into<String>,
        services: impl IntoIterator<Item = ServiceDescriptor>,
    ) -> Self {
        Self {
            project: project.into(),
            directory: directory.into(),
            services: services
                .into_iter()
                .map(|service| (service.name.clone(), service))
                .collect(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn manifest_path(&self) -> String {
        format!("{}/{}", self.directory, MANIFEST_FILENAME)
    }

    pub fn service(&self, name: &ServiceName) -> Option<&ServiceDescriptor> {
        self.services.get(name)
    }

    /// Services in name order.
    pub fn services(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Direct dependencies of `service` that are part of this stack.
    pub fn dependencies_of<'a>(
        &'a self,
        service: &ServiceDescriptor,
    ) -> Vec<(&'a ServiceDescriptor, WaitCondition)> {
        service
            .depends_on
            .iter()
            .filter_map(|dep| {
                self.services
                    .get(&dep.service)
                    .map(|descriptor| (descriptor, dep.condition))
            })
            .collect()
    }

    /// Services ordered so every dependency comes before its dependents.
    ///
    /// Among services whose dependencies are already placed, names sort
    /// lexically, so a stack without dependencies comes out in name order.
    /// Services caught in a cycle are appended in name order at the end.
    pub fn start_order(&self) -> Vec<&ServiceDescriptor> {
        let mut placed: BTreeSet<&ServiceName> = BTreeSet::new();
        let mut order = Vec::with_capacity(self.services.len());

        while order.len() < self.services.len() {
            let ready = self.services.values().find(|service| {
                !placed.contains(&service.name)
                    && service.depends_on.iter().all(|dep| {
                        placed.contains(&dep.service) || !self.services.contains_key(&dep.service)
                    })
            });

            match ready {
                Some(service) => {
                    placed.insert(&service.name);
                    order.push(service);
                }
                None => {
                    order.extend(
                        self.services
                            .values()
                            .filter(|service| !placed.contains(&service.name)),
                    );
                    break;
                }
            }
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, deps: &[&str]) -> ServiceDescriptor {
        let mut descriptor = ServiceDescriptor::prebuilt(
            ServiceName::new(name).unwrap(),
            "shop",
            "/opt/shop",
            "nginx:1.27",
        );
        descriptor.depends_on = deps
            .iter()
            .map(|dep| Dependency {
                service: ServiceName::new(dep).unwrap(),
                condition: WaitCondition::Started,
            })
            .collect();
        descriptor
    }

    fn names(order: &[&ServiceDescriptor]) -> Vec<String> {
        order.iter().map(|s| s.name.to_string()).collect()
    }

    #[test]
    fn start_order_without_dependencies_is_name_order() {
        let stack = Stack::new(
            "shop",
            "/opt/shop",
            [service("worker", &[]), service("api", &[]), service("cache", &[])],
        );
        assert_eq!(names(&stack.start_order()), ["api", "cache", "worker"]);
    }

    #[test]
    fn start_order_places_dependencies_first() {
        let stack = Stack::new(
            "shop",
            "/opt/shop",
            [
                service("api", &["db"]),
                service("db", &[]),
                service("web", &["api"]),
            ],
        );
        assert_eq!(names(&stack.start_order()), ["db", "api", "web"]);
    }

    #[test]
    fn dependencies_of_skips_services_outside_the_stack() {
        let stack = Stack::new(
            "shop",
            "/opt/shop",
            [service("api", &["db", "ghost"]), service("db", &[])],
        );
        let api = stack.service(&ServiceName::new("api").unwrap()).unwrap();
        let deps = stack.dependencies_of(api);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].0.name.as_str(), "db");
    }

    #[test]
    fn manifest_lives_in_target_directory() {
        let stack = Stack::new("shop", "/opt/shop", Vec::<ServiceDescriptor>::new());
        assert_eq!(stack.manifest_path(), "/opt/shop/compose.yml");
    }
}
