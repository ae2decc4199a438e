// ABOUTME: Service descriptors and manifests for a small `shop` stack.
// ABOUTME: Shared by the deploy, rollback, and scheduler integration tests.

use std::time::Duration;

use nonempty::NonEmpty;
use skiff::manifest::{EntryRole, ManifestDocument, ServiceEntry};
use skiff::stack::{
    Dependency, HealthSpec, Routing, ServiceDescriptor, Stack, StrategyPreference, WaitCondition,
};
use skiff::types::ServiceName;

pub const PROJECT: &str = "shop";
pub const DIRECTORY: &str = "/opt/shop";
pub const MANIFEST: &str = "/opt/shop/compose.yml";
pub const LOCK: &str = "/opt/shop/.skiff.lock";

pub fn name(value: &str) -> ServiceName {
    ServiceName::new(value).unwrap()
}

/// A service built from source, without health check or routing.
pub fn built(service: &str) -> ServiceDescriptor {
    ServiceDescriptor::built(name(service), PROJECT, DIRECTORY, "/src/shop")
}

pub fn prebuilt(service: &str, image: &str) -> ServiceDescriptor {
    ServiceDescriptor::prebuilt(name(service), PROJECT, DIRECTORY, image)
}

/// `descriptor` with a health check polled every `interval_secs`.
pub fn with_healthcheck(
    mut descriptor: ServiceDescriptor,
    interval_secs: u64,
    retries: u32,
) -> ServiceDescriptor {
    descriptor.healthcheck = Some(HealthSpec {
        command: "curl -f http://localhost:3000/up".to_string(),
        interval: Duration::from_secs(interval_secs),
        timeout: Duration::from_secs(5),
        retries,
        path: Some("/up".to_string()),
    });
    descriptor
}

pub fn routed(mut descriptor: ServiceDescriptor, domain: &str, port: u16) -> ServiceDescriptor {
    descriptor.routing = Some(Routing {
        domains: NonEmpty::new(domain.to_string()),
        redirect_to: None,
        path: None,
        https: true,
        port,
    });
    descriptor
}

pub fn depends_on(
    mut descriptor: ServiceDescriptor,
    dependency: &str,
    condition: WaitCondition,
) -> ServiceDescriptor {
    descriptor.depends_on.push(Dependency {
        service: name(dependency),
        condition,
    });
    descriptor
}

pub fn strategy(mut descriptor: ServiceDescriptor, preference: StrategyPreference) -> ServiceDescriptor {
    descriptor.strategy = preference;
    descriptor
}

pub fn stack(services: impl IntoIterator<Item = ServiceDescriptor>) -> Stack {
    Stack::new(PROJECT, DIRECTORY, services)
}

/// Manifest text with a primary entry per `(descriptor, image)` pair.
pub fn manifest(entries: &[(&ServiceDescriptor, &str)]) -> String {
    let mut document = ManifestDocument::new(PROJECT);
    for (descriptor, image) in entries {
        document.upsert_service(
            descriptor.name.as_str(),
            ServiceEntry::for_service(descriptor, image, EntryRole::Primary),
        );
    }
    document.render().unwrap()
}

/// Image recorded for `service` in manifest `text`.
pub fn recorded_image(text: &str, service: &str) -> Option<String> {
    ManifestDocument::parse(text)
        .unwrap()
        .service(service)
        .and_then(|entry| entry.image().map(str::to_string))
}
