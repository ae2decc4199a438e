// ABOUTME: Integration tests for the compose manifest skiff writes on the server.
// ABOUTME: Checks entry shape for primaries and canaries and stack-wide declarations.

mod support;

use serde_yaml::Value;
use skiff::manifest::{EntryRole, ManifestDocument, PROXY_NETWORK, ServiceEntry};
use skiff::stack::{VolumeMount, WaitCondition};
use support::fixtures::*;

fn rendered(document: &ManifestDocument) -> Value {
    serde_yaml::from_str(&document.render().unwrap()).unwrap()
}

#[test]
fn canary_entry_never_restarts() {
    let web = with_healthcheck(built("web"), 5, 3);
    let mut document = ManifestDocument::new(PROJECT);
    document.upsert_service("web", ServiceEntry::for_service(&web, "skiff-shop-web:1", EntryRole::Primary));
    document.upsert_service("web-canary", ServiceEntry::for_service(&web, "skiff-shop-web:2", EntryRole::Canary));

    let root = rendered(&document);
    assert_eq!(root["name"], "shop");
    assert_eq!(root["services"]["web"]["restart"], "unless-stopped");
    assert_eq!(root["services"]["web-canary"]["restart"], "no");
    assert_eq!(root["services"]["web-canary"]["container_name"], "web-canary");
    assert_eq!(root["services"]["web-canary"]["healthcheck"]["interval"], "5s");
    assert_eq!(
        root["services"]["web-canary"]["healthcheck"]["test"][0],
        "CMD-SHELL"
    );
}

#[test]
fn dependencies_use_compose_conditions() {
    let web = depends_on(
        depends_on(built("web"), "db", WaitCondition::Healthy),
        "migrate",
        WaitCondition::Completed,
    );
    let mut document = ManifestDocument::new(PROJECT);
    document.upsert_service("web", ServiceEntry::for_service(&web, "skiff-shop-web:1", EntryRole::Primary));

    let root = rendered(&document);
    let deps = &root["services"]["web"]["depends_on"];
    assert_eq!(deps["db"]["condition"], "service_healthy");
    assert_eq!(deps["migrate"]["condition"], "service_completed_successfully");
}

#[test]
fn routed_entry_joins_proxy_network() {
    let web = routed(built("web"), "shop.example.com", 3000);
    let entry = ServiceEntry::for_service(&web, "skiff-shop-web:1", EntryRole::Primary);

    assert_eq!(entry.label("traefik.enable"), Some("true"));
    assert_eq!(
        entry.label("traefik.http.routers.shop-web.rule"),
        Some("Host(`shop.example.com`)")
    );
    assert_eq!(
        entry.label("traefik.http.services.shop-web.loadbalancer.server.port"),
        Some("3000")
    );

    let mut document = ManifestDocument::new(PROJECT);
    document.upsert_service("web", entry);
    let root = rendered(&document);
    assert_eq!(
        root["services"]["web"]["networks"],
        serde_yaml::from_str::<Value>("[default, skiff]").unwrap()
    );
}

#[test]
fn stack_resources_are_declared_once() {
    let mut web = routed(built("web"), "shop.example.com", 3000);
    web.volumes = vec![
        VolumeMount::parse("uploads:/app/uploads").unwrap(),
        VolumeMount::parse("/etc/shop:/etc/shop:ro").unwrap(),
    ];
    let stack = stack([web]);
    let text = "services: {}\nvolumes:\n  uploads:\n    driver: local\n";
    let mut document = ManifestDocument::parse(text).unwrap();

    document.declare_stack_resources(&stack);
    document.declare_stack_resources(&stack);

    let root = rendered(&document);
    assert_eq!(root["name"], "shop");
    assert_eq!(root["volumes"]["uploads"]["driver"], "local", "existing declaration kept");
    assert_eq!(root["volumes"].as_mapping().unwrap().len(), 1, "bind mounts are not volumes");
    assert_eq!(root["networks"][PROXY_NETWORK]["external"], true);
}

#[test]
fn unrouted_stack_declares_no_network() {
    let mut document = ManifestDocument::new(PROJECT);
    document.declare_stack_resources(&stack([built("worker")]));

    let root = rendered(&document);
    assert!(root.get("networks").is_none());
    assert!(root.get("volumes").is_none());
}

#[test]
fn removed_entry_is_returned_and_gone() {
    let web = built("web");
    let worker = built("worker");
    let mut document = ManifestDocument::parse(&manifest(&[
        (&web, "skiff-shop-web:2"),
        (&worker, "skiff-shop-worker:1"),
    ]))
    .unwrap();

    let removed = document.remove_service("web").unwrap();
    assert_eq!(removed.image(), Some("skiff-shop-web:2"));
    assert_eq!(document.service_names(), ["worker"]);
    assert!(document.remove_service("web").is_none());
}

/// A hand-written manifest with fields skiff never generates.
const HAND_WRITTEN: &str = r#"name: shop
x-logging:
  driver: json-file
  options:
    max-size: 10m
services:
  web:
    image: skiff-shop-web:3
    restart: unless-stopped
    logging:
      driver: json-file
  worker:
    image: skiff-shop-worker:7
    command: ["bundle", "exec", "sidekiq"]
    cap_add: [SYS_PTRACE]
    deploy:
      resources:
        limits:
          memory: 512M
    environment:
      QUEUES: "default,mailers"
volumes:
  uploads: {}
"#;

#[test]
fn render_then_parse_is_a_fixed_point() {
    let once = ManifestDocument::parse(HAND_WRITTEN).unwrap().render().unwrap();
    let twice = ManifestDocument::parse(&once).unwrap().render().unwrap();

    assert_eq!(once, twice);
    assert_eq!(
        serde_yaml::from_str::<Value>(&once).unwrap(),
        serde_yaml::from_str::<Value>(HAND_WRITTEN).unwrap()
    );
}

#[test]
fn upsert_leaves_sibling_entries_identical() {
    let original: Value = serde_yaml::from_str(HAND_WRITTEN).unwrap();
    let web = built("web");
    let mut document = ManifestDocument::parse(HAND_WRITTEN).unwrap();

    document.upsert_service("web", ServiceEntry::for_service(&web, "skiff-shop-web:4", EntryRole::Primary));
    document.upsert_service("web-canary", ServiceEntry::for_service(&web, "skiff-shop-web:4", EntryRole::Canary));

    let root = rendered(&document);
    assert_eq!(root["services"]["worker"], original["services"]["worker"]);
    assert_eq!(root["x-logging"], original["x-logging"]);
    assert_eq!(root["volumes"], original["volumes"]);
    assert_eq!(root["services"]["web"]["image"], "skiff-shop-web:4");
    assert_eq!(document.service_names(), ["web", "worker", "web-canary"]);
}
