// ABOUTME: Traefik label rendering for routed services.
// ABOUTME: Canary entries share the primary's router and service but skip health labels.

use std::collections::BTreeMap;

use crate::stack::{HealthSpec, Routing};

/// Docker network the proxy and every routed container join.
pub const PROXY_NETWORK: &str = "skiff";

/// Traefik certificate resolver used for HTTPS routes.
pub const CERT_RESOLVER: &str = "letsencrypt";

/// Labels placing a container behind the proxy.
///
/// `route` names both the router and the load-balancer service, so every
/// container carrying these labels joins the same upstream pool. Proxy health
/// check labels are only emitted when `health` is given.
pub fn routing_labels(
    route: &str,
    routing: &Routing,
    health: Option<&HealthSpec>,
) -> BTreeMap<String, String> {
    let router = format!("traefik.http.routers.{route}");
    let service = format!("traefik.http.services.{route}");

    let mut labels = BTreeMap::new();
    labels.insert("traefik.enable".to_string(), "true".to_string());
    labels.insert("traefik.docker.network".to_string(), PROXY_NETWORK.to_string());
    labels.insert(format!("{router}.rule"), router_rule(routing));
    labels.insert(format!("{router}.service"), route.to_string());

    if routing.https {
        labels.insert(format!("{router}.entrypoints"), "websecure".to_string());
        labels.insert(format!("{router}.tls.certresolver"), CERT_RESOLVER.to_string());
    } else {
        labels.insert(format!("{router}.entrypoints"), "web".to_string());
    }

    if let Some(target) = &routing.redirect_to {
        let sources: Vec<&String> = routing.domains.iter().filter(|d| *d != target).collect();
        if !sources.is_empty() {
            let middleware = format!("traefik.http.middlewares.{route}-redirect.redirectregex");
            let alternatives = sources
                .iter()
                .map(|domain| domain.replace('.', "\\."))
                .collect::<Vec<_>>()
                .join("|");
            let scheme = if routing.https { "https" } else { "http" };
            labels.insert(
                format!("{middleware}.regex"),
                format!("^https?://(?:{alternatives})/(.*)"),
            );
            // `$$` survives compose interpolation as a literal `$`.
            labels.insert(
                format!("{middleware}.replacement"),
                format!("{scheme}://{target}/$${{1}}"),
            );
            labels.insert(format!("{middleware}.permanent"), "true".to_string());
            labels.insert(format!("{router}.middlewares"), format!("{route}-redirect"));
        }
    }

    labels.insert(
        format!("{service}.loadbalancer.server.port"),
        routing.port.to_string(),
    );

    if let Some(spec) = health
        && let Some(path) = &spec.path
    {
        labels.insert(format!("{service}.loadbalancer.healthcheck.path"), path.clone());
        labels.insert(
            format!("{service}.loadbalancer.healthcheck.interval"),
            super::compose_duration(spec.interval),
        );
        labels.insert(
            format!("{service}.loadbalancer.healthcheck.timeout"),
            super::compose_duration(spec.timeout),
        );
    }

    labels
}

fn router_rule(routing: &Routing) -> String {
    let hosts = routing
        .domains
        .iter()
        .map(|domain| format!("Host(`{domain}`)"))
        .collect::<Vec<_>>()
        .join(" || ");

    match routing.path.as_deref() {
        Some(path) if path != "/" => {
            if routing.domains.len() > 1 {
                format!("({hosts}) && PathPrefix(`{path}`)")
            } else {
                format!("{hosts} && PathPrefix(`{path}`)")
            }
        }
        _ => hosts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nonempty::NonEmpty;
    use std::time::Duration;

    fn routing(domains: &[&str]) -> Routing {
        Routing {
            domains: NonEmpty::from_vec(domains.iter().map(|d| d.to_string()).collect()).unwrap(),
            redirect_to: None,
            path: None,
            https: true,
            port: 3000,
        }
    }

    fn health_with_path() -> HealthSpec {
        HealthSpec {
            command: "curl -f http://localhost:3000/up".to_string(),
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
            retries: 3,
            path: Some("/up".to_string()),
        }
    }

    #[test]
    fn single_domain_https_route() {
        let labels = routing_labels("shop-web", &routing(&["shop.example"]), None);

        assert_eq!(labels["traefik.http.routers.shop-web.rule"], "Host(`shop.example`)");
        assert_eq!(labels["traefik.http.routers.shop-web.entrypoints"], "websecure");
        assert_eq!(labels["traefik.http.routers.shop-web.tls.certresolver"], "letsencrypt");
        assert_eq!(
            labels["traefik.http.services.shop-web.loadbalancer.server.port"],
            "3000"
        );
    }

    #[test]
    fn path_prefix_groups_multiple_hosts() {
        let mut routing = routing(&["a.example", "b.example"]);
        routing.path = Some("/api".to_string());
        routing.https = false;

        let labels = routing_labels("shop-api", &routing, None);

        assert_eq!(
            labels["traefik.http.routers.shop-api.rule"],
            "(Host(`a.example`) || Host(`b.example`)) && PathPrefix(`/api`)"
        );
        assert_eq!(labels["traefik.http.routers.shop-api.entrypoints"], "web");
        assert!(!labels.contains_key("traefik.http.routers.shop-api.tls.certresolver"));
    }

    #[test]
    fn redirect_middleware_points_at_target() {
        let mut routing = routing(&["www.shop.example", "shop.example"]);
        routing.redirect_to = Some("shop.example".to_string());

        let labels = routing_labels("shop-web", &routing, None);

        assert_eq!(
            labels["traefik.http.middlewares.shop-web-redirect.redirectregex.regex"],
            "^https?://(?:www\\.shop\\.example)/(.*)"
        );
        assert_eq!(
            labels["traefik.http.middlewares.shop-web-redirect.redirectregex.replacement"],
            "https://shop.example/$${1}"
        );
        assert_eq!(
            labels["traefik.http.routers.shop-web.middlewares"],
            "shop-web-redirect"
        );
    }

    #[test]
    fn health_labels_only_when_requested() {
        let routing = routing(&["shop.example"]);
        let health = health_with_path();

        let with_health = routing_labels("shop-web", &routing, Some(&health));
        let without = routing_labels("shop-web", &routing, None);

        assert_eq!(
            with_health["traefik.http.services.shop-web.loadbalancer.healthcheck.path"],
            "/up"
        );
        assert!(without.keys().all(|key| !key.contains("healthcheck")));
    }
}
