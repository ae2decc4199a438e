// ABOUTME: Validation of skiff.yml before anything reaches the deploy core.
// ABOUTME: Shell safety of every interpolated value, routing rules, and dependency sanity.

use std::collections::{BTreeMap, BTreeSet};

use super::{Config, ServiceConfig};
use crate::error::{Error, Result};
use crate::stack::VolumeMount;
use crate::types::ServiceName;

pub(super) fn validate(config: &Config) -> Result<()> {
    check_word("project", &config.project, is_project_char)?;
    if config.project.starts_with(|c: char| c == '-' || c == '_') {
        return invalid(format!("project `{}` must start with a letter or digit", config.project));
    }
    check_word("image_prefix", &config.image_prefix, is_project_char)?;

    if let Some(directory) = &config.directory {
        if !directory.starts_with('/') {
            return invalid(format!("directory `{}` must be an absolute path", directory));
        }
        check_word("directory", directory, is_path_char)?;
    }

    if config.services.is_empty() {
        return invalid("at least one service is required".to_string());
    }

    for (name, service) in &config.services {
        ServiceName::new(name).map_err(|e| Error::InvalidConfig(format!("service `{name}`: {e}")))?;
        validate_service(name, service).map_err(|e| match e {
            Error::InvalidConfig(message) => Error::InvalidConfig(format!("service `{name}`: {message}")),
            other => other,
        })?;
    }

    validate_dependencies(&config.services)
}

fn validate_service(name: &str, service: &ServiceConfig) -> Result<()> {
    match (&service.build, &service.image) {
        (Some(_), Some(_)) => return invalid("set either `build` or `image`, not both".to_string()),
        (None, None) => return invalid("one of `build` or `image` is required".to_string()),
        (Some(build), None) => {
            check_word("dockerfile", build.dockerfile(), is_path_char)?;
            if let Some(target) = build.target() {
                check_word("build target", target, is_image_char)?;
            }
        }
        (None, Some(image)) => check_word("image", image, is_image_char)?,
    }

    for domain in &service.domains {
        check_word("domain", domain, is_domain_char)?;
    }

    if let Some(redirect) = &service.redirect_to {
        if !service.domains.contains(redirect) {
            return invalid(format!("redirect_to `{redirect}` is not one of the domains"));
        }
    }

    if let Some(path) = &service.path {
        if !path.starts_with('/') {
            return invalid(format!("path `{path}` must start with `/`"));
        }
        check_word("path", path, is_path_char)?;
    }

    if !service.domains.is_empty() && service.port.is_none() {
        return invalid("routed services need a `port`".to_string());
    }
    if service.domains.is_empty() && (service.redirect_to.is_some() || service.path.is_some()) {
        return invalid("`redirect_to` and `path` need `domains`".to_string());
    }

    for volume in &service.volumes {
        let mount = VolumeMount::parse(volume)
            .ok_or_else(|| Error::InvalidConfig(format!("volume `{volume}` must be `source:target[:ro]`")))?;
        check_word("volume source", &mount.source, is_path_char)?;
        check_word("volume target", &mount.target, is_path_char)?;
    }

    for key in service.env.keys() {
        let valid = key.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return invalid(format!("environment variable name `{key}` is not valid"));
        }
    }

    if let Some(healthcheck) = &service.healthcheck {
        if healthcheck.cmd.trim().is_empty() {
            return invalid("healthcheck `cmd` cannot be empty".to_string());
        }
        if healthcheck.interval.is_zero() {
            return invalid("healthcheck `interval` must be positive".to_string());
        }
        if let Some(path) = &healthcheck.path {
            if !path.starts_with('/') {
                return invalid(format!("healthcheck path `{path}` must start with `/`"));
            }
            check_word("healthcheck path", path, is_path_char)?;
        }
    }

    if service.depends_on.entries().iter().any(|(dep, _)| *dep == name) {
        return invalid("a service cannot depend on itself".to_string());
    }

    Ok(())
}

fn validate_dependencies(services: &BTreeMap<String, ServiceConfig>) -> Result<()> {
    for (name, service) in services {
        for (dependency, _) in service.depends_on.entries() {
            if !services.contains_key(dependency) {
                return invalid(format!("service `{name}` depends on unknown service `{dependency}`"));
            }
        }
    }

    // Depth-first search with an explicit path for cycle reporting.
    let mut done: BTreeSet<&str> = BTreeSet::new();
    for name in services.keys() {
        let mut path = Vec::new();
        visit(name, services, &mut path, &mut done)?;
    }
    Ok(())
}

fn visit<'a>(
    name: &'a str,
    services: &'a BTreeMap<String, ServiceConfig>,
    path: &mut Vec<&'a str>,
    done: &mut BTreeSet<&'a str>,
) -> Result<()> {
    if done.contains(name) {
        return Ok(());
    }
    if let Some(start) = path.iter().position(|seen| *seen == name) {
        let mut cycle = path[start..].to_vec();
        cycle.push(name);
        return invalid(format!("dependency cycle: {}", cycle.join(" -> ")));
    }

    path.push(name);
    if let Some(service) = services.get(name) {
        for (dependency, _) in service.depends_on.entries() {
            visit(dependency, services, path, done)?;
        }
    }
    path.pop();
    done.insert(name);
    Ok(())
}

fn check_word(what: &str, value: &str, allowed: fn(char) -> bool) -> Result<()> {
    if value.is_empty() {
        return invalid(format!("{what} cannot be empty"));
    }
    match value.chars().find(|c| !allowed(*c)) {
        Some(c) => invalid(format!("{what} `{value}` contains unsupported character {c:?}")),
        None => Ok(()),
    }
}

fn invalid<T>(message: String) -> Result<T> {
    Err(Error::InvalidConfig(message))
}

fn is_project_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'
}

fn is_domain_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.'
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-')
}

fn is_image_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | ':' | '@')
}
