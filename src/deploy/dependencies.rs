// ABOUTME: Starts a service's direct dependencies and waits on their wait conditions.
// ABOUTME: Pre-built dependencies missing from the manifest are pulled and added first.

use std::time::Duration;

use super::health::{
    Check, MAX_HEALTH_DEADLINE, UNCHECKED_POLL_INTERVAL, WaitFailure, health_deadline,
    wait_for_container,
};
use super::host::{ContainerProbe, ContainerStatus, compose_up, probe_container, write_manifest};
use super::{Cancellation, DeployError};
use crate::manifest::{EntryRole, ManifestDocument, ServiceEntry};
use crate::remote::{RemoteOps, quote};
use crate::stack::{ImageSource, ServiceDescriptor, Stack, WaitCondition};

/// Make sure `dependency` satisfies `condition` before `dependent` starts.
///
/// A dependency that already satisfies its condition is left alone. One that
/// is not running is started with `--no-deps` and then waited on. A running
/// dependency is only waited on.
///
/// # Errors
///
/// - `DependencyMissing` when a built dependency has never been deployed
/// - `DependencyTimeout` when the condition is not reached in time
/// - `DependencyFailed` when the dependency exits unsuccessfully
pub async fn ensure_dependency<R: RemoteOps + ?Sized>(
    remote: &R,
    stack: &Stack,
    document: &mut ManifestDocument,
    dependent: &ServiceDescriptor,
    dependency: &ServiceDescriptor,
    condition: WaitCondition,
    cancel: &Cancellation,
) -> Result<(), DeployError> {
    let container = dependency.name.as_str();
    let condition = effective_condition(dependency, condition);
    let probe = probe_container(remote, container).await?;

    if let Some(probe) = &probe {
        if matches!(check(condition, probe), Check::Ready) {
            tracing::debug!("Dependency {} already {}", container, condition);
            return Ok(());
        }
    }

    if !probe.as_ref().is_some_and(ContainerProbe::is_running) {
        if !document.has_service(container) {
            add_prebuilt_entry(remote, stack, document, dependent, dependency, cancel).await?;
        }
        tracing::info!("Starting dependency {}", container);
        compose_up(remote, stack.directory(), stack.project(), &[container], false).await?;
    }

    let (interval, deadline) = wait_window(dependency, condition);
    match wait_for_container(remote, container, interval, deadline, cancel, |probe| {
        check(condition, probe)
    })
    .await
    {
        Ok(_) => {
            tracing::info!("Dependency {} {}", container, condition);
            Ok(())
        }
        Err(WaitFailure::Cancelled) => Err(DeployError::Cancelled),
        Err(WaitFailure::TimedOut(_)) => Err(DeployError::DependencyTimeout {
            dependency: container.to_string(),
            condition,
            deadline,
        }),
        Err(WaitFailure::Failed(probe)) => Err(DeployError::DependencyFailed {
            dependency: container.to_string(),
            code: probe.exit_code,
        }),
    }
}

/// A `healthy` wait on a service without a health check degrades to `started`.
fn effective_condition(dependency: &ServiceDescriptor, condition: WaitCondition) -> WaitCondition {
    if condition == WaitCondition::Healthy && dependency.healthcheck.is_none() {
        tracing::warn!(
            "Dependency {} has no health check; waiting for it to start instead",
            dependency.name
        );
        WaitCondition::Started
    } else {
        condition
    }
}

fn check(condition: WaitCondition, probe: &ContainerProbe) -> Check {
    let exited = matches!(probe.status, ContainerStatus::Exited | ContainerStatus::Dead);
    match condition {
        WaitCondition::Started if probe.is_running() => Check::Ready,
        WaitCondition::Healthy if probe.is_healthy() => Check::Ready,
        WaitCondition::Completed if exited && probe.exit_code == 0 => Check::Ready,
        WaitCondition::Started if exited && probe.exit_code == 0 => Check::Ready,
        _ if exited => Check::Failed,
        _ => Check::Pending,
    }
}

/// Poll interval and deadline for waiting on `condition`.
fn wait_window(dependency: &ServiceDescriptor, condition: WaitCondition) -> (Duration, Duration) {
    match condition {
        WaitCondition::Started => (UNCHECKED_POLL_INTERVAL, health_deadline(None)),
        WaitCondition::Healthy => {
            let spec = dependency.healthcheck.as_ref();
            (
                spec.map_or(UNCHECKED_POLL_INTERVAL, |spec| spec.interval),
                health_deadline(spec),
            )
        }
        WaitCondition::Completed => (UNCHECKED_POLL_INTERVAL, MAX_HEALTH_DEADLINE),
    }
}

/// Pull a pre-built dependency and record it in the manifest.
async fn add_prebuilt_entry<R: RemoteOps + ?Sized>(
    remote: &R,
    stack: &Stack,
    document: &mut ManifestDocument,
    dependent: &ServiceDescriptor,
    dependency: &ServiceDescriptor,
    cancel: &Cancellation,
) -> Result<(), DeployError> {
    let ImageSource::Prebuilt(image) = &dependency.source else {
        return Err(DeployError::DependencyMissing {
            service: dependent.name.to_string(),
            dependency: dependency.name.to_string(),
        });
    };

    tracing::info!("Pulling dependency image {}", image);
    cancel
        .guard(remote.run_interactive(&format!("docker pull {}", quote(image))))
        .await?;

    document.upsert_service(
        dependency.name.as_str(),
        ServiceEntry::for_service(dependency, image, EntryRole::Primary),
    );
    document.declare_stack_resources(stack);
    write_manifest(remote, &stack.manifest_path(), &document.render()?).await?;
    Ok(())
}
