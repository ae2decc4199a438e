// ABOUTME: Manual rollback of a service to the version before the one recorded.
// ABOUTME: Rewrites only the primary's image and recreates the primary.

use crate::manifest::ManifestDocument;
use crate::remote::RemoteOps;
use crate::stack::ServiceDescriptor;

use super::host::{compose_up, image_exists, read_manifest, write_manifest};
use super::outcome::Deployed;
use super::strategy::DeployStrategy;
use super::version::VersionPlan;
use super::DeployError;

/// Roll `descriptor` back one version.
///
/// This function:
/// 1. Reads the manifest and the version recorded for the service
/// 2. Checks that the image of the previous version is still on the host
/// 3. Points the primary entry at that image and recreates the primary
///
/// Canary entries and containers are never touched. The caller holds the
/// stack lock.
///
/// # Errors
///
/// Returns `DeployError::NoPriorVersion` if:
/// - The service uses a pre-built image
/// - The service has never been deployed
/// - The recorded version is the first one
/// - The previous image is gone from the host
pub async fn rollback_service<R: RemoteOps + ?Sized>(
    remote: &R,
    descriptor: &ServiceDescriptor,
) -> Result<Deployed, DeployError> {
    let service = descriptor.name.as_str();

    if descriptor.is_prebuilt() {
        return Err(DeployError::no_prior_version(
            service,
            "pre-built images carry no version",
        ));
    }

    let path = descriptor.manifest_path();
    let snapshot = read_manifest(remote, &path).await?;
    let mut document = ManifestDocument::parse(snapshot.text())?;

    let Some(mut entry) = document.service(service) else {
        return Err(DeployError::no_prior_version(service, "never deployed"));
    };

    let image_name = descriptor.image_name();
    let plan = VersionPlan::for_service(&document, &descriptor.name, &image_name)?;
    let previous = plan.current.previous().ok_or_else(|| {
        DeployError::no_prior_version(
            service,
            format!("version {} is the first version", plan.current),
        )
    })?;

    let reference = image_name.tagged(previous);
    if !image_exists(remote, &reference).await? {
        return Err(DeployError::no_prior_version(
            service,
            format!("image {} is no longer on the host", reference),
        ));
    }

    tracing::info!("Rolling {} back from {} to {}", service, plan.current, previous);
    entry.set_image(&reference);
    document.upsert_service(service, entry);
    write_manifest(remote, &path, &document.render()?).await?;
    compose_up(
        remote,
        &descriptor.directory,
        &descriptor.project,
        &[service],
        true,
    )
    .await?;

    Ok(Deployed {
        service: descriptor.name.clone(),
        version: Some(previous),
        image: reference,
        strategy: Some(DeployStrategy::Direct),
        reason: Some("rollback"),
        url: descriptor.url(),
    })
}
