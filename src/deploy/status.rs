// ABOUTME: Read-only view of every service in a stack: container state and recorded version.
// ABOUTME: Takes no lock and changes nothing on the host.

use serde::Serialize;

use crate::manifest::ManifestDocument;
use crate::remote::RemoteOps;
use crate::stack::Stack;
use crate::types::{ServiceName, Version};

use super::DeployError;
use super::host::{probe_container, read_manifest};

/// State of one service on the host.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: ServiceName,
    /// Container state, `missing` when there is no container.
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<&'static str>,
    /// Image recorded in the manifest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    /// A canary container is present.
    pub canary: bool,
}

/// Probe every service of `stack`, in name order.
pub async fn stack_status<R: RemoteOps + ?Sized>(
    remote: &R,
    stack: &Stack,
) -> Result<Vec<ServiceStatus>, DeployError> {
    let snapshot = read_manifest(remote, &stack.manifest_path()).await?;
    let document = ManifestDocument::parse(snapshot.text())?;

    let mut statuses = Vec::with_capacity(stack.len());
    for descriptor in stack.services() {
        let probe = probe_container(remote, descriptor.name.as_str()).await?;
        let canary = probe_container(remote, &descriptor.name.canary())
            .await?
            .is_some();

        let image = document
            .service(descriptor.name.as_str())
            .and_then(|entry| entry.image().map(str::to_string));
        let version = image
            .as_deref()
            .and_then(|image| descriptor.image_name().version_of(image));

        statuses.push(ServiceStatus {
            service: descriptor.name.clone(),
            state: probe
                .as_ref()
                .map_or("missing", |probe| probe.status.as_str())
                .to_string(),
            health: probe
                .as_ref()
                .and_then(|probe| probe.health)
                .map(|health| health.as_str()),
            image,
            version,
            canary,
        });
    }

    Ok(statuses)
}
