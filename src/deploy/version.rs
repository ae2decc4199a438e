// ABOUTME: Resolves the deployed and next version of a service from manifest text.
// ABOUTME: Pure; a malformed image reference is an error, never a silent reset.

use crate::manifest::{ManifestDocument, ManifestError};
use crate::types::{ImageName, ServiceName, Version};

/// Current and next version of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionPlan {
    /// Deployed version, or [`Version::UNDEPLOYED`] without a manifest entry.
    pub current: Version,
    pub next: Version,
}

impl VersionPlan {
    /// Plan for `service` in an already parsed manifest.
    pub fn for_service(
        doc: &ManifestDocument,
        service: &ServiceName,
        image: &ImageName,
    ) -> Result<Self, ManifestError> {
        let current = match doc.service(service.as_str()) {
            None => Version::UNDEPLOYED,
            Some(entry) => {
                let found = entry.image().unwrap_or_default();
                image
                    .version_of(found)
                    .ok_or_else(|| ManifestError::UnexpectedImage {
                        service: service.to_string(),
                        found: found.to_string(),
                        expected: image.to_string(),
                    })?
            }
        };

        let next = current.next().ok_or_else(|| ManifestError::VersionExhausted {
            service: service.to_string(),
            current: current.get(),
        })?;

        Ok(Self { current, next })
    }
}

/// Parse `manifest` and plan the next version of `service`.
pub fn resolve_version(
    manifest: &str,
    service: &ServiceName,
    image: &ImageName,
) -> Result<VersionPlan, ManifestError> {
    let doc = ManifestDocument::parse(manifest)?;
    VersionPlan::for_service(&doc, service, image)
}
