// ABOUTME: Versioned image names of the form prefix-project-service:N.
// ABOUTME: The tag is a monotonic deploy counter, not a registry tag.

use serde::Serialize;
use std::fmt;

use super::ServiceName;

/// Deploy counter embedded in an image tag. Zero means never deployed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Version of a service that has no manifest entry yet.
    pub const UNDEPLOYED: Version = Version(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// The version after this one, or `None` once the counter is exhausted.
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    /// The version before this one, if any deployed version precedes it.
    pub const fn previous(self) -> Option<Self> {
        if self.0 > 1 {
            Some(Self(self.0 - 1))
        } else {
            None
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Untagged image name built by skiff for one service of one project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageName(String);

impl ImageName {
    pub fn new(prefix: &str, project: &str, service: &ServiceName) -> Self {
        Self(format!("{}-{}-{}", prefix, project, service))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full reference for a version, e.g. `skiff-shop-web:3`.
    pub fn tagged(&self, version: Version) -> String {
        format!("{}:{}", self.0, version)
    }

    /// Extract the version from a reference produced by [`ImageName::tagged`].
    ///
    /// Returns `None` for references of any other shape, including ones with a
    /// registry prefix, digest, or non-numeric tag.
    pub fn version_of(&self, reference: &str) -> Option<Version> {
        let tag = reference.strip_prefix(self.0.as_str())?.strip_prefix(':')?;
        if tag.is_empty() || !tag.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        tag.parse().ok().map(Version)
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web_image() -> ImageName {
        ImageName::new("skiff", "shop", &ServiceName::new("web").unwrap())
    }

    #[test]
    fn tagged_reference_embeds_version() {
        assert_eq!(web_image().tagged(Version::new(7)), "skiff-shop-web:7");
    }

    #[test]
    fn version_of_reads_back_tag() {
        assert_eq!(
            web_image().version_of("skiff-shop-web:12"),
            Some(Version::new(12))
        );
    }

    #[test]
    fn version_of_rejects_foreign_shapes() {
        let image = web_image();
        assert_eq!(image.version_of("skiff-shop-web:latest"), None);
        assert_eq!(image.version_of("skiff-shop-web:+3"), None);
        assert_eq!(image.version_of("skiff-shop-web:"), None);
        assert_eq!(image.version_of("skiff-shop-webapp:3"), None);
        assert_eq!(image.version_of("nginx:1.25"), None);
    }

    #[test]
    fn previous_stops_at_first_version() {
        assert_eq!(Version::new(3).previous(), Some(Version::new(2)));
        assert_eq!(Version::new(1).previous(), None);
        assert_eq!(Version::UNDEPLOYED.previous(), None);
    }

    #[test]
    fn next_stops_at_the_largest_tag() {
        assert_eq!(Version::new(u64::MAX - 1).next(), Some(Version::new(u64::MAX)));
        assert_eq!(Version::new(u64::MAX).next(), None);
    }
}
