// ABOUTME: Error types for manifest parsing and rendering.
// ABOUTME: An unexpected manifest shape aborts a deploy before any remote change.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest is not valid YAML: {0}")]
    Syntax(#[from] serde_yaml::Error),

    #[error("manifest root must be a mapping")]
    NotAMapping,

    #[error("`services` must be a mapping of service name to definition")]
    ServicesNotAMapping,

    #[error("definition of service {service} must be a mapping")]
    ServiceNotAMapping { service: String },

    #[error("service {service} runs image `{found}`, expected `{expected}:<version>`")]
    UnexpectedImage {
        service: String,
        found: String,
        expected: String,
    },

    #[error("service {service} is at version {current}, which has no successor")]
    VersionExhausted { service: String, current: u64 },
}
