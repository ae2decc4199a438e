// ABOUTME: What a deploy attempt reports back: success with a version, or a staged failure.
// ABOUTME: Failures always say whether the primary container was touched.

use serde::Serialize;
use std::fmt;

use super::error::DeployError;
use super::strategy::DeployStrategy;
use crate::types::{ServiceName, Version};

/// Step of a deploy at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Reading the manifest and resolving versions.
    Prepare,
    /// Acquiring the stack lock.
    Lock,
    /// Building or pulling the image.
    Build,
    /// Starting containers directly or waiting on dependencies.
    Start,
    /// Waiting for the canary to become healthy.
    CanaryHealth,
    /// Recreating the primary on the new version.
    Promote,
    /// Restoring a previous version.
    Rollback,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Prepare => "prepare",
            Stage::Lock => "lock",
            Stage::Build => "build",
            Stage::Start => "start",
            Stage::CanaryHealth => "canary-health",
            Stage::Promote => "promote",
            Stage::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

/// A successful deploy.
#[derive(Debug, Clone, Serialize)]
pub struct Deployed {
    pub service: ServiceName,
    /// New version; `None` for pre-built images.
    pub version: Option<Version>,
    /// Image reference now recorded in the manifest.
    pub image: String,
    /// How the service was started; `None` after a build-only pass.
    pub strategy: Option<DeployStrategy>,
    /// Why the direct path was taken, when it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A failed deploy.
#[derive(Debug)]
pub struct DeployFailure {
    /// Service being deployed; `None` for stack-wide failures such as the lock.
    pub service: Option<ServiceName>,
    pub stage: Stage,
    /// Whether the primary container was recreated or stopped.
    pub primary_touched: bool,
    pub source: DeployError,
}

impl DeployFailure {
    pub fn new(
        service: &ServiceName,
        stage: Stage,
        primary_touched: bool,
        source: DeployError,
    ) -> Self {
        Self {
            service: Some(service.clone()),
            stage,
            primary_touched,
            source,
        }
    }

    /// Failure to take the stack lock; nothing was touched.
    pub fn lock(source: DeployError) -> Self {
        Self {
            service: None,
            stage: Stage::Lock,
            primary_touched: false,
            source,
        }
    }
}

impl From<DeployError> for DeployFailure {
    fn from(source: DeployError) -> Self {
        DeployFailure::lock(source)
    }
}

impl fmt::Display for DeployFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let touched = if self.primary_touched {
            "primary touched"
        } else {
            "primary untouched"
        };
        match &self.service {
            Some(service) => write!(
                f,
                "deploy of {} failed at {} ({}): {}",
                service, self.stage, touched, self.source
            ),
            None => write!(f, "deploy failed at {} ({}): {}", self.stage, touched, self.source),
        }
    }
}

impl std::error::Error for DeployFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_are_kebab_case() {
        assert_eq!(Stage::CanaryHealth.to_string(), "canary-health");
        assert_eq!(
            serde_json::to_string(&Stage::CanaryHealth).unwrap(),
            "\"canary-health\""
        );
    }

    #[test]
    fn failure_message_reports_stage_and_primary() {
        let failure = DeployFailure::new(
            &ServiceName::new("web").unwrap(),
            Stage::CanaryHealth,
            false,
            DeployError::Cancelled,
        );
        assert_eq!(
            failure.to_string(),
            "deploy of web failed at canary-health (primary untouched): deploy cancelled"
        );
    }
}
