// ABOUTME: Error types for deploy operations.
// ABOUTME: Covers locking, remote failures, manifest shape, health timeouts, and rollback.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::manifest::ManifestError;
use crate::remote::RemoteError;
use crate::stack::WaitCondition;

/// Errors raised while deploying or rolling back a service.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Another deploy holds the lock for the target directory.
    #[error(
        "deploy already in progress in {directory} (held by {holder}, pid {pid}, since {started_at})"
    )]
    ConcurrentDeploy {
        directory: String,
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    /// The lock could not be created, read, or broken.
    #[error("deploy lock error: {0}")]
    Lock(String),

    /// A remote command failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The remote manifest has an unexpected shape.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The canary never became healthy.
    #[error("canary {container} not healthy within {}s", deadline.as_secs())]
    CanaryHealthTimeout { container: String, deadline: Duration },

    /// Rollback has nothing to go back to.
    #[error("no prior version of {service} to roll back to: {reason}")]
    NoPriorVersion { service: String, reason: String },

    /// A dependency has no manifest entry and cannot be started.
    #[error("{service} depends on {dependency}, which has never been deployed")]
    DependencyMissing { service: String, dependency: String },

    /// A dependency did not reach its wait condition in time.
    #[error("dependency {dependency} not {condition} within {}s", deadline.as_secs())]
    DependencyTimeout {
        dependency: String,
        condition: WaitCondition,
        deadline: Duration,
    },

    /// A dependency expected to complete exited with a failure status.
    #[error("dependency {dependency} exited with status {code}")]
    DependencyFailed { dependency: String, code: i64 },

    /// The caller interrupted the deploy.
    #[error("deploy cancelled")]
    Cancelled,

    /// Restoring the pre-deploy state failed after another failure.
    #[error("rollback after `{cause}` failed: {source}")]
    RollbackFailed {
        cause: String,
        #[source]
        source: Box<DeployError>,
    },

    /// The named service is not part of the stack.
    #[error("unknown service: {0}")]
    UnknownService(String),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    LockHeld,
    Lock,
    Remote,
    Manifest,
    CanaryHealthTimeout,
    NoPriorVersion,
    Dependency,
    Cancelled,
    RollbackFailed,
    UnknownService,
}

/// Who holds a contended deploy lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolderInfo {
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::ConcurrentDeploy { .. } => DeployErrorKind::LockHeld,
            DeployError::Lock(_) => DeployErrorKind::Lock,
            DeployError::Remote(_) => DeployErrorKind::Remote,
            DeployError::Manifest(_) => DeployErrorKind::Manifest,
            DeployError::CanaryHealthTimeout { .. } => DeployErrorKind::CanaryHealthTimeout,
            DeployError::NoPriorVersion { .. } => DeployErrorKind::NoPriorVersion,
            DeployError::DependencyMissing { .. }
            | DeployError::DependencyTimeout { .. }
            | DeployError::DependencyFailed { .. } => DeployErrorKind::Dependency,
            DeployError::Cancelled => DeployErrorKind::Cancelled,
            DeployError::RollbackFailed { .. } => DeployErrorKind::RollbackFailed,
            DeployError::UnknownService(_) => DeployErrorKind::UnknownService,
        }
    }

    pub fn lock_error(message: impl Into<String>) -> Self {
        DeployError::Lock(message.into())
    }

    pub fn no_prior_version(service: impl Into<String>, reason: impl Into<String>) -> Self {
        DeployError::NoPriorVersion {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Holder details when the error is a contended lock.
    pub fn lock_holder_info(&self) -> Option<LockHolderInfo> {
        match self {
            DeployError::ConcurrentDeploy {
                holder,
                pid,
                started_at,
                ..
            } => Some(LockHolderInfo {
                holder: holder.clone(),
                pid: *pid,
                started_at: *started_at,
            }),
            _ => None,
        }
    }
}
