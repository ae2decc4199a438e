// ABOUTME: Deployment state types for the type state pattern.
// ABOUTME: Each state carries exactly the data its transitions need.

use std::time::Duration;

use super::error::DeployError;
use super::host::ManifestSnapshot;
use super::strategy::DeployStrategy;
use super::version::VersionPlan;
use crate::manifest::ManifestDocument;
use crate::types::Version;

/// Initial state: nothing read from the host yet.
/// Available actions: `resolve()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Idle;

/// Manifest read and version planned.
/// Available actions: `build()`, `skip_build()`
#[derive(Debug)]
pub struct Resolved {
    pub(crate) snapshot: ManifestSnapshot,
    pub(crate) document: ManifestDocument,
    /// `None` for pre-built images, which carry no version.
    pub(crate) plan: Option<VersionPlan>,
}

/// Image available on the host.
/// Available actions: `choose_strategy()`, `finish_build()`
#[derive(Debug)]
pub struct Built {
    pub(crate) snapshot: ManifestSnapshot,
    pub(crate) document: ManifestDocument,
    pub(crate) version: Option<Version>,
    pub(crate) image: String,
}

/// How a canary attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanaryOutcome {
    /// Still in flight.
    Pending,
    Promoted,
    RolledBack,
    /// Ended by an error other than failed health, such as a promote failure.
    Aborted,
}

/// Everything needed to undo a canary.
#[derive(Debug)]
pub struct CanarySession {
    /// Manifest text before the canary entry was injected.
    pub snapshot: ManifestSnapshot,
    /// `{service}-canary`.
    pub container: String,
    pub deadline: Duration,
    pub outcome: CanaryOutcome,
}

/// Canary container started next to the primary.
/// Available actions: `health_check()`, `roll_back()`
#[derive(Debug)]
pub struct CanaryStarted {
    pub(crate) built: Built,
    pub(crate) session: CanarySession,
}

/// Canary passed its health check.
/// Available actions: `promote()`, `abandon()`
#[derive(Debug)]
pub struct CanaryHealthy {
    pub(crate) built: Built,
    pub(crate) session: CanarySession,
}

/// Primary recreated on the new version.
/// Available actions: `cleanup()`
#[derive(Debug)]
pub struct Promoted {
    pub(crate) version: Option<Version>,
    pub(crate) image: String,
    pub(crate) session: CanarySession,
}

/// Canary removed and the pre-canary manifest restored.
/// Available actions: `cleanup()`
#[derive(Debug)]
pub struct RolledBack {
    pub(crate) session: CanarySession,
    /// The failure that triggered the rollback.
    pub(crate) cause: DeployError,
}

/// Deploy finished successfully.
/// Available actions: `finish()`
#[derive(Debug)]
pub struct Done {
    pub(crate) version: Option<Version>,
    pub(crate) image: String,
    pub(crate) strategy: Option<DeployStrategy>,
    pub(crate) reason: Option<&'static str>,
}

/// States that own a live canary.
pub trait CanaryState {
    fn session(&self) -> &CanarySession;
}

impl CanaryState for CanaryStarted {
    fn session(&self) -> &CanarySession {
        &self.session
    }
}

impl CanaryState for CanaryHealthy {
    fn session(&self) -> &CanarySession {
        &self.session
    }
}

impl CanaryState for Promoted {
    fn session(&self) -> &CanarySession {
        &self.session
    }
}

impl CanaryState for RolledBack {
    fn session(&self) -> &CanarySession {
        &self.session
    }
}
