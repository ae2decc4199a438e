// ABOUTME: Deployment orchestration using the type state pattern.
// ABOUTME: Exports the state machine, the scheduler, rollback, and the stack lock.

mod attempt;
mod cancel;
mod dependencies;
mod deployment;
mod error;
pub mod health;
pub mod host;
pub mod image;
mod lock;
mod outcome;
mod rollback;
mod scheduler;
mod state;
mod status;
mod strategy;
mod transitions;
mod version;

pub use attempt::deploy_service;
pub use cancel::{CancelHandle, Cancellation};
pub use deployment::{DeployMode, DeployRequest, Deployment, Progress};
pub use error::{DeployError, DeployErrorKind, LockHolderInfo};
pub use lock::{DeployLock, LOCK_FILENAME, LockInfo};
pub use outcome::{DeployFailure, Deployed, Stage};
pub use rollback::rollback_service;
pub use scheduler::{deploy_all, deploy_one};
pub use state::{
    Built, CanaryHealthy, CanaryOutcome, CanarySession, CanaryStarted, CanaryState, Done, Idle,
    Promoted, Resolved, RolledBack,
};
pub use status::{ServiceStatus, stack_status};
pub use strategy::{DeployStrategy, Eligibility, REASON_FIRST_DEPLOY};
pub use transitions::TransitionResult;
pub use version::{VersionPlan, resolve_version};
