// ABOUTME: Drives one service through the deployment state machine.
// ABOUTME: Maps each failing transition to its stage and runs rollback where a canary exists.

use super::outcome::{DeployFailure, Deployed, Stage};
use super::state::CanaryStarted;
use super::strategy::DeployStrategy;
use super::{Cancellation, DeployMode, DeployRequest, Deployment};
use crate::remote::RemoteOps;

/// Deploy one service. The caller holds the stack lock.
///
/// A canary that fails to start or to become healthy is rolled back before
/// the failure is returned; the primary is untouched in that case.
pub async fn deploy_service<R: RemoteOps + ?Sized>(
    remote: &R,
    request: DeployRequest<'_>,
    cancel: &Cancellation,
) -> Result<Deployed, DeployFailure> {
    let name = &request.descriptor.name;

    let resolved = Deployment::new(request)
        .resolve(remote)
        .await
        .map_err(|e| DeployFailure::new(name, Stage::Prepare, false, e))?;

    let built = match request.mode {
        DeployMode::StartOnly => resolved.skip_build(),
        DeployMode::Full | DeployMode::BuildOnly => resolved
            .build(remote, cancel)
            .await
            .map_err(|e| DeployFailure::new(name, Stage::Build, false, e))?,
    };

    if request.mode == DeployMode::BuildOnly {
        tracing::info!("Built {} ({})", name, built.image());
        return Ok(built.finish_build().finish());
    }

    let eligibility = built
        .eligibility(remote)
        .await
        .map_err(|e| DeployFailure::new(name, Stage::Start, false, e))?;
    let (strategy, reason) = DeployStrategy::select(request.descriptor.strategy, &eligibility);

    match strategy {
        DeployStrategy::Direct => {
            if let Some(reason) = reason {
                tracing::info!("Starting {} directly: {}", name, reason);
            }
            match built.start_direct(remote, cancel, reason).await {
                Ok(done) => Ok(done.finish()),
                Err((deployment, e)) => Err(DeployFailure::new(
                    name,
                    Stage::Start,
                    deployment.primary_touched(),
                    e,
                )),
            }
        }
        DeployStrategy::Canary => {
            let started = match built.start_canary(remote, cancel).await {
                Ok(started) => started,
                Err((started, e)) => return Err(roll_back(remote, started, e, Stage::Start).await),
            };

            let healthy = match started.health_check(remote, cancel).await {
                Ok(healthy) => healthy,
                Err((started, e)) => {
                    return Err(roll_back(remote, started, e, Stage::CanaryHealth).await);
                }
            };

            match healthy.promote(remote).await {
                Ok(promoted) => Ok(promoted.cleanup(remote).await.complete().finish()),
                Err((healthy, e)) => {
                    let touched = healthy.primary_touched();
                    match healthy.abandon(remote, e).await {
                        Ok(abandoned) => Err(abandoned
                            .cleanup(remote)
                            .await
                            .into_failure(Stage::Promote)),
                        Err(e) => Err(DeployFailure::new(name, Stage::Rollback, touched, e)),
                    }
                }
            }
        }
    }
}

/// Roll a canary back and report `cause` at `stage`.
async fn roll_back<R: RemoteOps + ?Sized>(
    remote: &R,
    started: Deployment<'_, CanaryStarted>,
    cause: super::DeployError,
    stage: Stage,
) -> DeployFailure {
    let name = started.service_name();
    let touched = started.primary_touched();
    match started.roll_back(remote, cause).await {
        Ok(rolled_back) => rolled_back.cleanup(remote).await.into_failure(stage),
        Err(e) => DeployFailure::new(name, Stage::Rollback, touched, e),
    }
}
