// ABOUTME: Multi-service deploys: build everything first, then start in dependency order.
// ABOUTME: The whole invocation runs under one stack lock.

use super::attempt::deploy_service;
use super::outcome::{DeployFailure, Deployed, Stage};
use super::{Cancellation, DeployError, DeployLock, DeployMode, DeployRequest, Progress};
use crate::remote::RemoteOps;
use crate::stack::Stack;
use crate::types::ServiceName;

/// Deploy every service of `stack`.
///
/// Images are built in name order with nothing started. Services are then
/// started in [`Stack::start_order`], each with its own strategy. The first
/// failure stops the run; services already started stay on their new version.
pub async fn deploy_all<R: RemoteOps + ?Sized>(
    remote: &R,
    stack: &Stack,
    force: bool,
    cancel: &Cancellation,
    progress: &dyn Progress,
) -> Result<Vec<Deployed>, DeployFailure> {
    DeployLock::with_lock(remote, stack.directory(), force, async {
        for descriptor in stack.services() {
            if cancel.is_cancelled() {
                return Err(cancelled(&descriptor.name, Stage::Build));
            }
            let request = DeployRequest::new(descriptor)
                .in_stack(stack)
                .mode(DeployMode::BuildOnly)
                .progress(progress);
            deploy_service(remote, request, cancel).await?;
        }

        let mut deployed = Vec::with_capacity(stack.len());
        for descriptor in stack.start_order() {
            if cancel.is_cancelled() {
                return Err(cancelled(&descriptor.name, Stage::Start));
            }
            let request = DeployRequest::new(descriptor)
                .in_stack(stack)
                .mode(DeployMode::StartOnly)
                .progress(progress);
            deployed.push(deploy_service(remote, request, cancel).await?);
        }

        Ok(deployed)
    })
    .await
}

/// Deploy one service of `stack`, starting its direct dependencies as needed.
pub async fn deploy_one<R: RemoteOps + ?Sized>(
    remote: &R,
    stack: &Stack,
    service: &ServiceName,
    force: bool,
    cancel: &Cancellation,
    progress: &dyn Progress,
) -> Result<Deployed, DeployFailure> {
    let Some(descriptor) = stack.service(service) else {
        return Err(DeployFailure {
            service: None,
            stage: Stage::Prepare,
            primary_touched: false,
            source: DeployError::UnknownService(service.to_string()),
        });
    };

    DeployLock::with_lock(remote, stack.directory(), force, async {
        let request = DeployRequest::new(descriptor)
            .in_stack(stack)
            .progress(progress);
        deploy_service(remote, request, cancel).await
    })
    .await
}

fn cancelled(service: &ServiceName, stage: Stage) -> DeployFailure {
    DeployFailure::new(service, stage, false, DeployError::Cancelled)
}
