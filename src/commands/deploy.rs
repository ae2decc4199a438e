// ABOUTME: Deploy command implementation.
// ABOUTME: Deploys one service or the whole stack and reports each result.

use super::connect::{Project, connect, disconnect};
use skiff::deploy::{
    Cancellation, DeployStrategy, Deployed, REASON_FIRST_DEPLOY, deploy_all, deploy_one,
};
use skiff::diagnostics::{Diagnostics, Warning};
use skiff::error::Result;
use skiff::output::Output;

/// Deploy `service`, or every service when `None`.
pub async fn deploy(
    service: Option<String>,
    force: bool,
    cancel: Cancellation,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let project = Project::load()?;
    let descriptor = service.as_deref().map(|name| project.service(name)).transpose()?;
    let mut diag = Diagnostics::default();

    match descriptor {
        Some(descriptor) => output.progress(&format!(
            "Deploying {} of {} to {}",
            descriptor.name,
            project.stack.project(),
            project.config.server.host
        )),
        None => output.progress(&format!(
            "Deploying {} service(s) of {} to {}",
            project.stack.len(),
            project.stack.project(),
            project.config.server.host
        )),
    }

    let session = connect(&project.config.server, &output).await?;
    output.progress("  → Acquiring deploy lock...");
    let result = match descriptor {
        Some(descriptor) => deploy_one(
            &session,
            &project.stack,
            &descriptor.name,
            force,
            &cancel,
            &output,
        )
        .await
        .map(|deployed| vec![deployed]),
        None => deploy_all(&session, &project.stack, force, &cancel, &output).await,
    };
    disconnect(session, &mut diag).await;

    let deployed = result?;
    for service in &deployed {
        report(service, &output, &mut diag);
    }

    // Emit collected warnings
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    output.success("Deployment complete!");
    Ok(())
}

fn report(deployed: &Deployed, output: &Output, diag: &mut Diagnostics) {
    if deployed.strategy == Some(DeployStrategy::Direct)
        && let Some(reason) = deployed.reason
        && reason != REASON_FIRST_DEPLOY
    {
        diag.warn(Warning::direct_start(format!(
            "{} recreated without a canary (brief downtime): {}",
            deployed.service, reason
        )));
    }

    let version = deployed
        .version
        .map(|version| format!(" v{version}"))
        .unwrap_or_default();
    let url = deployed
        .url
        .as_deref()
        .map(|url| format!(" at {url}"))
        .unwrap_or_default();
    output.progress(&format!(
        "  ✓ {}{} ({}){}",
        deployed.service, version, deployed.image, url
    ));
    output.record("deployed", deployed);
}
