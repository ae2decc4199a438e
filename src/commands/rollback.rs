// ABOUTME: Rollback command implementation.
// ABOUTME: Reverts one service to the version before the one recorded, under the deploy lock.

use super::connect::{Project, connect, disconnect};
use skiff::deploy::{DeployLock, rollback_service};
use skiff::diagnostics::Diagnostics;
use skiff::error::Result;
use skiff::output::Output;

pub async fn rollback(service: String, force: bool, mut output: Output) -> Result<()> {
    output.start_timer();
    let project = Project::load()?;
    let descriptor = project.service(&service)?;
    let mut diag = Diagnostics::default();

    output.progress(&format!(
        "Rolling back {} on {}",
        descriptor.name, project.config.server.host
    ));

    let session = connect(&project.config.server, &output).await?;
    let result = DeployLock::with_lock(&session, project.stack.directory(), force, async {
        rollback_service(&session, descriptor).await
    })
    .await;
    disconnect(session, &mut diag).await;

    let rolled_back = result?;
    if let Some(version) = rolled_back.version {
        output.progress(&format!("  ✓ {} now on v{}", rolled_back.service, version));
    }
    output.record("rolled-back", &rolled_back);

    // Emit collected warnings
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    output.success("Rollback complete!");
    Ok(())
}
