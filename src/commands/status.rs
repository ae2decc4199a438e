// ABOUTME: Status command implementation.
// ABOUTME: Prints container state, health, and recorded version for every service.

use super::connect::{Project, connect, disconnect};
use skiff::deploy::stack_status;
use skiff::diagnostics::Diagnostics;
use skiff::error::Result;
use skiff::output::{Output, OutputMode};

pub async fn status(output: Output) -> Result<()> {
    let project = Project::load()?;
    let mut diag = Diagnostics::default();

    let session = connect(&project.config.server, &output).await?;
    let result = stack_status(&session, &project.stack).await;
    disconnect(session, &mut diag).await;
    let statuses = result?;

    for status in &statuses {
        if output.mode() == OutputMode::Json {
            output.record("status", status);
            continue;
        }

        let health = status
            .health
            .map(|health| format!(" ({health})"))
            .unwrap_or_default();
        let version = status
            .version
            .map(|version| format!("v{version}"))
            .or_else(|| status.image.clone())
            .unwrap_or_else(|| "not deployed".to_string());
        let canary = if status.canary { "  [canary present]" } else { "" };
        println!(
            "{:<20} {:<12} {}{}{}",
            status.service.as_str(),
            status.state,
            version,
            health,
            canary
        );
    }

    for warning in diag.warnings() {
        output.warning(&warning.message);
    }
    Ok(())
}
