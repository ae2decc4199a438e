// ABOUTME: Logs command implementation.
// ABOUTME: Streams compose logs of one service from the server.

use super::connect::{Project, connect, disconnect};
use skiff::deploy::host::service_logs;
use skiff::diagnostics::Diagnostics;
use skiff::error::Result;
use skiff::output::Output;

pub async fn logs(service: String, tail: usize, follow: bool, output: Output) -> Result<()> {
    let project = Project::load()?;
    let descriptor = project.service(&service)?;
    let mut diag = Diagnostics::default();

    let session = connect(&project.config.server, &output).await?;
    let result = service_logs(
        &session,
        project.stack.directory(),
        project.stack.project(),
        descriptor.name.as_str(),
        tail,
        follow,
    )
    .await;
    disconnect(session, &mut diag).await;
    result?;

    for warning in diag.warnings() {
        output.warning(&warning.message);
    }
    Ok(())
}
