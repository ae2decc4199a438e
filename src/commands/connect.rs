// ABOUTME: Shared helpers for commands that talk to the server.
// ABOUTME: Loads the stack from the current directory and opens and closes the SSH session.

use skiff::config::{Config, ServerConfig};
use skiff::diagnostics::{Diagnostics, Warning};
use skiff::error::{Error, Result};
use skiff::output::Output;
use skiff::ssh::Session;
use skiff::stack::{ServiceDescriptor, Stack};
use skiff::types::ServiceName;
use std::env;

/// Configuration and resolved stack of the project in the current directory.
pub struct Project {
    pub config: Config,
    pub stack: Stack,
}

impl Project {
    pub fn load() -> Result<Self> {
        let cwd = env::current_dir()?;
        let config = Config::discover(&cwd)?;
        let stack = config.into_stack(&cwd)?;
        Ok(Self { config, stack })
    }

    /// Look up a service named on the command line.
    pub fn service(&self, name: &str) -> Result<&ServiceDescriptor> {
        ServiceName::new(name)
            .ok()
            .and_then(|name| self.stack.service(&name))
            .ok_or_else(|| Error::UnknownService(name.to_string()))
    }
}

pub async fn connect(server: &ServerConfig, output: &Output) -> Result<Session> {
    output.progress(&format!("  → Connecting to {}...", server.host));
    Ok(Session::connect(server.ssh_session_config()).await?)
}

/// Close the session; failure is recorded, not returned.
pub async fn disconnect(session: Session, diag: &mut Diagnostics) {
    let host = session.host().to_string();
    if let Err(e) = session.disconnect().await {
        diag.warn(Warning::ssh_disconnect(format!(
            "SSH disconnect failed for {}: {}",
            host, e
        )));
    }
}
