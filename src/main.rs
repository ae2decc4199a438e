// ABOUTME: Entry point for the skiff CLI application.
// ABOUTME: Parses arguments, sets up logging and Ctrl-C handling, and dispatches commands.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use skiff::config;
use skiff::deploy::Cancellation;
use skiff::error::Result;
use skiff::output::{Output, OutputMode};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    if let Err(e) = run(cli.command, mode).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(command: Commands, mode: OutputMode) -> Result<()> {
    let output = Output::new(mode);
    match command {
        Commands::Init { project, force } => {
            let cwd = env::current_dir()?;
            config::init_config(&cwd, project.as_deref(), force)?;
            output.success(&format!("Wrote {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Deploy { service, force } => {
            let cancel = cancel_on_ctrl_c();
            commands::deploy(service, force, cancel, output).await
        }
        Commands::Rollback { service, force } => commands::rollback(service, force, output).await,
        Commands::Status => commands::status(output).await,
        Commands::Logs {
            service,
            tail,
            follow,
        } => commands::logs(service, tail, follow, output).await,
    }
}

/// First Ctrl-C cancels the deploy so it can roll back; a second one exits.
fn cancel_on_ctrl_c() -> Cancellation {
    let (handle, cancel) = Cancellation::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("Cancelling deploy, rolling back... (Ctrl-C again to abort)");
        handle.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
    cancel
}
