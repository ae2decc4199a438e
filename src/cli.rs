// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands, their arguments, and the global output flags.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "skiff")]
#[command(about = "Agentless canary deploys of compose stacks over SSH")]
#[command(version)]
pub struct Cli {
    /// Show debug logs
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print only final results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a skiff.yml template in the current directory
    Init {
        /// Project name (defaults to the directory name)
        #[arg(short, long)]
        project: Option<String>,

        /// Overwrite an existing skiff.yml
        #[arg(short, long)]
        force: bool,
    },

    /// Deploy one service, or every service of the stack
    Deploy {
        /// Service to deploy (all services when omitted)
        service: Option<String>,

        /// Break a deploy lock held by someone else
        #[arg(short, long)]
        force: bool,
    },

    /// Roll a service back to its previous version
    Rollback {
        service: String,

        /// Break a deploy lock held by someone else
        #[arg(short, long)]
        force: bool,
    },

    /// Show container state and deployed version of every service
    Status,

    /// Show logs of a service
    Logs {
        service: String,

        /// Number of lines to show from the end
        #[arg(short = 'n', long, default_value_t = 100)]
        tail: usize,

        /// Keep streaming new lines
        #[arg(short, long)]
        follow: bool,
    },
}
