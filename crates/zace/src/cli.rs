use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "zace", version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Task-driven coding agent runtime")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a task to completion (or until it needs you).
    Run {
        /// Task prompt; reads from stdin if omitted.
        task: Option<String>,

        /// Working directory (defaults to CWD).
        #[arg(long)]
        cd: Option<PathBuf>,

        /// Override `maxSteps` for this run.
        #[arg(long)]
        max_steps: Option<u32>,
    },
    /// Print environment diagnostics: config, LSP servers, tool availability.
    Doctor {
        /// Working directory (defaults to CWD).
        #[arg(long)]
        cd: Option<PathBuf>,
    },
}
