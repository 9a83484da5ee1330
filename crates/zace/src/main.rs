use anyhow::Result;
use clap::Parser;

mod cli;
mod doctor;
mod orchestrator;
mod orchestrator_execute;
mod orchestrator_guardrails;
mod run_cmd;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { task, cd, max_steps } => {
            let exit_code = run_cmd::handle_run(task, cd, max_steps).await?;
            std::process::exit(exit_code);
        }
        Commands::Doctor { cd } => {
            doctor::run_doctor(cd).await?;
        }
    }

    Ok(())
}
