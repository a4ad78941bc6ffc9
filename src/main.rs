//! celltune - Main Entry Point

use celltune::cli::{cmd_describe, cmd_run, Cli, Commands};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "celltune=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { data, config, output, threads, seed, quick }) => {
            cmd_run(data.as_deref(), config.as_deref(), output.as_deref(), threads, seed, quick)?;
        }
        Some(Commands::Describe { data, label }) => {
            cmd_describe(&data, &label)?;
        }
        None => {
            cmd_run(None, None, None, None, None, false)?;
        }
    }

    Ok(())
}
