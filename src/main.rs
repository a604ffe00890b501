mod args;
mod commands;

use args::{Cli, Commands};
use clap::Parser;
use measure::{clienv, MeasureConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_filter = if cli.verbose { "measure=debug" } else { "measure=error" };
    let filter = clienv::log_filter().unwrap_or_else(|| default_filter.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let mut config = MeasureConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            daemon,
            step,
            command,
        } => {
            daemon.apply(&mut config, cli.verbose);
            let code = commands::run::cmd_run(config, step, command).await?;
            std::process::exit(code);
        }
        Commands::Emit {
            daemon,
            kind,
            name,
            value,
        } => {
            daemon.apply(&mut config, cli.verbose);
            commands::emit::cmd_emit(config, kind, &name, value).await?
        }
        Commands::Fingerprint { daemon } => {
            daemon.apply(&mut config, cli.verbose);
            commands::fingerprint::cmd_fingerprint(config)?
        }
    }

    Ok(())
}
