use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use probe_agent::cli::{Cli, Command};
use probe_agent::config::{Config, default_config_path, normalize_toml_path};
use probe_agent::error::ConfigError;
use probe_agent::orchestrator::{Agent, shutdown::spawn_signal_listener};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    logger::init_tracing();

    let cli = Cli::parse();
    let result = match cli.command() {
        Command::Run => run(&cli).await,
        Command::ShowConfig => show_config(&cli),
        Command::InitConfig { force } => init_config(&cli, force),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    Config::load(cli.config.as_deref(), &cli.overrides()).context("Failed to load configuration")
}

async fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let shutdown = CancellationToken::new();
    let mut agent = Agent::from_config(&config, shutdown.clone())?;

    info!(server_url = %config.directory.server_url, "Probe configured");
    let listener = spawn_signal_listener(shutdown.clone());

    let outcome = tokio::spawn(async move { agent.run().await }).await;
    shutdown.cancel();
    listener.await.ok();

    outcome.context("Probe agent stopped unexpectedly")
}

fn show_config(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    print!("{config}");
    Ok(())
}

fn init_config(cli: &Cli, force: bool) -> Result<()> {
    let path = match &cli.config {
        Some(path) => normalize_toml_path(path),
        None => default_config_path()?,
    };
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists(path).into());
    }

    let mut config = Config::default();
    config.apply_overrides(&cli.overrides());
    config.validate()?;
    config.write_config(&path)?;

    info!(path = %path.display(), "Configuration written");
    Ok(())
}
