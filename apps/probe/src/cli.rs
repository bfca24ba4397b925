use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Overrides;

#[derive(Debug, Parser)]
#[command(name = "probe-agent", version)]
#[command(about = "Ping probe agent: runs jobs from the directory service and reports the results.")]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/probe-agent/config.toml)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// API key identifying this probe (overrides API_KEY)
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Directory service base URL (overrides SERVER_URL)
    #[arg(long, global = true)]
    pub server_url: Option<String>,

    /// Seconds between job list refreshes
    #[arg(long, global = true)]
    pub fetch_interval: Option<u64>,

    /// Seconds between heartbeats
    #[arg(long, global = true)]
    pub heartbeat_interval: Option<u64>,

    /// Ping executable to invoke
    #[arg(long, global = true)]
    pub ping_program: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the agent loop until SIGINT/SIGTERM (default)
    Run,
    /// Print the effective configuration with the API key masked
    ShowConfig,
    /// Write the effective configuration to the config file
    InitConfig {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }

    pub fn overrides(&self) -> Overrides {
        Overrides {
            api_key: self.api_key.clone(),
            server_url: self.server_url.clone(),
            fetch_interval_seconds: self.fetch_interval,
            heartbeat_interval_seconds: self.heartbeat_interval,
            ping_program: self.ping_program.clone(),
        }
    }
}
