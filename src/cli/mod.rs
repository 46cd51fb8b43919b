//! CLI interface for binance-bridge
//!
//! Provides subcommands for:
//! - `run`: Start the bridge
//! - `health`: Query the health endpoint of a running bridge
//! - `config`: Show the effective configuration

mod health;
mod run;

pub use health::HealthArgs;
pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "binance-bridge")]
#[command(about = "Bridges Binance WebSocket market data onto NATS")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the bridge
    Run(RunArgs),
    /// Query the health endpoint of a running bridge
    Health(HealthArgs),
    /// Show the effective configuration
    Config,
}
