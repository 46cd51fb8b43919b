use binance_bridge::cli::{Cli, Commands};
use binance_bridge::config::Config;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration; a missing file runs on full defaults
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize telemetry
    binance_bridge::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting bridge");
            args.execute(config).await?;
        }
        Commands::Health(args) => {
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Upstream: {}", config.upstream.url);
            println!("  Streams: {}", config.upstream.streams.join(", "));
            println!("  Bus: {} -> {}", config.bus.url, config.bus.subject);
            println!(
                "  Workers: {}, queue capacity: {}",
                config.bridge.worker_count, config.bridge.queue_capacity
            );
            println!(
                "  Breaker: threshold={}, recovery={}s",
                config.breaker.failure_threshold, config.breaker.recovery_timeout_secs
            );
            println!("  Health port: {}", config.health.port);
        }
    }

    Ok(())
}
