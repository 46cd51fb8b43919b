//! Health command: query a running bridge over its HTTP surface

use crate::config::Config;
use anyhow::Context;
use clap::Args;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Port of the health endpoint (defaults to the configured port)
    #[arg(long)]
    pub port: Option<u16>,
}

impl HealthArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let port = self.port.unwrap_or(config.health.port);
        let url = format!("http://localhost:{}/healthz", port);

        let response = reqwest::Client::new()
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .with_context(|| format!("health check request to {} failed", url))?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or_default();

        if status.is_success() {
            println!("Service is healthy");
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        } else {
            println!("Service is unhealthy: {}", status);
            println!("{}", serde_json::to_string_pretty(&body)?);
            anyhow::bail!("service reported unhealthy status")
        }
    }
}
