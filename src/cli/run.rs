//! Run command: bring the bridge up and hold it until shutdown

use crate::config::Config;
use crate::health;
use crate::supervisor::Supervisor;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Override the upstream WebSocket URL
    #[arg(long)]
    pub ws_url: Option<String>,

    /// Comma-separated list of streams to subscribe to
    #[arg(long)]
    pub streams: Option<String>,

    /// Override the NATS server URL
    #[arg(long)]
    pub nats_url: Option<String>,

    /// Override the publish subject
    #[arg(long)]
    pub subject: Option<String>,

    /// Override the worker count
    #[arg(long)]
    pub workers: Option<usize>,
}

impl RunArgs {
    /// Fold CLI overrides into the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(ws_url) = &self.ws_url {
            config.upstream.url = ws_url.clone();
        }
        if let Some(streams) = &self.streams {
            config.upstream.streams = streams
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(nats_url) = &self.nats_url {
            config.bus.url = nats_url.clone();
        }
        if let Some(subject) = &self.subject {
            config.bus.subject = subject.clone();
        }
        if let Some(workers) = self.workers {
            config.bridge.worker_count = workers;
        }
    }

    pub async fn execute(&self, mut config: Config) -> Result<()> {
        self.apply(&mut config);
        config.normalize();

        let mut supervisor = Supervisor::new(config.clone());

        let health_task = if config.health.enabled {
            let view = supervisor.view();
            let shutdown = supervisor.subscribe_shutdown();
            Some(tokio::spawn(async move {
                if let Err(e) = health::serve(config.health.port, view, shutdown).await {
                    tracing::error!(error = %e, "Health server failed");
                }
            }))
        } else {
            None
        };

        let deadline = config.bridge.shutdown_timeout();
        if let Err(e) = supervisor.start().await {
            supervisor.stop(deadline).await;
            if let Some(health_task) = health_task {
                let _ = health_task.await;
            }
            return Err(e.into());
        }

        let fatal = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                None
            }
            result = supervisor.wait() => result.err(),
        };

        supervisor.stop(deadline).await;
        if let Some(health_task) = health_task {
            let _ = health_task.await;
        }

        match fatal {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
