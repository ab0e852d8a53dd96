//! Ticketing telemetry service.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                 TELEMETRY SERVICE                     │
//!                      │                                                       │
//!   Client Request     │  ┌─────────┐   ┌─────────────┐   ┌──────────┐        │
//!   ───────────────────┼─▶│  http   │──▶│ interceptor │──▶│ handlers │        │
//!                      │  │ server  │   │ filter/redact│  └──────────┘        │
//!                      │  └─────────┘   └──────┬──────┘                       │
//!                      │                       ▼                               │
//!                      │               ┌───────────────┐   ┌──────────────┐   │
//!                      │               │ CentralLogger │──▶│ FallbackSink │   │
//!                      │               └──────┬────────┘   └──────────────┘   │
//!                      │                      ▼                                │
//!                      │            ┌──────────────────┐   ┌──────────────┐    │   Broker
//!                      │            │ DeliveryManager  │──▶│BrokerProvider│────┼──▶ queues
//!                      │            │ enrich + channels│   │ amqp / memory│    │
//!                      │            └──────────────────┘   └──────────────┘    │
//!                      │                                                       │
//!                      │  Cross-cutting: config (+watcher), observability,     │
//!                      │  resilience (timeouts), lifecycle (shutdown)          │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use ticketing_telemetry::broker::MessageHandler;
use ticketing_telemetry::config::{load_config, load_from_env, validate_config, ConfigWatcher};
use ticketing_telemetry::delivery::DeliveryManager;
use ticketing_telemetry::http::{HttpServer, TelemetryInterceptor};
use ticketing_telemetry::lifecycle::{signals, Shutdown};
use ticketing_telemetry::observability::{logging, metrics, CentralLogger, FallbackSink};

#[derive(Debug, Parser)]
#[command(name = "ticketing-telemetry", version, about = "Ticketing telemetry service")]
struct Cli {
    /// Path to the TOML configuration file. Without it, defaults and environment are used.
    #[arg(short, long, env = "TELEMETRY_CONFIG")]
    config: Option<PathBuf>,

    /// Reload the HTTP logging policy when the config file changes.
    #[arg(long)]
    watch: bool,

    /// Consume and log messages from this queue while serving.
    #[arg(long)]
    consume: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };

    logging::init_tracing(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        service = %config.service.name,
        "ticketing-telemetry starting"
    );

    for problem in validate_config(&config) {
        tracing::warn!(problem = %problem, "Configuration problem");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                metrics::init_metrics(addr);
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let delivery = Arc::new(DeliveryManager::from_config(&config)?);
    if !delivery.connect().await {
        tracing::warn!(
            provider = delivery.provider_name(),
            "Starting without broker; records go to the fallback file only"
        );
    }

    let sink = Arc::new(FallbackSink::from_config(&config.logging));
    let logger = CentralLogger::from_config(delivery.clone(), sink, &config.logging);
    let interceptor = TelemetryInterceptor::new(&config.http_logging, logger);

    let shutdown = Shutdown::new();
    signals::trigger_on_signal(shutdown.clone());

    let (_watcher, config_updates) = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        _ => (None, mpsc::unbounded_channel().1),
    };

    if let Some(queue) = cli.consume.as_deref() {
        let handler: MessageHandler = Arc::new(|message: Value| {
            tracing::info!(message = %message, "Consumed message");
            Ok(())
        });
        let mut consumer = delivery.spawn_consumer(queue, handler, shutdown.subscribe());
        tokio::spawn(async move {
            while let Some(outcome) = consumer.outcomes.recv().await {
                tracing::debug!(outcome = ?outcome, "Consume outcome");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(delivery.clone(), interceptor);
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    delivery.disconnect().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
