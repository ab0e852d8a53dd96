//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use ticketing_telemetry::broker::InMemoryProvider;
use ticketing_telemetry::config::{HttpLoggingConfig, LoggingConfig, TelemetryConfig};
use ticketing_telemetry::delivery::{ChannelRegistry, DeliveryManager};
use ticketing_telemetry::http::{HttpServer, TelemetryInterceptor};
use ticketing_telemetry::lifecycle::Shutdown;
use ticketing_telemetry::observability::{CentralLogger, FallbackSink};

pub const LOG_QUEUE: &str = "log-messages";
pub const SERVICE: &str = "ticket-service";

/// A delivery stack over the in-memory broker, with its fallback file in a temp dir.
pub struct Harness {
    pub provider: Arc<InMemoryProvider>,
    pub delivery: Arc<DeliveryManager>,
    pub logger: CentralLogger,
    pub fallback: PathBuf,
    _dir: TempDir,
}

impl Harness {
    pub fn interceptor(&self, config: &HttpLoggingConfig) -> TelemetryInterceptor {
        TelemetryInterceptor::new(config, self.logger.clone())
    }

    /// Records on the log channel, oldest first.
    pub fn log_messages(&self) -> Vec<Value> {
        self.provider.messages(LOG_QUEUE)
    }

    /// Log-channel records of one message type.
    pub fn log_messages_of(&self, message_type: &str) -> Vec<Value> {
        self.log_messages()
            .into_iter()
            .filter(|m| m["message_type"] == message_type)
            .collect()
    }

    pub fn fallback_lines(&self) -> Vec<Value> {
        read_json_lines(&self.fallback)
    }
}

/// A connected harness.
pub async fn harness() -> Harness {
    build(InMemoryProvider::new(), true).await
}

/// A harness whose broker never accepts the connection.
pub async fn degraded_harness() -> Harness {
    build(InMemoryProvider::unreachable(), false).await
}

/// A harness built from `provider`, connected only if `connect` is set.
pub async fn harness_with(provider: InMemoryProvider, connect: bool) -> Harness {
    build(provider, connect).await
}

async fn build(provider: InMemoryProvider, connect: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(provider);
    let delivery = Arc::new(DeliveryManager::new(
        provider.clone(),
        ChannelRegistry::well_known(),
        SERVICE,
    ));
    if connect {
        delivery.connect().await;
    } else {
        assert!(!delivery.connect().await);
    }

    let fallback = dir.path().join("centralized.log");
    let sink = Arc::new(FallbackSink::new(&fallback));
    let logger = CentralLogger::from_config(delivery.clone(), sink, &LoggingConfig::default());

    Harness {
        provider,
        delivery,
        logger,
        fallback,
        _dir: dir,
    }
}

pub fn read_json_lines(path: &Path) -> Vec<Value> {
    match std::fs::read_to_string(path) {
        Ok(content) => content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).unwrap())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// A running HTTP server on an ephemeral port.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub config_updates: mpsc::UnboundedSender<TelemetryConfig>,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

impl RunningServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}

pub async fn spawn_server(delivery: Arc<DeliveryManager>, interceptor: TelemetryInterceptor) -> RunningServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (tx, rx) = mpsc::unbounded_channel();

    let server = HttpServer::new(delivery, interceptor);
    let handle = tokio::spawn(server.run(listener, rx, shutdown.subscribe()));

    RunningServer {
        addr,
        shutdown,
        config_updates: tx,
        handle,
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
