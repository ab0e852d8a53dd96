//! Delivery coordination.
//!
//! # Responsibilities
//! - Own the broker provider and the channel registry
//! - Connect, provision channels, and track the connection state
//! - Enrich outgoing records and route them to their channel
//! - Run consumers on their own tasks
//!
//! # Design Decisions
//! - Constructed once by the composition root and shared as `Arc<DeliveryManager>`
//! - No send path panics or returns an error; failure is `false`
//! - Provider sends and declares are serialized by one async mutex
//! - A failed send never changes the connection state; only `connect`/`disconnect` do

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::broker::{build_provider, BrokerProvider, ConsumeOutcome, MessageHandler, QueueStats};
use crate::config::loader::ConfigError;
use crate::config::schema::TelemetryConfig;
use crate::delivery::channels::{ChannelKind, ChannelRegistry, ProvisionReport};
use crate::delivery::enrich::Enricher;
use crate::delivery::message::{
    DeliveryOptions, DeliveryOverrides, LogEnvelope, LogRecord, MessageType,
};
use crate::observability::metrics;

/// Connection state of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// A running consumer.
#[derive(Debug)]
pub struct ConsumerHandle {
    /// Resolves to `false` if the consumer could not start.
    pub join: JoinHandle<bool>,
    /// One outcome per consumed message.
    pub outcomes: mpsc::UnboundedReceiver<ConsumeOutcome>,
}

/// Shared coordinator between application code and the broker.
pub struct DeliveryManager {
    provider: Arc<dyn BrokerProvider>,
    registry: ChannelRegistry,
    enricher: Enricher,
    connected: AtomicBool,
    io_lock: Mutex<()>,
}

impl DeliveryManager {
    pub fn new(provider: Arc<dyn BrokerProvider>, registry: ChannelRegistry, service_name: impl Into<String>) -> Self {
        Self {
            provider,
            registry,
            enricher: Enricher::new(service_name),
            connected: AtomicBool::new(false),
            io_lock: Mutex::new(()),
        }
    }

    /// Build the provider named in the config. Does not connect.
    pub fn from_config(config: &TelemetryConfig) -> Result<Self, ConfigError> {
        let provider = build_provider(&config.broker)?;
        Ok(Self::new(
            provider,
            ChannelRegistry::from_config(&config.channels),
            config.service.name.clone(),
        ))
    }

    /// Connect and provision every channel. `false` means degraded mode.
    pub async fn connect(&self) -> bool {
        let _io = self.io_lock.lock().await;

        if !self.provider.connect().await {
            self.connected.store(false, Ordering::SeqCst);
            metrics::set_broker_connected(false);
            tracing::warn!(provider = self.provider.name(), "Delivery degraded: broker not connected");
            return false;
        }

        self.connected.store(true, Ordering::SeqCst);
        metrics::set_broker_connected(true);
        let report: ProvisionReport = self.registry.provision(self.provider.as_ref()).await;
        if !report.is_complete() {
            tracing::warn!(failed = ?report.failed, "Some channels could not be provisioned");
        }
        true
    }

    pub async fn disconnect(&self) {
        let _io = self.io_lock.lock().await;
        self.provider.disconnect().await;
        self.connected.store(false, Ordering::SeqCst);
        metrics::set_broker_connected(false);
    }

    pub async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.provider.is_connected().await
    }

    pub async fn connection_state(&self) -> ConnectionState {
        if self.is_connected().await {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn service_name(&self) -> &str {
        self.enricher.service_name()
    }

    /// Enrich a record without sending it.
    pub fn enrich_log(&self, record: LogRecord, message_type: MessageType) -> LogEnvelope {
        self.enricher.enrich_log(record, message_type)
    }

    /// Enrich and publish a log record on the log channel.
    pub async fn send_log(&self, record: LogRecord, message_type: MessageType) -> bool {
        if !self.is_connected().await {
            return false;
        }
        let envelope = self.enrich_log(record, message_type);
        self.publish_log(&envelope).await
    }

    /// Publish an already enriched envelope on the log channel.
    pub async fn publish_log(&self, envelope: &LogEnvelope) -> bool {
        if !self.is_connected().await {
            return false;
        }
        let payload = match serde_json::to_value(envelope) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Log envelope could not be serialized");
                return false;
            }
        };
        let options = DeliveryOptions::for_message_type(envelope.message_type);
        self.dispatch(self.registry.name(ChannelKind::Log), &payload, &options)
            .await
    }

    pub async fn send_metric(&self, data: Map<String, Value>) -> bool {
        self.send_flat(ChannelKind::Metrics, data).await
    }

    pub async fn send_event(&self, data: Map<String, Value>) -> bool {
        self.send_flat(ChannelKind::Events, data).await
    }

    pub async fn send_business_event(&self, data: Map<String, Value>) -> bool {
        self.send_flat(ChannelKind::BusinessEvents, data).await
    }

    pub async fn send_performance(&self, data: Map<String, Value>) -> bool {
        self.send_flat(ChannelKind::Performance, data).await
    }

    /// Publish arbitrary data to any queue. The queue is not checked against the registry.
    pub async fn send(&self, queue: &str, data: Value, overrides: DeliveryOverrides) -> bool {
        if !self.is_connected().await {
            return false;
        }
        let options = DeliveryOptions::default().merged(overrides);
        self.dispatch(queue, &data, &options).await
    }

    /// Start consuming `queue` on a dedicated task until `shutdown` fires.
    pub fn spawn_consumer(
        &self,
        queue: &str,
        handler: MessageHandler,
        shutdown: broadcast::Receiver<()>,
    ) -> ConsumerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let provider = Arc::clone(&self.provider);
        let queue = queue.to_string();

        let join = tokio::spawn(async move { provider.receive(&queue, handler, tx, shutdown).await });
        ConsumerHandle { join, outcomes: rx }
    }

    pub async fn queue_stats(&self, queue: &str) -> Option<QueueStats> {
        if !self.is_connected().await {
            return None;
        }
        self.provider.stats(queue).await
    }

    pub async fn delete_queue(&self, queue: &str) -> bool {
        if !self.is_connected().await {
            return false;
        }
        let _io = self.io_lock.lock().await;
        self.provider.delete_queue(queue).await
    }

    async fn send_flat(&self, kind: ChannelKind, data: Map<String, Value>) -> bool {
        if !self.is_connected().await {
            return false;
        }
        let payload = Value::Object(self.enricher.enrich_flat(data));
        self.dispatch(self.registry.name(kind), &payload, &DeliveryOptions::default())
            .await
    }

    async fn dispatch(&self, queue: &str, payload: &Value, options: &DeliveryOptions) -> bool {
        let ok = {
            let _io = self.io_lock.lock().await;
            self.provider.send(queue, payload, options).await
        };
        metrics::record_publish(queue, ok);
        if !ok {
            tracing::debug!(queue = %queue, provider = self.provider.name(), "Message not delivered");
        }
        ok
    }
}
