//! Broker provider subsystem.
//!
//! # Data Flow
//! ```text
//! DeliveryManager
//!     → BrokerProvider (trait object, chosen by `broker.provider`)
//!         → amqp.rs   (lapin, publisher confirms, default exchange)
//!         → memory.rs (in-process queues, failure injection)
//! ```
//!
//! # Design Decisions
//! - Providers contain their own failures: operations report `bool` / `Option`
//!   and emit a diagnostic, they never return errors to the caller
//! - Internally failures are typed (`BrokerError`) up to that boundary
//! - Construction is the only fallible step (`ConfigError`)
//! - Consumers acknowledge only after the handler succeeded; handler errors requeue

pub mod amqp;
pub mod memory;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::config::loader::ConfigError;
use crate::config::schema::BrokerConfig;
use crate::delivery::channels::ChannelSpec;
use crate::delivery::message::DeliveryOptions;
use crate::resilience::timeouts::TimedOut;

pub use amqp::AmqpProvider;
pub use memory::InMemoryProvider;

/// Boxed error returned by message handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked once per consumed message.
pub type MessageHandler = Arc<dyn Fn(Value) -> Result<(), BoxError> + Send + Sync>;

/// Typed broker failure. Converted to `bool`/`None` at the provider boundary.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("not connected to broker")]
    NotConnected,

    #[error("broker unreachable: {0}")]
    Unreachable(String),

    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error(transparent)]
    Timeout(#[from] TimedOut),

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("broker rejected message for {queue}")]
    Rejected { queue: String },

    #[error("queue {queue} already exists with different arguments")]
    Conflict { queue: String },
}

/// Per-message result reported by a consume loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Handler succeeded, message acknowledged.
    Acked,
    /// Handler failed, message returned to the queue.
    Requeued { error: String },
    /// Payload was not JSON, message dropped.
    Discarded { error: String },
}

/// Depth and consumer count of one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub queue: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

/// Capability interface over a concrete message broker.
///
/// Each implementation encapsulates:
/// - Connection management
/// - Queue declaration with durability / TTL / max-length policy
/// - Publishing on the default exchange (routing key = queue name)
/// - A consume loop with manual acknowledgement
#[async_trait]
pub trait BrokerProvider: Send + Sync + 'static {
    /// Provider type name (e.g. "amqp", "memory").
    fn name(&self) -> &str;

    /// Open the connection. `false` means degraded mode.
    async fn connect(&self) -> bool;

    async fn disconnect(&self);

    async fn is_connected(&self) -> bool;

    /// Publish one payload to `queue`.
    async fn send(&self, queue: &str, payload: &Value, options: &DeliveryOptions) -> bool;

    /// Consume from `queue` until shutdown fires or the stream ends.
    ///
    /// Returns `false` if consumption could not be started.
    async fn receive(
        &self,
        queue: &str,
        handler: MessageHandler,
        outcomes: mpsc::UnboundedSender<ConsumeOutcome>,
        shutdown: broadcast::Receiver<()>,
    ) -> bool;

    /// Declare `name` with the given policy. Idempotent for identical policies.
    async fn create_queue(&self, name: &str, spec: &ChannelSpec) -> bool;

    async fn delete_queue(&self, name: &str) -> bool;

    async fn stats(&self, name: &str) -> Option<QueueStats>;
}

/// Known provider implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Amqp,
    Memory,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Amqp => "amqp",
            ProviderKind::Memory => "memory",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amqp" | "rabbitmq" => Ok(ProviderKind::Amqp),
            "memory" => Ok(ProviderKind::Memory),
            other => Err(ConfigError::Invalid {
                key: "broker.provider".to_string(),
                reason: format!("unknown provider '{}'", other),
            }),
        }
    }
}

/// Construct the provider named by `config.provider`.
pub fn build_provider(config: &BrokerConfig) -> Result<Arc<dyn BrokerProvider>, ConfigError> {
    let provider: Arc<dyn BrokerProvider> = match config.provider.parse::<ProviderKind>()? {
        ProviderKind::Amqp => Arc::new(AmqpProvider::from_config(config)?),
        ProviderKind::Memory => Arc::new(InMemoryProvider::new()),
    };
    tracing::debug!(provider = provider.name(), "Broker provider constructed");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("amqp".parse::<ProviderKind>().unwrap(), ProviderKind::Amqp);
        assert_eq!("RabbitMQ".parse::<ProviderKind>().unwrap(), ProviderKind::Amqp);
        assert_eq!("memory".parse::<ProviderKind>().unwrap(), ProviderKind::Memory);
        assert!("kafka".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_build_provider() {
        let config = BrokerConfig {
            provider: "memory".to_string(),
            ..Default::default()
        };
        assert_eq!(build_provider(&config).unwrap().name(), "memory");

        let amqp = build_provider(&BrokerConfig::default()).unwrap();
        assert_eq!(amqp.name(), "amqp");
    }

    #[test]
    fn test_build_provider_rejects_bad_params() {
        let config = BrokerConfig {
            host: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            build_provider(&config),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
