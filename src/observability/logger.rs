//! Central application logger.
//!
//! # Responsibilities
//! - Level methods (`emergency` .. `debug`) for application code
//! - Helpers for HTTP request/response, performance and business-event records
//! - Hand every record to the broker (via `DeliveryManager`) and the fallback file
//!
//! # Data Flow
//! ```text
//! logger.info("...", ctx)
//!     → enrich once (DeliveryManager::enrich_log)
//!     → DeliveryManager::publish_log   (if the level is relayed)
//!     → FallbackSink::write            (always attempted)
//! ```
//!
//! # Design Decisions
//! - The broker copy and the file copy are the same enriched envelope
//! - Plain level calls map to the matching application_* message type

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use crate::config::schema::LoggingConfig;
use crate::delivery::manager::DeliveryManager;
use crate::delivery::message::{LogEnvelope, LogLevel, LogRecord, MessageType};
use crate::observability::fallback::FallbackSink;

/// Where a record ended up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOutcome {
    pub relayed: bool,
    pub persisted_locally: bool,
}

/// Logging facade shared by application code and the HTTP interceptor.
#[derive(Clone)]
pub struct CentralLogger {
    delivery: Arc<DeliveryManager>,
    sink: Arc<FallbackSink>,
    enabled: bool,
    broker_levels: Arc<[LogLevel]>,
}

impl CentralLogger {
    /// Logger relaying every level.
    pub fn new(delivery: Arc<DeliveryManager>, sink: Arc<FallbackSink>) -> Self {
        Self {
            delivery,
            sink,
            enabled: true,
            broker_levels: Arc::from(LogLevel::ALL.as_slice()),
        }
    }

    pub fn from_config(delivery: Arc<DeliveryManager>, sink: Arc<FallbackSink>, config: &LoggingConfig) -> Self {
        Self {
            delivery,
            sink,
            enabled: config.enabled,
            broker_levels: Arc::from(config.broker_levels.as_slice()),
        }
    }

    pub fn delivery(&self) -> &Arc<DeliveryManager> {
        &self.delivery
    }

    pub fn sink(&self) -> &FallbackSink {
        &self.sink
    }

    /// Enrich `record`, relay it and write it to the fallback file.
    pub async fn emit(&self, record: LogRecord, message_type: MessageType) -> LogOutcome {
        if !self.enabled {
            return LogOutcome::default();
        }

        let envelope = self.delivery.enrich_log(record, message_type);
        let relayed = self.relay(&envelope).await;
        let persisted_locally = self.sink.write(&envelope);

        if !relayed && !persisted_locally {
            tracing::debug!(level = %envelope.level, message_type = %message_type, "Log record dropped");
        }
        LogOutcome {
            relayed,
            persisted_locally,
        }
    }

    async fn relay(&self, envelope: &LogEnvelope) -> bool {
        self.broker_levels.contains(&envelope.level) && self.delivery.publish_log(envelope).await
    }

    pub async fn log(&self, level: LogLevel, message: impl Into<String>, context: Map<String, Value>) -> LogOutcome {
        self.log_as(MessageType::for_level(level), level, message, context)
            .await
    }

    pub async fn log_as(
        &self,
        message_type: MessageType,
        level: LogLevel,
        message: impl Into<String>,
        context: Map<String, Value>,
    ) -> LogOutcome {
        let record = LogRecord::new(level, message)
            .with_service(self.delivery.service_name())
            .with_context(context);
        self.emit(record, message_type).await
    }

    pub async fn emergency(&self, message: impl Into<String>, context: Map<String, Value>) -> LogOutcome {
        self.log(LogLevel::Emergency, message, context).await
    }

    pub async fn alert(&self, message: impl Into<String>, context: Map<String, Value>) -> LogOutcome {
        self.log(LogLevel::Alert, message, context).await
    }

    pub async fn critical(&self, message: impl Into<String>, context: Map<String, Value>) -> LogOutcome {
        self.log(LogLevel::Critical, message, context).await
    }

    pub async fn error(&self, message: impl Into<String>, context: Map<String, Value>) -> LogOutcome {
        self.log(LogLevel::Error, message, context).await
    }

    pub async fn warning(&self, message: impl Into<String>, context: Map<String, Value>) -> LogOutcome {
        self.log(LogLevel::Warning, message, context).await
    }

    pub async fn notice(&self, message: impl Into<String>, context: Map<String, Value>) -> LogOutcome {
        self.log(LogLevel::Notice, message, context).await
    }

    pub async fn info(&self, message: impl Into<String>, context: Map<String, Value>) -> LogOutcome {
        self.log(LogLevel::Info, message, context).await
    }

    pub async fn debug(&self, message: impl Into<String>, context: Map<String, Value>) -> LogOutcome {
        self.log(LogLevel::Debug, message, context).await
    }

    pub async fn log_http_request(
        &self,
        method: &str,
        url: &str,
        headers: Map<String, Value>,
        body: Value,
    ) -> LogOutcome {
        let context = object(json!({
            "method": method,
            "url": url,
            "headers": headers,
            "body": body,
            "type": MessageType::HttpRequest.as_str(),
        }));
        self.log_as(MessageType::HttpRequest, LogLevel::Info, "HTTP Request", context)
            .await
    }

    pub async fn log_http_response(
        &self,
        status_code: u16,
        headers: Map<String, Value>,
        body: Value,
        duration: Duration,
    ) -> LogOutcome {
        let context = object(json!({
            "status_code": status_code,
            "headers": headers,
            "body": body,
            "duration_ms": millis(duration),
            "type": MessageType::HttpResponse.as_str(),
        }));
        self.log_as(MessageType::HttpResponse, LogLevel::Info, "HTTP Response", context)
            .await
    }

    /// Log a timing and publish it on the performance channel.
    pub async fn log_performance(
        &self,
        operation: &str,
        duration: Duration,
        metadata: Map<String, Value>,
    ) -> LogOutcome {
        let context = object(json!({
            "operation": operation,
            "duration_ms": millis(duration),
            "metadata": metadata,
            "type": "performance",
        }));
        let outcome = self
            .log_as(MessageType::PerformanceMetric, LogLevel::Info, "Performance Metric", context.clone())
            .await;
        if self.enabled && !self.delivery.send_performance(context).await {
            tracing::debug!(operation = %operation, "Performance record not relayed");
        }
        outcome
    }

    /// Log a business event and publish it on the business-events channel.
    pub async fn log_business_event(&self, event: &str, data: Map<String, Value>) -> LogOutcome {
        let context = object(json!({
            "event": event,
            "data": data,
            "type": MessageType::BusinessEvent.as_str(),
        }));
        let outcome = self
            .log_as(MessageType::BusinessEvent, LogLevel::Info, "Business Event", context.clone())
            .await;
        if self.enabled && !self.delivery.send_business_event(context).await {
            tracing::debug!(event = %event, "Business event not relayed");
        }
        outcome
    }
}

/// Milliseconds rounded to two decimals.
pub(crate) fn millis(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
