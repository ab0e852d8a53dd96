//! Record and message-type definitions.
//!
//! # Responsibilities
//! - Define the closed set of message types and their fixed criticality/level mappings
//! - Define the caller-facing `LogRecord` and the enriched wire form `LogEnvelope`
//! - Define per-publish `DeliveryOptions`
//!
//! # Design Decisions
//! - Mappings are exhaustive `match`es, so adding a variant forces a decision
//! - `LogLevel` is ordered most severe first; `min` picks the more severe level
//! - Wire names are snake_case / lowercase strings

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Priority for ordinary messages.
pub const PRIORITY_NORMAL: u8 = 0;

/// Priority for messages whose type is critical.
pub const PRIORITY_CRITICAL: u8 = 10;

/// Syslog-style severity, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl LogLevel {
    pub const ALL: [LogLevel; 8] = [
        LogLevel::Emergency,
        LogLevel::Alert,
        LogLevel::Critical,
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Notice,
        LogLevel::Info,
        LogLevel::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Emergency => "emergency",
            LogLevel::Alert => "alert",
            LogLevel::Critical => "critical",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Notice => "notice",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    /// Returns whichever of the two levels is more severe.
    pub fn most_severe(self, other: LogLevel) -> LogLevel {
        self.min(other)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| format!("unknown log level '{}'", s))
    }
}

/// Category of a relayed log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    HttpRequest,
    HttpResponse,
    HttpError,
    ApplicationInfo,
    ApplicationError,
    ApplicationWarning,
    ApplicationDebug,
    PerformanceMetric,
    SlowRequest,
    MemoryUsage,
    BusinessEvent,
    UserAction,
    SystemEvent,
    SecurityAlert,
    Authentication,
    Authorization,
    DatabaseQuery,
    DatabaseError,
    DatabaseSlowQuery,
    ExternalApiCall,
    ExternalApiError,
    ExternalServiceTimeout,
}

impl MessageType {
    pub const ALL: [MessageType; 22] = [
        MessageType::HttpRequest,
        MessageType::HttpResponse,
        MessageType::HttpError,
        MessageType::ApplicationInfo,
        MessageType::ApplicationError,
        MessageType::ApplicationWarning,
        MessageType::ApplicationDebug,
        MessageType::PerformanceMetric,
        MessageType::SlowRequest,
        MessageType::MemoryUsage,
        MessageType::BusinessEvent,
        MessageType::UserAction,
        MessageType::SystemEvent,
        MessageType::SecurityAlert,
        MessageType::Authentication,
        MessageType::Authorization,
        MessageType::DatabaseQuery,
        MessageType::DatabaseError,
        MessageType::DatabaseSlowQuery,
        MessageType::ExternalApiCall,
        MessageType::ExternalApiError,
        MessageType::ExternalServiceTimeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::HttpRequest => "http_request",
            MessageType::HttpResponse => "http_response",
            MessageType::HttpError => "http_error",
            MessageType::ApplicationInfo => "application_info",
            MessageType::ApplicationError => "application_error",
            MessageType::ApplicationWarning => "application_warning",
            MessageType::ApplicationDebug => "application_debug",
            MessageType::PerformanceMetric => "performance_metric",
            MessageType::SlowRequest => "slow_request",
            MessageType::MemoryUsage => "memory_usage",
            MessageType::BusinessEvent => "business_event",
            MessageType::UserAction => "user_action",
            MessageType::SystemEvent => "system_event",
            MessageType::SecurityAlert => "security_alert",
            MessageType::Authentication => "authentication",
            MessageType::Authorization => "authorization",
            MessageType::DatabaseQuery => "database_query",
            MessageType::DatabaseError => "database_error",
            MessageType::DatabaseSlowQuery => "database_slow_query",
            MessageType::ExternalApiCall => "external_api_call",
            MessageType::ExternalApiError => "external_api_error",
            MessageType::ExternalServiceTimeout => "external_service_timeout",
        }
    }

    /// Critical messages are published at elevated priority.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            MessageType::ApplicationError
                | MessageType::HttpError
                | MessageType::SecurityAlert
                | MessageType::DatabaseError
                | MessageType::ExternalApiError
        )
    }

    pub fn is_performance(&self) -> bool {
        matches!(
            self,
            MessageType::PerformanceMetric
                | MessageType::SlowRequest
                | MessageType::MemoryUsage
                | MessageType::DatabaseSlowQuery
                | MessageType::ExternalServiceTimeout
        )
    }

    /// Level a consumer should file this message under.
    pub fn log_level(&self) -> LogLevel {
        match self {
            MessageType::ApplicationError
            | MessageType::HttpError
            | MessageType::SecurityAlert
            | MessageType::DatabaseError
            | MessageType::ExternalApiError => LogLevel::Error,

            MessageType::ApplicationWarning
            | MessageType::SlowRequest
            | MessageType::ExternalServiceTimeout => LogLevel::Warning,

            MessageType::ApplicationDebug
            | MessageType::DatabaseQuery
            | MessageType::MemoryUsage => LogLevel::Debug,

            MessageType::HttpRequest
            | MessageType::HttpResponse
            | MessageType::ApplicationInfo
            | MessageType::PerformanceMetric
            | MessageType::BusinessEvent
            | MessageType::UserAction
            | MessageType::SystemEvent
            | MessageType::Authentication
            | MessageType::Authorization
            | MessageType::DatabaseSlowQuery
            | MessageType::ExternalApiCall => LogLevel::Info,
        }
    }

    /// Application message type matching a plain log level.
    pub fn for_level(level: LogLevel) -> MessageType {
        match level {
            LogLevel::Emergency | LogLevel::Alert | LogLevel::Critical | LogLevel::Error => {
                MessageType::ApplicationError
            }
            LogLevel::Warning => MessageType::ApplicationWarning,
            LogLevel::Debug => MessageType::ApplicationDebug,
            LogLevel::Notice | LogLevel::Info => MessageType::ApplicationInfo,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A log record as produced by application code.
///
/// Only `level` and `message` are required; the runtime fields are filled in
/// by enrichment when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_peak: Option<u64>,
}

impl LogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            service: None,
            level,
            message: message.into(),
            context: Map::new(),
            timestamp: None,
            host: None,
            pid: None,
            memory_usage: None,
            memory_peak: None,
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// A fully enriched log message, exactly as it is relayed and persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEnvelope {
    pub service: String,
    pub service_name: String,
    pub level: LogLevel,
    pub message: String,
    pub context: Map<String, Value>,
    pub timestamp: String,
    pub host: String,
    pub pid: u32,
    pub memory_usage: u64,
    pub memory_peak: u64,
    pub message_type: MessageType,
    pub log_level: LogLevel,
}

/// Broker-level publish options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOptions {
    /// Ask the broker to persist the message to disk.
    pub persistent: bool,
    pub priority: u8,
    /// Unix timestamp (seconds) of publication.
    pub published_at: i64,
    pub content_type: String,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            persistent: true,
            priority: PRIORITY_NORMAL,
            published_at: Utc::now().timestamp(),
            content_type: "application/json".to_string(),
        }
    }
}

impl DeliveryOptions {
    /// Options for a log message of the given type.
    pub fn for_message_type(message_type: MessageType) -> Self {
        Self {
            priority: priority_for(message_type),
            ..Self::default()
        }
    }

    /// Apply caller-supplied overrides on top of these options.
    pub fn merged(mut self, overrides: DeliveryOverrides) -> Self {
        if let Some(persistent) = overrides.persistent {
            self.persistent = persistent;
        }
        if let Some(priority) = overrides.priority {
            self.priority = priority;
        }
        if let Some(published_at) = overrides.published_at {
            self.published_at = published_at;
        }
        if let Some(content_type) = overrides.content_type {
            self.content_type = content_type;
        }
        self
    }
}

/// Caller overrides for the generic send path; unset fields keep the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOverrides {
    pub persistent: Option<bool>,
    pub priority: Option<u8>,
    pub published_at: Option<i64>,
    pub content_type: Option<String>,
}

pub fn priority_for(message_type: MessageType) -> u8 {
    if message_type.is_critical() {
        PRIORITY_CRITICAL
    } else {
        PRIORITY_NORMAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_tracks_criticality() {
        for message_type in MessageType::ALL {
            let expected = if message_type.is_critical() { 10 } else { 0 };
            assert_eq!(priority_for(message_type), expected, "{}", message_type);
            assert_eq!(
                DeliveryOptions::for_message_type(message_type).priority,
                expected
            );
        }
    }

    #[test]
    fn test_critical_types_log_at_error() {
        let critical: Vec<_> = MessageType::ALL
            .into_iter()
            .filter(|t| t.is_critical())
            .collect();
        assert_eq!(critical.len(), 5);
        for message_type in critical {
            assert_eq!(message_type.log_level(), LogLevel::Error);
        }
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(MessageType::SlowRequest.log_level(), LogLevel::Warning);
        assert_eq!(MessageType::ExternalServiceTimeout.log_level(), LogLevel::Warning);
        assert_eq!(MessageType::MemoryUsage.log_level(), LogLevel::Debug);
        assert_eq!(MessageType::DatabaseQuery.log_level(), LogLevel::Debug);
        assert_eq!(MessageType::BusinessEvent.log_level(), LogLevel::Info);
        assert_eq!(MessageType::DatabaseSlowQuery.log_level(), LogLevel::Info);
    }

    #[test]
    fn test_wire_names_match_serde() {
        for message_type in MessageType::ALL {
            let json = serde_json::to_value(message_type).unwrap();
            assert_eq!(json, Value::String(message_type.as_str().to_string()));
        }
        assert_eq!(serde_json::to_value(LogLevel::Warning).unwrap(), "warning");
    }

    #[test]
    fn test_level_ordering() {
        assert_eq!(LogLevel::Info.most_severe(LogLevel::Warning), LogLevel::Warning);
        assert_eq!(LogLevel::Error.most_severe(LogLevel::Warning), LogLevel::Error);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_overrides_merge() {
        let merged = DeliveryOptions::default().merged(DeliveryOverrides {
            priority: Some(5),
            persistent: Some(false),
            ..Default::default()
        });
        assert_eq!(merged.priority, 5);
        assert!(!merged.persistent);
        assert_eq!(merged.content_type, "application/json");
    }
}
