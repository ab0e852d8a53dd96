//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the telemetry
//! pipeline. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::delivery::message::LogLevel;

/// Root configuration for the telemetry pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Identity of the emitting service.
    pub service: ServiceConfig,

    /// Broker connection settings.
    pub broker: BrokerConfig,

    /// Per-channel overrides of the well-known queue policies.
    pub channels: ChannelsConfig,

    /// Central logger and fallback file settings.
    pub logging: LoggingConfig,

    /// HTTP interceptor settings.
    pub http_logging: HttpLoggingConfig,

    /// Diagnostics and metrics exposition.
    pub observability: ObservabilityConfig,

    /// Listener for the bundled service binary.
    pub listener: ListenerConfig,
}

/// Identity of the emitting service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service name stamped on every record.
    pub name: String,

    /// Deployment environment (production, staging, development).
    pub environment: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "unknown-service".to_string(),
            environment: None,
        }
    }
}

/// Broker connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Provider implementation ("amqp" or "memory").
    pub provider: String,

    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,

    /// Connection establishment timeout in seconds.
    pub connection_timeout_secs: u64,

    /// Upper bound for any single publish/declare/stats call, in seconds.
    pub read_write_timeout_secs: u64,

    /// AMQP heartbeat interval in seconds (0 disables).
    pub heartbeat_secs: u16,

    /// Accepted for compatibility; sends are never retried.
    pub retry_attempts: u32,

    /// Accepted for compatibility; sends are never retried.
    pub retry_delay_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            provider: "amqp".to_string(),
            host: "localhost".to_string(),
            port: 5672,
            user: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            connection_timeout_secs: 3,
            read_write_timeout_secs: 3,
            heartbeat_secs: 0,
            retry_attempts: 0,
            retry_delay_ms: 1000,
        }
    }
}

/// Overrides for the five well-known channels.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ChannelsConfig {
    pub log: ChannelOverride,
    pub metrics: ChannelOverride,
    pub events: ChannelOverride,
    pub business_events: ChannelOverride,
    pub performance: ChannelOverride,
}

/// Optional replacement values for one channel; unset fields keep the built-in policy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ChannelOverride {
    pub name: Option<String>,
    pub ttl_millis: Option<u64>,
    pub max_length: Option<u64>,
}

/// Central logger and fallback file settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Master switch for the central logger.
    pub enabled: bool,

    /// Write the local fallback file.
    pub local_logging: bool,

    /// Directory holding the fallback file.
    pub log_path: String,

    /// Fallback file name inside `log_path`.
    pub file_name: String,

    /// Levels relayed to the broker.
    pub broker_levels: Vec<LogLevel>,

    /// Levels written to the fallback file.
    pub file_levels: Vec<LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            local_logging: true,
            log_path: "logs".to_string(),
            file_name: "centralized.log".to_string(),
            broker_levels: LogLevel::ALL
                .into_iter()
                .filter(|level| *level != LogLevel::Debug)
                .collect(),
            file_levels: LogLevel::ALL.to_vec(),
        }
    }
}

/// HTTP interceptor settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpLoggingConfig {
    pub enabled: bool,

    /// Allow-list of `METHOD:path` specs; `*` admits everything.
    pub endpoints: Vec<String>,

    /// Path prefixes never logged.
    pub excluded_paths: Vec<String>,

    /// Methods never logged (case-insensitive).
    pub excluded_methods: Vec<String>,

    /// Hosts never logged, including their subdomains.
    pub excluded_domains: Vec<String>,

    pub sensitive_headers: Vec<String>,
    pub sensitive_body_fields: Vec<String>,
    pub sensitive_response_fields: Vec<String>,

    pub log_request_body: bool,
    pub log_response_body: bool,

    /// Bodies larger than this many bytes are omitted.
    pub max_body_size: usize,

    /// Requests slower than this many milliseconds are flagged.
    pub slow_request_threshold_ms: u64,
}

impl Default for HttpLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoints: vec!["*".to_string()],
            excluded_paths: strings(&[
                "/health",
                "/metrics",
                "/favicon.ico",
                "/robots.txt",
                "/.well-known",
            ]),
            excluded_methods: strings(&["OPTIONS"]),
            excluded_domains: Vec::new(),
            sensitive_headers: strings(&[
                "authorization",
                "cookie",
                "x-api-key",
                "x-auth-token",
                "x-csrf-token",
                "x-forwarded-for",
                "x-real-ip",
            ]),
            sensitive_body_fields: strings(&[
                "password",
                "token",
                "secret",
                "api_key",
                "auth_token",
                "refresh_token",
                "access_token",
                "credit_card",
                "ssn",
            ]),
            sensitive_response_fields: strings(&[
                "token",
                "access_token",
                "refresh_token",
                "secret",
                "password",
                "credit_card",
            ]),
            log_request_body: true,
            log_response_body: false,
            max_body_size: 1024 * 1024, // 1MB
            slow_request_threshold_ms: 2000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Diagnostic log filter (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit diagnostics as JSON instead of human-readable lines.
    pub json_logs: bool,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Listener configuration for the bundled service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
