//! Configuration loading from disk and the environment.
//!
//! Precedence, lowest first: built-in defaults, TOML file, environment
//! variables, then the environment profile selected by `service.environment`
//! (or `APP_ENV`).

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::TelemetryConfig;
use crate::delivery::message::LogLevel;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Load configuration from a TOML file, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<TelemetryConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: TelemetryConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config)?;
    apply_environment_profile(&mut config);

    Ok(config)
}

/// Defaults plus environment overrides, for deployments without a config file.
pub fn load_from_env() -> Result<TelemetryConfig, ConfigError> {
    let mut config = TelemetryConfig::default();
    apply_env_overrides(&mut config)?;
    apply_environment_profile(&mut config);
    Ok(config)
}

pub fn apply_env_overrides(config: &mut TelemetryConfig) -> Result<(), ConfigError> {
    apply_env_overrides_from(config, |key| std::env::var(key).ok())
}

/// Apply overrides read through `lookup`. Empty values are ignored.
pub fn apply_env_overrides_from<F>(config: &mut TelemetryConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(v) = get("APP_NAME") {
        config.service.name = v;
    }
    if let Some(v) = get("APP_ENV") {
        config.service.environment = Some(v);
    }

    let broker = &mut config.broker;
    if let Some(v) = get("BROKER_PROVIDER") {
        broker.provider = v;
    }
    if let Some(v) = get("RABBITMQ_HOST") {
        broker.host = v;
    }
    if let Some(v) = get("RABBITMQ_PORT") {
        broker.port = parse("RABBITMQ_PORT", &v)?;
    }
    if let Some(v) = get("RABBITMQ_USER") {
        broker.user = v;
    }
    if let Some(v) = get("RABBITMQ_PASSWORD") {
        broker.password = v;
    }
    if let Some(v) = get("RABBITMQ_VHOST") {
        broker.vhost = v;
    }
    if let Some(v) = get("RABBITMQ_CONNECTION_TIMEOUT") {
        broker.connection_timeout_secs = parse("RABBITMQ_CONNECTION_TIMEOUT", &v)?;
    }
    if let Some(v) = get("RABBITMQ_READ_WRITE_TIMEOUT") {
        broker.read_write_timeout_secs = parse("RABBITMQ_READ_WRITE_TIMEOUT", &v)?;
    }
    if let Some(v) = get("RABBITMQ_HEARTBEAT") {
        broker.heartbeat_secs = parse("RABBITMQ_HEARTBEAT", &v)?;
    }

    let logging = &mut config.logging;
    if let Some(v) = get("LOG_PATH") {
        logging.log_path = v;
    }
    if let Some(v) = get("LOGGING_ENABLED") {
        logging.enabled = parse_bool("LOGGING_ENABLED", &v)?;
    }
    if let Some(v) = get("LOCAL_LOGGING") {
        logging.local_logging = parse_bool("LOCAL_LOGGING", &v)?;
    }

    let http = &mut config.http_logging;
    if let Some(v) = get("HTTP_LOGGING_ENABLED") {
        http.enabled = parse_bool("HTTP_LOGGING_ENABLED", &v)?;
    }
    if let Some(v) = get("HTTP_LOGGING_ENDPOINTS") {
        http.endpoints = split_list(&v);
    }
    if let Some(v) = get("HTTP_LOGGING_EXCLUDED_PATHS") {
        http.excluded_paths = split_list(&v);
    }
    if let Some(v) = get("HTTP_LOGGING_EXCLUDED_METHODS") {
        http.excluded_methods = split_list(&v);
    }
    if let Some(v) = get("HTTP_LOGGING_EXCLUDED_DOMAINS") {
        http.excluded_domains = split_list(&v);
    }
    if let Some(v) = get("HTTP_LOGGING_SENSITIVE_HEADERS") {
        http.sensitive_headers = split_list(&v);
    }
    if let Some(v) = get("HTTP_LOGGING_SENSITIVE_BODY_FIELDS") {
        http.sensitive_body_fields = split_list(&v);
    }
    if let Some(v) = get("HTTP_LOGGING_SENSITIVE_RESPONSE_FIELDS") {
        http.sensitive_response_fields = split_list(&v);
    }
    if let Some(v) = get("HTTP_LOGGING_REQUEST_BODY") {
        http.log_request_body = parse_bool("HTTP_LOGGING_REQUEST_BODY", &v)?;
    }
    if let Some(v) = get("HTTP_LOGGING_RESPONSE_BODY") {
        http.log_response_body = parse_bool("HTTP_LOGGING_RESPONSE_BODY", &v)?;
    }
    if let Some(v) = get("HTTP_LOGGING_MAX_BODY_SIZE") {
        http.max_body_size = parse("HTTP_LOGGING_MAX_BODY_SIZE", &v)?;
    }
    if let Some(v) = get("HTTP_LOGGING_SLOW_THRESHOLD") {
        http.slow_request_threshold_ms = parse("HTTP_LOGGING_SLOW_THRESHOLD", &v)?;
    }

    Ok(())
}

/// Adjust relay level and response-body capture for the deployment environment.
///
/// Unknown or unset environments leave the config untouched.
pub fn apply_environment_profile(config: &mut TelemetryConfig) {
    let Some(environment) = config.service.environment.as_deref() else {
        return;
    };

    let (threshold, log_response_body) = match environment.to_ascii_lowercase().as_str() {
        "production" => (LogLevel::Warning, false),
        "staging" => (LogLevel::Info, false),
        "development" => (LogLevel::Debug, true),
        _ => return,
    };

    config.logging.broker_levels = LogLevel::ALL
        .into_iter()
        .filter(|level| *level <= threshold)
        .collect();
    config.http_logging.log_response_body = log_response_body;
    tracing::debug!(environment = %environment, threshold = %threshold, "Environment profile applied");
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("'{}' is not a boolean", value),
        }),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
