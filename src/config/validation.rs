//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid, sizes > 0)
//! - Flag settings that are accepted but have no effect
//!
//! # Design Decisions
//! - Returns all problems, not just the first
//! - Validation is a pure function: TelemetryConfig → Vec<String>
//! - Problems are advisory; callers decide whether to continue

use std::net::SocketAddr;

use axum::http::Method;

use crate::broker::ProviderKind;
use crate::config::schema::TelemetryConfig;
use crate::http::filter::EndpointPattern;

/// Human-readable problems with `config`. Empty means valid.
pub fn validate_config(config: &TelemetryConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if config.service.name.trim().is_empty() {
        problems.push("service.name must not be empty".to_string());
    }

    let broker = &config.broker;
    if let Err(e) = broker.provider.parse::<ProviderKind>() {
        problems.push(e.to_string());
    }
    if broker.host.trim().is_empty() {
        problems.push("broker.host must not be empty".to_string());
    }
    if broker.port == 0 {
        problems.push("broker.port must be > 0".to_string());
    }
    if broker.connection_timeout_secs == 0 {
        problems.push("broker.connection_timeout_secs must be > 0".to_string());
    }
    if broker.read_write_timeout_secs == 0 {
        problems.push("broker.read_write_timeout_secs must be > 0".to_string());
    }
    if broker.retry_attempts > 0 {
        problems.push(format!(
            "broker.retry_attempts = {} has no effect: failed sends are not retried",
            broker.retry_attempts
        ));
    }

    let channels = &config.channels;
    for (key, o) in [
        ("log", &channels.log),
        ("metrics", &channels.metrics),
        ("events", &channels.events),
        ("business_events", &channels.business_events),
        ("performance", &channels.performance),
    ] {
        if o.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            problems.push(format!("channels.{}.name must not be empty", key));
        }
        if o.max_length == Some(0) {
            problems.push(format!("channels.{}.max_length must be > 0", key));
        }
    }

    let logging = &config.logging;
    if logging.local_logging && logging.file_name.trim().is_empty() {
        problems.push("logging.file_name must not be empty".to_string());
    }

    let http = &config.http_logging;
    if http.max_body_size == 0 && (http.log_request_body || http.log_response_body) {
        problems.push("http_logging.max_body_size is 0: bodies will never be captured".to_string());
    }
    for path in &http.excluded_paths {
        if !path.starts_with('/') {
            problems.push(format!(
                "http_logging.excluded_paths entry '{}' must start with '/'",
                path
            ));
        }
    }
    for spec in &http.endpoints {
        if spec == "*" {
            continue;
        }
        match spec.split_once(':') {
            Some((method, path)) if !method.is_empty() && path.starts_with('/') => {
                if Method::from_bytes(method.as_bytes()).is_err() {
                    problems.push(format!(
                        "http_logging.endpoints entry '{}' has an invalid method '{}'",
                        spec, method
                    ));
                } else if EndpointPattern::parse(spec).is_none() {
                    problems.push(format!("http_logging.endpoints entry '{}' is not a valid pattern", spec));
                }
            }
            _ => problems.push(format!(
                "http_logging.endpoints entry '{}' must look like METHOD:/path",
                spec
            )),
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        problems.push(format!(
            "observability.metrics_address '{}' is not a socket address",
            observability.metrics_address
        ));
    }
    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        problems.push(format!(
            "listener.bind_address '{}' is not a socket address",
            config.listener.bind_address
        ));
    }

    problems
}
