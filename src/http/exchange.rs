//! Captured HTTP exchange records and their classification.

use std::time::Duration;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::delivery::message::{LogLevel, MessageType};

/// Request side of an exchange, captured before the handler runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestRecord {
    pub method: String,
    pub url: String,
    pub path: String,
    pub query_string: Option<String>,
    pub headers: Map<String, Value>,
    pub body: Option<Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub user_id: Option<String>,
    pub timestamp: String,
    pub request_id: String,
}

/// Response side of an exchange, captured after the handler returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponseRecord {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Map<String, Value>,
    pub body: Option<Value>,
    pub execution_time_ms: f64,
    pub execution_time_seconds: f64,
    pub response_size: u64,
    pub slow_request: bool,
}

/// Both halves of one logged request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpExchangeRecord {
    pub request: HttpRequestRecord,
    pub response: HttpResponseRecord,
}

/// Severity bucket of a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Error,
    Warning,
    Redirect,
    Success,
}

impl StatusClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusClass::Error => "error",
            StatusClass::Warning => "warning",
            StatusClass::Redirect => "redirect",
            StatusClass::Success => "success",
        }
    }

    pub fn severity(&self) -> LogLevel {
        match self {
            StatusClass::Error => LogLevel::Error,
            StatusClass::Warning => LogLevel::Warning,
            StatusClass::Redirect | StatusClass::Success => LogLevel::Info,
        }
    }
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        500.. => StatusClass::Error,
        400..=499 => StatusClass::Warning,
        300..=399 => StatusClass::Redirect,
        _ => StatusClass::Success,
    }
}

/// `"404 Not Found"`; unknown codes read `"<code> Unknown"`.
pub fn status_text(status: u16) -> String {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    format!("{} {}", status, reason)
}

/// Strictly slower than the threshold, compared on the unrounded duration.
pub fn is_slow(elapsed: Duration, threshold_ms: u64) -> bool {
    elapsed > Duration::from_millis(threshold_ms)
}

/// Level and message type of the response record.
pub fn response_classification(status: u16, slow: bool) -> (LogLevel, MessageType) {
    let class = classify_status(status);
    let level = if slow {
        class.severity().most_severe(LogLevel::Warning)
    } else {
        class.severity()
    };
    let message_type = if slow {
        MessageType::SlowRequest
    } else if class == StatusClass::Error {
        MessageType::HttpError
    } else {
        MessageType::HttpResponse
    };
    (level, message_type)
}
