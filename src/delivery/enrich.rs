//! Record enrichment.
//!
//! # Responsibilities
//! - Stamp runtime fields (timestamp, host, pid, memory) on log records
//! - Stamp the flat fields (timestamp, service_name, host) on metric/event maps
//!
//! # Design Decisions
//! - Caller-supplied values always win; enrichment only fills gaps
//! - JSON `null` counts as absent
//! - Hostname is resolved once per process

use std::sync::OnceLock;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::delivery::message::{LogEnvelope, LogRecord, MessageType};

/// RFC 3339 timestamp with millisecond precision in UTC.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Host name of this machine, falling back to `localhost`.
pub fn host_name() -> &'static str {
    static HOST: OnceLock<String> = OnceLock::new();
    HOST.get_or_init(|| {
        hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "localhost".to_string())
    })
}

/// Point-in-time view of the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub pid: u32,
    /// Resident set size in bytes.
    pub memory_usage: u64,
    /// Peak resident set size in bytes.
    pub memory_peak: u64,
}

impl ProcessSnapshot {
    pub fn capture() -> Self {
        let (memory_usage, memory_peak) = read_memory();
        Self {
            pid: std::process::id(),
            memory_usage,
            memory_peak,
        }
    }
}

#[cfg(target_os = "linux")]
fn read_memory() -> (u64, u64) {
    match std::fs::read_to_string("/proc/self/status") {
        Ok(status) => (
            status_kib(&status, "VmRSS:") * 1024,
            status_kib(&status, "VmHWM:") * 1024,
        ),
        Err(_) => (0, 0),
    }
}

#[cfg(not(target_os = "linux"))]
fn read_memory() -> (u64, u64) {
    (0, 0)
}

#[cfg(target_os = "linux")]
fn status_kib(status: &str, key: &str) -> u64 {
    status
        .lines()
        .find_map(|line| line.strip_prefix(key))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// Fills default fields on outgoing records.
#[derive(Debug, Clone)]
pub struct Enricher {
    service_name: String,
}

impl Enricher {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Turn a caller record into the complete wire envelope.
    pub fn enrich_log(&self, record: LogRecord, message_type: MessageType) -> LogEnvelope {
        let process = ProcessSnapshot::capture();
        let service = record
            .service
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.service_name.clone());

        LogEnvelope {
            service_name: service.clone(),
            service,
            level: record.level,
            message: record.message,
            context: record.context,
            timestamp: record.timestamp.unwrap_or_else(now_rfc3339),
            host: record.host.unwrap_or_else(|| host_name().to_string()),
            pid: record.pid.unwrap_or(process.pid),
            memory_usage: record.memory_usage.unwrap_or(process.memory_usage),
            memory_peak: record.memory_peak.unwrap_or(process.memory_peak),
            message_type,
            log_level: message_type.log_level(),
        }
    }

    /// Flat enrichment used by the metric, event and performance channels.
    pub fn enrich_flat(&self, mut data: Map<String, Value>) -> Map<String, Value> {
        if is_absent(&data, "timestamp") {
            data.insert("timestamp".to_string(), Value::String(now_rfc3339()));
        }
        let service_name = match data.get("service") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => self.service_name.clone(),
        };
        data.insert("service_name".to_string(), Value::String(service_name));
        if is_absent(&data, "host") {
            data.insert("host".to_string(), Value::String(host_name().to_string()));
        }
        data
    }
}

fn is_absent(data: &Map<String, Value>, key: &str) -> bool {
    matches!(data.get(key), None | Some(Value::Null))
}
