//! Ticketing platform telemetry pipeline.
//!
//! Application records flow through the `CentralLogger` to a durable message
//! broker, with a local JSON-lines fallback; an axum middleware captures,
//! filters and redacts HTTP exchanges on the way.

pub mod broker;
pub mod config;
pub mod delivery;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use broker::{build_provider, BrokerProvider, InMemoryProvider};
pub use config::schema::TelemetryConfig;
pub use delivery::{DeliveryManager, LogLevel, LogRecord, MessageType};
pub use http::{HttpServer, TelemetryInterceptor};
pub use lifecycle::Shutdown;
pub use observability::{CentralLogger, FallbackSink};
