//! Delivery subsystem.
//!
//! # Data Flow
//! ```text
//! CentralLogger / application code
//!     → manager.rs (connected? → enrich → resolve channel → options)
//!         → enrich.rs   (timestamp, host, pid, memory, service)
//!         → channels.rs (channel name and queue policy)
//!         → message.rs  (priority 10 for critical types)
//!     → BrokerProvider::send
//!
//! On connect:
//!     manager.rs → channels.rs provision → BrokerProvider::create_queue × 5
//! ```
//!
//! # Design Decisions
//! - One manager per process, shared by `Arc`, no global
//! - Send paths return `bool`; the caller decides whether to care

pub mod channels;
pub mod enrich;
pub mod manager;
pub mod message;

pub use channels::{ChannelKind, ChannelRegistry, ChannelSpec, ProvisionReport};
pub use enrich::Enricher;
pub use manager::{ConnectionState, ConsumerHandle, DeliveryManager};
pub use message::{
    DeliveryOptions, DeliveryOverrides, LogEnvelope, LogLevel, LogRecord, MessageType,
};
