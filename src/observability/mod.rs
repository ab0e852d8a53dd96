//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Application records:
//!     → logger.rs   (CentralLogger: enrich, relay, persist)
//!     → fallback.rs (JSON-lines file, independent of the broker)
//!
//! Process diagnostics:
//!     → logging.rs (tracing subscriber, pretty or JSON)
//!     → metrics.rs (counters, gauges, histograms → Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Relayed records and process diagnostics are separate streams
//! - Metrics are cheap (atomic increments)

pub mod fallback;
pub mod logger;
pub mod logging;
pub mod metrics;

pub use fallback::FallbackSink;
pub use logger::{CentralLogger, LogOutcome};
