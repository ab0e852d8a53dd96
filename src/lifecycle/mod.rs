//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Tracing/metrics → Connect broker → Start listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → server drains, consumers stop → disconnect
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then delivery, then listeners
//! - A broker that is down at startup is not fatal (degraded mode)

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
