//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Broker call (connect, declare, publish, stats):
//!     → timeouts.rs (enforce connect / read-write deadline)
//!     → On expiry: operation reported as failed, caller degrades
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every broker call has a deadline
//! - Failed sends are not retried

pub mod timeouts;
