//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → environment variables (RABBITMQ_*, APP_*, HTTP_LOGGING_*)
//!     → environment profile (production / staging / development)
//!     → validation.rs (semantic checks, advisory)
//!     → TelemetryConfig, handed to the composition root
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → interceptor policy swapped atomically
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Only the HTTP interceptor policy is hot-reloadable; broker settings need a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::{
    BrokerConfig, ChannelOverride, ChannelsConfig, HttpLoggingConfig, ListenerConfig,
    LoggingConfig, ObservabilityConfig, ServiceConfig, TelemetryConfig,
};
pub use validation::validate_config;
pub use watcher::ConfigWatcher;
