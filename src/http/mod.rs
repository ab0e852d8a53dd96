//! HTTP telemetry subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, trace + request ID layers)
//!     → interceptor.rs (telemetry middleware)
//!         → filter.rs    (log this request?)
//!         → redaction.rs (headers, bodies)
//!         → exchange.rs  (records, status bucket, slow flag)
//!     → handler
//!     → CentralLogger
//! ```

pub mod exchange;
pub mod filter;
pub mod interceptor;
pub mod redaction;
pub mod server;

pub use exchange::{HttpExchangeRecord, HttpRequestRecord, HttpResponseRecord, StatusClass};
pub use filter::EndpointFilter;
pub use interceptor::{
    telemetry_middleware, AuthenticatedUser, InterceptorPolicy, TelemetryInterceptor, X_REQUEST_ID,
};
pub use redaction::{Redactor, REDACTED};
pub use server::{build_router, AppState, HttpServer};
