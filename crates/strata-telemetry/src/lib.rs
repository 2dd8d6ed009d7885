//! Observability for Strata.
//!
//! - **Logging**: `tracing-subscriber` setup with JSON or pretty output
//! - **Request records**: one structured record per request, delivered to a
//!   [`RecordSink`] and routed by [`Severity`]

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod sink;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use sink::{MemorySink, RecordSink, RequestRecord, Severity, TracingSink, WatchRecord};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
