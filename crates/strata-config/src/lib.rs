//! Typed configuration for Strata.
//!
//! - TOML and JSON configuration files
//! - `.env` files and environment variable overrides
//! - Strict parsing (unknown fields are rejected)
//! - Layered loading (defaults → file → env)
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//! request_timeout_secs = 30
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [proxy]
//! trusted_header = "x-forwarded-for"
//!
//! [rate_limits."/api/users"]
//! safe_requests = 10
//! max_requests = 30
//! in_seconds = 60
//! wait_seconds = 2
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables, for
//! example `STRATA__SERVER__HTTP_ADDR=0.0.0.0:9000`.

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{StrataConfig, StrataConfigBuilder};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{LogFormat, LoggingConfig, ProxyConfig, RateLimitConfig, ServerConfig};
