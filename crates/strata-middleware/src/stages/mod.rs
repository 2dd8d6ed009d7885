//! Built-in chain units.
//!
//! - [`trace`] - start the request trace and flush one record at the end
//! - [`access`] - enforce the route's access markers
//! - [`rate_limit`] - fixed-window limiting per scope and caller
//!
//! A typical root node mounts them in that order:
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_config::RateLimitConfig;
//! use strata_middleware::stages::{AccessGuard, RateLimiterRegistry, TraceInit};
//! use strata_middleware::UnitNode;
//!
//! let limits = RateLimiterRegistry::new();
//! let api = UnitNode::new("/api")
//!     .unit(Arc::new(TraceInit))
//!     .unit(Arc::new(AccessGuard::new()))
//!     .unit(limits.limiter("/api", RateLimitConfig::new(10, 30, 60, 2)).unwrap());
//! # let _ = api;
//! ```

pub mod access;
pub mod rate_limit;
pub mod trace;

pub use access::{AccessGuard, ACCESS_MARKER};
pub use rate_limit::{
    caller_key, Decision, RateLimitStore, RateLimitUnit, RateLimiterRegistry, DEFAULT_LIMITER_ID,
};
pub use trace::{Snapshot, Trace, TraceInit, IDEMPOTENCY_KEY_HEADER};
