//! # Strata
//!
//! A request pipeline built from a tree of route segments. Every segment
//! contributes middleware units; a matched route runs the concatenation of
//! its ancestors' units followed by its handler, and each unit decides how
//! the walk continues.
//!
//! - Route tree with `:name` and `name_{regex}` parameters
//! - Explicit continuation: proceed, jump ahead, terminate or fail
//! - Per-request context store with one instance per component type
//! - Access markers aggregated from the chain at assembly time
//! - Fixed-window rate limiting per scope and caller
//! - One structured record per traced request
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let config = ConfigLoader::new().with_optional_file("strata.toml")?.with_dotenv().load()?;
//! let limits = RateLimiterRegistry::from_config(&config);
//!
//! let root = UnitNode::new("/api")
//!     .unit(Arc::new(TraceInit))
//!     .unit(limits.limiter("/api", RateLimitConfig::new(10, 30, 60, 2))?)
//!     .route(Method::GET, "ping", Arc::new(handler_fn("Ping.get", |_ctx| {
//!         Ok(Reply::new(serde_json::json!({ "pong": true })))
//!     })));
//!
//! strata::launch(&config, AppBuilder::new(root).build()?).await
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/strata/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use strata_config as config;
pub use strata_core as core;
pub use strata_middleware as middleware;
pub use strata_router as router;
pub use strata_server as server;
pub use strata_telemetry as telemetry;

use strata_config::StrataConfig;
use strata_middleware::App;
use strata_server::Server;
use strata_telemetry::{init_logging, LogConfig};

/// Installs logging from `config.logging` and serves `app` until SIGTERM or
/// Ctrl+C.
pub async fn launch(config: &StrataConfig, app: App) -> anyhow::Result<()> {
    config.validate()?;
    init_logging(&LogConfig::from(&config.logging))?;
    tracing::info!(
        addr = %config.server.http_addr,
        scopes = config.rate_limits.len(),
        "starting strata"
    );
    Server::new(&config.server, app).run().await?;
    Ok(())
}

/// Common imports.
///
/// ```rust
/// use strata::prelude::*;
///
/// let root = UnitNode::new("/");
/// assert!(AppBuilder::new(root).build().is_ok());
/// ```
pub mod prelude {
    pub use http::Method;

    pub use strata_config::{ConfigLoader, RateLimitConfig, StrataConfig};
    pub use strata_core::{
        CallerIdentity, Component, ComponentId, MarkerEntry, Reply, Request, Response, Session,
        StrataError, StrataResult,
    };
    pub use strata_middleware::stages::{
        AccessGuard, RateLimiterRegistry, Snapshot, Trace, TraceInit,
    };
    pub use strata_middleware::{
        handler_fn, listing_handler, unit_fn, App, AppBuilder, BoxFuture, Context, Flow, Handler,
        HandlerUnit, Unit, UnitId, UnitNode, UnitRef,
    };
    pub use strata_server::{Server, ShutdownSignal};
}
