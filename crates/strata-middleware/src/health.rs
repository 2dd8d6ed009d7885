//! Health check handler units.
//!
//! - [`HealthCheck`]: liveness, answers while the process runs
//! - [`ReadinessCheck`]: readiness, answers `503` until every registered
//!   check passes or while the ready flag is cleared during shutdown
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use http::Method;
//! use strata_middleware::health::{HealthCheck, ReadinessCheck};
//! use strata_middleware::UnitNode;
//!
//! let readiness = ReadinessCheck::new().add_check("cache", || true);
//! let root = UnitNode::new("/")
//!     .route(Method::GET, "health", Arc::new(HealthCheck::new("orders", "1.4.0")))
//!     .route(Method::GET, "ready", Arc::new(readiness.clone()));
//!
//! assert!(readiness.is_ready());
//! # let _ = root;
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use strata_core::{Reply, StrataError};

use crate::context::Context;
use crate::unit::{BoxFuture, Flow, ResponseContract, Unit, UnitId};

/// Liveness body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    /// Always `"healthy"` when served.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Seconds since the check was created.
    pub uptime_seconds: u64,
}

/// Liveness handler.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    service: String,
    version: String,
    started: Instant,
}

impl HealthCheck {
    /// Creates a liveness handler; uptime counts from now.
    #[must_use]
    pub fn new(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            started: Instant::now(),
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            service: self.service.clone(),
            version: self.version.clone(),
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }
}

impl Unit for HealthCheck {
    fn id(&self) -> UnitId {
        UnitId::new("Health.liveness")
    }

    fn call<'a>(&'a self, _ctx: &'a mut Context) -> BoxFuture<'a, Flow> {
        Box::pin(std::future::ready(Flow::from(Reply::json(&self.status()))))
    }

    fn responses(&self) -> Vec<ResponseContract> {
        vec![ResponseContract::new(StatusCode::OK, "service is alive")]
    }
}

type ReadinessCheckFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Readiness handler.
///
/// Clones share the ready flag, so the server can clear it on shutdown
/// while the mounted clone keeps serving.
#[derive(Clone)]
pub struct ReadinessCheck {
    checks: Vec<(String, ReadinessCheckFn)>,
    ready: Arc<AtomicBool>,
}

impl std::fmt::Debug for ReadinessCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessCheck")
            .field("checks", &self.checks.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("ready", &self.ready)
            .finish()
    }
}

impl Default for ReadinessCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessCheck {
    /// No checks; ready by default.
    #[must_use]
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Adds a named check.
    #[must_use]
    pub fn add_check<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.checks.push((name.into(), Arc::new(check)));
        self
    }

    /// Sets the ready flag.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Results of every check.
    #[must_use]
    pub fn results(&self) -> BTreeMap<String, bool> {
        self.checks
            .iter()
            .map(|(name, check)| (name.clone(), check()))
            .collect()
    }

    /// Returns `true` if the flag is set and every check passes.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && self.checks.iter().all(|(_, check)| check())
    }
}

impl Unit for ReadinessCheck {
    fn id(&self) -> UnitId {
        UnitId::new("Health.readiness")
    }

    fn call<'a>(&'a self, _ctx: &'a mut Context) -> BoxFuture<'a, Flow> {
        let results = self.results();
        let ready = self.ready.load(Ordering::SeqCst) && results.values().all(|ok| *ok);
        let body = serde_json::json!({ "ready": ready, "checks": results });

        let flow = if ready {
            Flow::Terminate(Reply::new(body))
        } else {
            Flow::Fail(
                StrataError::business(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
                    .with_data(body),
            )
        };
        Box::pin(std::future::ready(flow))
    }

    fn responses(&self) -> Vec<ResponseContract> {
        vec![
            ResponseContract::new(StatusCode::OK, "ready for traffic"),
            ResponseContract::new(StatusCode::SERVICE_UNAVAILABLE, "not ready"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use strata_core::Request;

    fn ctx() -> Context {
        Context::new(Request::new(Method::GET, "/"))
    }

    #[tokio::test]
    async fn test_liveness_reports_service() {
        let check = HealthCheck::new("orders", "1.0.0");
        match check.call(&mut ctx()).await {
            Flow::Terminate(reply) => {
                let body = reply.body().unwrap();
                assert_eq!(body["status"], "healthy");
                assert_eq!(body["service"], "orders");
            }
            other => panic!("unexpected flow: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_readiness_fails_when_a_check_fails() {
        let check = ReadinessCheck::new()
            .add_check("db", || true)
            .add_check("cache", || false);
        assert!(!check.is_ready());

        match check.call(&mut ctx()).await {
            Flow::Fail(err) => {
                assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
                let data = err.to_envelope().data.unwrap();
                assert_eq!(data["checks"]["cache"], false);
            }
            other => panic!("unexpected flow: {other:?}"),
        }
    }

    #[test]
    fn test_ready_flag_is_shared_between_clones() {
        let check = ReadinessCheck::new();
        let mounted = check.clone();
        check.set_ready(false);
        assert!(!mounted.is_ready());
    }
}
