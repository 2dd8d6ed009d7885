//! Marker-based access guard.
//!
//! The guard is both a unit and a [`MarkerSource`]: mounting it on a node
//! annotates every route below that node, and at request time it checks the
//! caller's grants against those annotations. No per-route policy is
//! written by hand; the mount topology is the policy.
//!
//! ## Check
//!
//! 1. Anonymous callers fail with `AuthRequired`.
//! 2. A route without entries under the guard's marker name is a
//!    configuration error. The guard never allows by default.
//! 3. The caller passes if any grant they hold under that marker name
//!    equals any of the route's entries. Otherwise `AccessDenied`.
//!
//! Several guards on one chain are checked independently, so every one of
//! them must pass.

use strata_core::{MarkerEntry, StrataError, StrataResult};

use crate::context::{Context, Cursor, RouteInfo};
use crate::marker::{scope_marks, MarkerSource};
use crate::unit::{BoxFuture, Flow, ResponseContract, Unit, UnitId};

/// Default marker name.
pub const ACCESS_MARKER: &str = "access";

/// Unit that enforces the route's access markers.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use strata_middleware::stages::AccessGuard;
/// use strata_middleware::UnitRef;
///
/// let guard: UnitRef = Arc::new(AccessGuard::new());
/// assert_eq!(guard.id().as_str(), "AccessGuard.check");
/// assert!(guard.marker_source().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct AccessGuard {
    id: UnitId,
    marker: String,
}

impl Default for AccessGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessGuard {
    /// A guard filing entries under [`ACCESS_MARKER`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: UnitId::new("AccessGuard.check"),
            marker: ACCESS_MARKER.to_string(),
        }
    }

    /// A guard for a different marker name. Give it a distinct id if it
    /// shares a chain with another guard.
    #[must_use]
    pub fn for_marker(id: impl Into<UnitId>, marker: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            marker: marker.into(),
        }
    }

    /// The marker name this guard checks.
    #[must_use]
    pub fn marker(&self) -> &str {
        &self.marker
    }

    fn check(&self, ctx: &Context) -> StrataResult<()> {
        if ctx.identity().is_anonymous() {
            return Err(StrataError::auth_required("a session is required"));
        }

        let required = ctx.markers().get(&self.marker);
        if required.is_empty() {
            let route = ctx.route().map_or_else(
                || ctx.request().path().to_string(),
                |r| format!("{} {}", r.method, r.path),
            );
            return Err(StrataError::configuration(format!(
                "route {route} has no `{}` markers but is guarded by `{}`",
                self.marker, self.id
            )));
        }

        let held = ctx.identity().grants_for(&self.marker);
        if satisfies(held, required) {
            Ok(())
        } else {
            tracing::debug!(
                caller = %ctx.identity().log_id(),
                marker = %self.marker,
                "access denied"
            );
            Err(StrataError::access_denied_for(self.marker.clone()))
        }
    }
}

fn satisfies(held: &[MarkerEntry], required: &[MarkerEntry]) -> bool {
    required.iter().any(|entry| held.contains(entry))
}

impl MarkerSource for AccessGuard {
    fn marker_name(&self) -> &str {
        &self.marker
    }

    fn mark(&self, route: &RouteInfo, _cursor: &Cursor) -> Vec<MarkerEntry> {
        scope_marks(route)
    }
}

impl Unit for AccessGuard {
    fn id(&self) -> UnitId {
        self.id
    }

    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Flow> {
        let flow = match self.check(ctx) {
            Ok(()) => Flow::Proceed,
            Err(err) => Flow::Fail(err),
        };
        Box::pin(std::future::ready(flow))
    }

    fn responses(&self) -> Vec<ResponseContract> {
        vec![
            ResponseContract::new(http::StatusCode::UNAUTHORIZED, "no session"),
            ResponseContract::new(http::StatusCode::FORBIDDEN, "missing grant"),
        ]
    }

    fn marker_source(&self) -> Option<&dyn MarkerSource> {
        Some(self)
    }
}
