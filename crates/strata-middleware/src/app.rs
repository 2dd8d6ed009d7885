//! Application assembly and request dispatch.
//!
//! [`AppBuilder`] compiles a [`UnitNode`] tree once at startup, aggregates
//! route markers and produces an immutable [`App`]. [`App::dispatch`] turns
//! one request into exactly one [`Response`]: a plain success body or an
//! error envelope `{message, status, data?}`.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use http::{Method, StatusCode};
//! use strata_core::{Reply, Request};
//! use strata_middleware::{handler_fn, AppBuilder, UnitNode};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let root = UnitNode::new("/api").route(
//!     Method::GET,
//!     "users/:id",
//!     Arc::new(handler_fn("Users.get", |ctx| {
//!         Ok(Reply::new(serde_json::json!({ "id": ctx.request().param("id") })))
//!     })),
//! );
//! let app = AppBuilder::new(root).build().unwrap();
//!
//! let response = app.dispatch(Request::new(Method::GET, "/api/users/7")).await;
//! assert_eq!(response.status, StatusCode::OK);
//! assert_eq!(response.body.unwrap()["id"], "7");
//!
//! let missing = app.dispatch(Request::new(Method::GET, "/nope")).await;
//! assert_eq!(missing.status, StatusCode::NOT_FOUND);
//! assert_eq!(missing.body.unwrap()["message"], "Not Found");
//! # }
//! ```

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use http::Method;
use serde::Serialize;
use serde_json::Value;
use strata_core::{Reply, Request, Response, StrataError, StrataResult};
use strata_router::{Route, RouteTree};
use strata_telemetry::{RecordSink, TracingSink};
use tokio::time::Instant;

use crate::context::{Context, RouteInfo};
use crate::executor::Executor;
use crate::marker::{AccessMarkerList, MarkerAggregator};
use crate::unit::{
    BoxFuture, Flow, ParamDescriptor, ResponseContract, Unit, UnitId, UnitNode, UnitRef,
};

/// Documentation view of one route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDescriptor {
    /// HTTP method.
    pub method: String,
    /// Full path pattern.
    pub path: String,
    /// Id of the terminal handler.
    pub handler: UnitId,
    /// Ids of every unit in chain order, handler last.
    pub chain: Vec<UnitId>,
    /// Aggregated markers, keyed by marker name.
    pub markers: AccessMarkerList,
    /// Responses declared by any unit on the chain.
    pub responses: Vec<ResponseContract>,
    /// Parameters declared by any unit on the chain.
    pub params: Vec<ParamDescriptor>,
}

impl RouteDescriptor {
    fn describe(route: &Route<UnitRef>, markers: &AccessMarkerList) -> Self {
        let mut responses: Vec<ResponseContract> = Vec::new();
        let mut params: Vec<ParamDescriptor> = Vec::new();
        for link in route.chain() {
            for contract in link.unit.responses() {
                if !responses.contains(&contract) {
                    responses.push(contract);
                }
            }
            for param in link.unit.params() {
                if !params.contains(&param) {
                    params.push(param);
                }
            }
        }
        responses.sort_by_key(|c| c.status);

        Self {
            method: route.method().to_string(),
            path: route.path().to_string(),
            handler: route.handler().id(),
            chain: route.chain().iter().map(|link| link.unit.id()).collect(),
            markers: markers.clone(),
            responses,
            params,
        }
    }
}

/// Assembles an [`App`].
pub struct AppBuilder {
    root: UnitNode,
    sink: Arc<dyn RecordSink>,
}

impl std::fmt::Debug for AppBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppBuilder")
            .field("prefix", &self.root.prefix())
            .finish_non_exhaustive()
    }
}

impl AppBuilder {
    /// Starts from the root node. Records go to [`TracingSink`] unless
    /// [`sink`](Self::sink) says otherwise.
    #[must_use]
    pub fn new(root: UnitNode) -> Self {
        Self {
            root,
            sink: Arc::new(TracingSink),
        }
    }

    /// Sets the destination of request records.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Compiles routes and markers.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed patterns or conflicting
    /// routes.
    pub fn build(self) -> StrataResult<App> {
        let tree = RouteTree::build(self.root)?;
        let markers = MarkerAggregator::aggregate(&tree);
        let routes = tree
            .routes()
            .iter()
            .map(|route| Arc::new(RouteInfo::from_route(route)))
            .collect();

        let app = App {
            tree,
            routes,
            markers,
            sink: self.sink,
        };

        let listing = app.routes();
        let mut seen = HashSet::new();
        for route in app.tree.routes() {
            for link in route.chain() {
                if seen.insert(Arc::as_ptr(&link.unit).cast::<()>()) {
                    link.unit.installed(&listing);
                }
            }
        }

        tracing::info!(routes = app.tree.len(), "application assembled");
        Ok(app)
    }
}

/// An assembled, immutable application.
///
/// Share it behind an `Arc`; dispatch takes `&self`.
pub struct App {
    tree: RouteTree<UnitRef>,
    routes: Vec<Arc<RouteInfo>>,
    markers: Vec<Arc<AccessMarkerList>>,
    sink: Arc<dyn RecordSink>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

impl App {
    /// Handles one request.
    ///
    /// Matches the route (a miss yields the generic 404 envelope), runs the
    /// chain, converts the outcome once, merges unit headers, then fires the
    /// completion hooks exactly once.
    pub async fn dispatch(&self, mut request: Request) -> Response {
        let received_at = Instant::now();
        let method = request.method().clone();

        let matched = match self.tree.match_route(&method, request.path()) {
            Ok(matched) => matched,
            Err(err) => {
                let err = StrataError::from(err);
                tracing::debug!(error = %err, "no route");
                return Response::from_error(&err);
            }
        };
        let index = matched.route.index();
        request.set_params(matched.params);

        let mut ctx = Context::new(request)
            .with_route(Arc::clone(&self.routes[index]), Arc::clone(&self.markers[index]))
            .with_sink(Arc::clone(&self.sink))
            .with_received_at(received_at);

        let (mut response, error) = match Executor::run(matched.route.chain(), &mut ctx).await {
            Ok(reply) => (Response::from_reply(reply), None),
            Err(err) => {
                log_failure(&err, &ctx);
                (Response::from_error(&err), Some(err))
            }
        };
        response.merge_headers(ctx.take_response_headers());
        if method == Method::HEAD {
            response.body = None;
        }

        ctx.complete(response.status, error.as_ref());
        response
    }

    /// The route listing: method, path, handler, markers and declared
    /// contracts of every route, in match-priority order.
    #[must_use]
    pub fn routes(&self) -> Vec<RouteDescriptor> {
        self.tree
            .routes()
            .iter()
            .map(|route| RouteDescriptor::describe(route, &self.markers[route.index()]))
            .collect()
    }

    /// Markers of the route matching `method` and `path`.
    #[must_use]
    pub fn markers_for(&self, method: &Method, path: &str) -> Option<&AccessMarkerList> {
        self.tree
            .match_route(method, path)
            .ok()
            .map(|matched| self.markers[matched.route.index()].as_ref())
    }

    /// The compiled tree.
    #[must_use]
    pub fn tree(&self) -> &RouteTree<UnitRef> {
        &self.tree
    }
}

fn log_failure(err: &StrataError, ctx: &Context) {
    let method = ctx.request().method();
    let path = ctx.request().path();
    match err {
        StrataError::Configuration { .. } | StrataError::Internal { .. } => {
            tracing::error!(
                http.method = %method,
                http.path = %path,
                error = %err,
                "request failed"
            );
        }
        _ => {
            tracing::debug!(
                http.method = %method,
                http.path = %path,
                error = %err,
                "request rejected"
            );
        }
    }
}

/// Handler that serves the application's route listing.
///
/// The listing is captured when the application is assembled. A handler
/// mounted into a second application keeps the first listing.
#[derive(Debug)]
pub struct RouteListing {
    id: UnitId,
    listing: OnceLock<Value>,
}

/// Creates a route listing handler with the given id.
#[must_use]
pub fn listing_handler(id: impl Into<UnitId>) -> RouteListing {
    RouteListing {
        id: id.into(),
        listing: OnceLock::new(),
    }
}

impl Unit for RouteListing {
    fn id(&self) -> UnitId {
        self.id
    }

    fn call<'a>(&'a self, _ctx: &'a mut Context) -> BoxFuture<'a, Flow> {
        let flow = match self.listing.get() {
            Some(listing) => Flow::Terminate(Reply::new(listing.clone())),
            None => Flow::Fail(StrataError::configuration(
                "route listing served before the application was assembled",
            )),
        };
        Box::pin(std::future::ready(flow))
    }

    fn responses(&self) -> Vec<ResponseContract> {
        vec![ResponseContract::new(http::StatusCode::OK, "route listing")]
    }

    fn installed(&self, routes: &[RouteDescriptor]) {
        match serde_json::to_value(routes) {
            Ok(listing) => {
                if self.listing.set(listing).is_err() {
                    tracing::warn!(
                        unit = %self.id,
                        "route listing already installed by another application, keeping the first"
                    );
                }
            }
            Err(err) => tracing::error!(error = %err, "route listing serialization failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{handler_fn, unit_fn};
    use http::StatusCode;
    use strata_core::Reply;

    fn ok(id: &'static str) -> UnitRef {
        Arc::new(handler_fn(id, |_ctx| Ok(Reply::new(serde_json::json!("ok")))))
    }

    #[tokio::test]
    async fn test_unit_headers_are_merged() {
        let root = UnitNode::new("/")
            .unit(Arc::new(unit_fn("Stamp.set", |ctx| {
                ctx.insert_response_header(
                    http::header::HeaderName::from_static("x-stamp"),
                    http::HeaderValue::from_static("1"),
                );
                Flow::Proceed
            })))
            .route(Method::GET, "ping", ok("Ping.get"));
        let app = AppBuilder::new(root).build().unwrap();

        let response = app.dispatch(Request::new(Method::GET, "/ping")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers["x-stamp"], "1");
    }

    #[tokio::test]
    async fn test_head_drops_body() {
        let root = UnitNode::new("/").route(Method::GET, "ping", ok("Ping.get"));
        let app = AppBuilder::new(root).build().unwrap();

        let response = app.dispatch(Request::new(Method::HEAD, "/ping")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.body.is_none());
    }

    #[tokio::test]
    async fn test_configuration_error_is_generic_500() {
        let root = UnitNode::new("/")
            .route(Method::GET, "broken", Arc::new(unit_fn("Broken.get", |_| Flow::Proceed)));
        let app = AppBuilder::new(root).build().unwrap();

        let response = app.dispatch(Request::new(Method::GET, "/broken")).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.body.unwrap(),
            serde_json::json!({ "message": "Internal Server Error", "status": 500 })
        );
    }

    #[test]
    fn test_conflict_fails_build() {
        let root = UnitNode::new("/")
            .route(Method::GET, "users/:id", ok("A.get"))
            .route(Method::GET, "users/:name", ok("B.get"));
        let err = AppBuilder::new(root).build().unwrap_err();
        assert!(matches!(err, StrataError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_listing_handler_serves_routes() {
        let root = UnitNode::new("/")
            .route(Method::GET, "routes", Arc::new(listing_handler("Docs.routes")))
            .route(Method::POST, "users", ok("Users.create"));
        let app = AppBuilder::new(root).build().unwrap();

        let response = app.dispatch(Request::new(Method::GET, "/routes")).await;
        let listing = response.body.unwrap();
        let entries = listing.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e["handler"] == "Users.create" && e["method"] == "POST"));
    }

    #[tokio::test]
    async fn test_listing_shared_by_two_apps_keeps_first() {
        let listing: UnitRef = Arc::new(listing_handler("Docs.routes"));
        let first = UnitNode::new("/")
            .route(Method::GET, "routes", Arc::clone(&listing))
            .route(Method::GET, "a", ok("A.get"));
        let second = UnitNode::new("/")
            .route(Method::GET, "routes", listing)
            .route(Method::GET, "b", ok("B.get"))
            .route(Method::GET, "c", ok("C.get"));

        let _first = AppBuilder::new(first).build().unwrap();
        let app = AppBuilder::new(second).build().unwrap();

        let response = app.dispatch(Request::new(Method::GET, "/routes")).await;
        let body = response.body.unwrap();
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e["handler"] == "A.get"));
        assert!(!entries.iter().any(|e| e["handler"] == "B.get"));
    }

    #[tokio::test]
    async fn test_unassembled_listing_fails() {
        let listing = listing_handler("Docs.routes");
        let mut ctx = Context::new(Request::new(Method::GET, "/"));
        assert!(matches!(listing.call(&mut ctx).await, Flow::Fail(_)));
    }
}
