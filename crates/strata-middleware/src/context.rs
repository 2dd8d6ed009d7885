//! Per-request state carried through the chain.
//!
//! The [`Context`] owns the request, the [`ContextStore`] of memoised
//! components, the caller identity and the headers units want on the final
//! response. It also knows which route matched and which unit is running,
//! and holds the completion hooks that fire once the outcome is final.

use std::fmt;
use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use strata_core::{CallerIdentity, Component, ContextStore, Request, StrataError, StrataResult};
use strata_router::Route;
use strata_telemetry::{RecordSink, TracingSink};
use tokio::time::Instant;

use crate::marker::AccessMarkerList;
use crate::unit::{UnitId, UnitRef};

/// Static description of the matched route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    /// Route index in the tree.
    pub index: usize,
    /// HTTP method.
    pub method: Method,
    /// Full path pattern.
    pub path: String,
    /// Composed mount prefixes, root first.
    pub scopes: Vec<String>,
}

impl RouteInfo {
    /// Describes a compiled route.
    #[must_use]
    pub fn from_route(route: &Route<UnitRef>) -> Self {
        Self {
            index: route.index(),
            method: route.method().clone(),
            path: route.path().to_string(),
            scopes: route.scopes().to_vec(),
        }
    }
}

/// Position of the running unit within its chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// Id of the unit.
    pub origin: UnitId,
    /// Index within the chain.
    pub position: usize,
    /// Composed prefix of the node that declared the unit.
    pub prefix: String,
}

/// Final outcome handed to completion hooks.
#[derive(Debug)]
pub struct Completion<'a> {
    /// Response status.
    pub status: StatusCode,
    /// The error, for failed requests.
    pub error: Option<&'a StrataError>,
    /// Request method.
    pub method: &'a Method,
    /// Concrete request path.
    pub path: &'a str,
    /// Matched route pattern.
    pub route: Option<&'a str>,
    /// When the outcome was finalised.
    pub finished_at: Instant,
}

/// Callback run once when the outcome is final.
pub type CompletionHook = Box<dyn FnOnce(&Completion<'_>) + Send>;

/// Mutable per-request context.
///
/// Created by the application for every dispatched request and dropped with
/// it, so nothing in it is shared across requests.
pub struct Context {
    request: Request,
    store: ContextStore,
    identity: CallerIdentity,
    route: Option<Arc<RouteInfo>>,
    markers: Arc<AccessMarkerList>,
    cursor: Option<Cursor>,
    response_headers: HeaderMap,
    hooks: Vec<CompletionHook>,
    sink: Arc<dyn RecordSink>,
    received_at: Instant,
}

impl Context {
    /// Creates a context with no matched route.
    ///
    /// Records go to [`TracingSink`].
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self {
            request,
            store: ContextStore::new(),
            identity: CallerIdentity::Anonymous,
            route: None,
            markers: Arc::new(AccessMarkerList::default()),
            cursor: None,
            response_headers: HeaderMap::new(),
            hooks: Vec::new(),
            sink: Arc::new(TracingSink),
            received_at: Instant::now(),
        }
    }

    /// Binds the context to a matched route and its marker list.
    #[must_use]
    pub fn with_route(mut self, route: Arc<RouteInfo>, markers: Arc<AccessMarkerList>) -> Self {
        self.route = Some(route);
        self.markers = markers;
        self
    }

    /// Sets the sink that receives request records.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Overrides the time the request was first touched.
    #[must_use]
    pub fn with_received_at(mut self, received_at: Instant) -> Self {
        self.received_at = received_at;
        self
    }

    /// The request.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Mutable access to the request.
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// Resolves a component, constructing it on first use in this request.
    pub fn resolve<T: Component>(&mut self) -> StrataResult<Arc<T>> {
        self.store.resolve::<T>(&self.request)
    }

    /// Stores a component eagerly unless it already exists.
    pub fn provide<T: Component>(&mut self, value: T) -> StrataResult<Arc<T>> {
        self.store.provide(value)
    }

    /// Returns a component without constructing it.
    #[must_use]
    pub fn get<T: Component>(&self) -> Option<Arc<T>> {
        self.store.get::<T>()
    }

    /// The context store.
    #[must_use]
    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    /// The caller identity.
    #[must_use]
    pub fn identity(&self) -> &CallerIdentity {
        &self.identity
    }

    /// Sets the caller identity, typically from a session unit.
    pub fn set_identity(&mut self, identity: CallerIdentity) {
        self.identity = identity;
    }

    /// The matched route, if any.
    #[must_use]
    pub fn route(&self) -> Option<&RouteInfo> {
        self.route.as_deref()
    }

    /// Markers aggregated for the matched route.
    #[must_use]
    pub fn markers(&self) -> &AccessMarkerList {
        &self.markers
    }

    /// The running unit.
    #[must_use]
    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub(crate) fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = Some(cursor);
    }

    /// Sets a header on the eventual response, replacing any earlier value.
    pub fn insert_response_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.response_headers.insert(name, value);
    }

    /// Headers collected for the response.
    #[must_use]
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub(crate) fn take_response_headers(&mut self) -> HeaderMap {
        std::mem::take(&mut self.response_headers)
    }

    /// The sink for request records.
    #[must_use]
    pub fn sink(&self) -> Arc<dyn RecordSink> {
        Arc::clone(&self.sink)
    }

    /// When the request was first touched.
    #[must_use]
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Registers a hook that runs once the outcome is final.
    pub fn on_complete(&mut self, hook: CompletionHook) {
        self.hooks.push(hook);
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn pending_hooks(&self) -> usize {
        self.hooks.len()
    }

    /// Fires every registered hook exactly once.
    ///
    /// Hooks are drained, so a second call does nothing.
    pub fn complete(&mut self, status: StatusCode, error: Option<&StrataError>) {
        let hooks = std::mem::take(&mut self.hooks);
        if hooks.is_empty() {
            return;
        }
        let done = Completion {
            status,
            error,
            method: self.request.method(),
            path: self.request.path(),
            route: self.route.as_deref().map(|r| r.path.as_str()),
            finished_at: Instant::now(),
        };
        for hook in hooks {
            hook(&done);
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", self.request.method())
            .field("path", &self.request.path())
            .field("identity", &self.identity.log_id())
            .field("route", &self.route)
            .field("cursor", &self.cursor)
            .field("store", &self.store)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}
