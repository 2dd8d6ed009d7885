//! Chain units and the continuation they return.
//!
//! Every element of a route's chain is a [`Unit`]. A unit inspects or
//! enriches the [`Context`] and answers with a [`Flow`] telling the executor
//! what to do next. Guards return [`Flow::Proceed`] or [`Flow::Fail`];
//! handlers end the chain with [`Flow::Terminate`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_core::Reply;
//! use strata_middleware::{handler_fn, unit_fn, Flow, UnitRef};
//!
//! let audit: UnitRef = Arc::new(unit_fn("Audit.touch", |_ctx| Flow::Proceed));
//! let hello: UnitRef = Arc::new(handler_fn("Hello.get", |_ctx| {
//!     Ok(Reply::new(serde_json::json!({ "hello": "world" })))
//! }));
//!
//! assert_eq!(audit.id().as_str(), "Audit.touch");
//! assert_eq!(hello.id().as_str(), "Hello.get");
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use strata_core::{Reply, StrataError, StrataResult};
use strata_router::RouteNode;

use crate::app::RouteDescriptor;
use crate::context::Context;
use crate::marker::MarkerSource;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Shared handle to a unit, as stored in route trees.
pub type UnitRef = Arc<dyn Unit>;

/// Route tree node holding [`UnitRef`]s.
///
/// Starting a tree with `UnitNode::new` fixes the unit type before the first
/// `unit` or `route` call, so `Arc::new(concrete_unit)` coerces to
/// [`UnitRef`] there.
pub type UnitNode = RouteNode<UnitRef>;

/// Explicit identity of a unit, conventionally `"Component.method"`.
///
/// Jump targets and trace origins refer to units by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UnitId(&'static str);

impl UnitId {
    /// Creates an identifier.
    #[must_use]
    pub const fn new(id: &'static str) -> Self {
        Self(id)
    }

    /// The identifier text.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl From<&'static str> for UnitId {
    fn from(id: &'static str) -> Self {
        Self(id)
    }
}

/// What the executor does after a unit returns.
#[derive(Debug)]
pub enum Flow {
    /// Continue with the next unit.
    Proceed,
    /// Run the named later units, in this order, then continue after the
    /// furthest of them.
    JumpTo(Vec<UnitId>),
    /// End the chain successfully with this reply.
    Terminate(Reply),
    /// End the chain with this error.
    Fail(StrataError),
}

impl Flow {
    /// Builds a jump to the given units.
    #[must_use]
    pub fn jump_to<I, T>(targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<UnitId>,
    {
        Self::JumpTo(targets.into_iter().map(Into::into).collect())
    }

    /// Returns `true` for `Terminate` and `Fail`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminate(_) | Self::Fail(_))
    }
}

impl From<StrataResult<Reply>> for Flow {
    fn from(result: StrataResult<Reply>) -> Self {
        match result {
            Ok(reply) => Self::Terminate(reply),
            Err(err) => Self::Fail(err),
        }
    }
}

impl From<StrataError> for Flow {
    fn from(err: StrataError) -> Self {
        Self::Fail(err)
    }
}

/// Declared response shape, for documentation only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseContract {
    /// Status code.
    pub status: u16,
    /// Human readable description.
    pub description: String,
    /// Optional JSON schema of the body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl ResponseContract {
    /// Creates a contract without a schema.
    #[must_use]
    pub fn new(status: StatusCode, description: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            description: description.into(),
            schema: None,
        }
    }

    /// Attaches a body schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Where a declared parameter is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    /// Path parameter captured by the route.
    Path,
    /// Query string.
    Query,
    /// Request header.
    Header,
    /// JSON body.
    Body,
    /// A component resolved from the context store.
    Component,
}

/// A parameter resolver a unit declares.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDescriptor {
    /// Parameter name.
    pub name: String,
    /// Source of the value.
    pub source: ParamSource,
    /// Whether the unit fails without it.
    pub required: bool,
}

impl ParamDescriptor {
    /// A required parameter.
    #[must_use]
    pub fn required(name: impl Into<String>, source: ParamSource) -> Self {
        Self {
            name: name.into(),
            source,
            required: true,
        }
    }

    /// An optional parameter.
    #[must_use]
    pub fn optional(name: impl Into<String>, source: ParamSource) -> Self {
        Self {
            name: name.into(),
            source,
            required: false,
        }
    }
}

/// One element of a chain.
///
/// # Invariants
///
/// - `id` is stable and unique within any chain it is mounted in
/// - a unit never runs twice within one chain walk
pub trait Unit: Send + Sync + 'static {
    /// Identity used for jumps, traces and listings.
    fn id(&self) -> UnitId;

    /// Runs the unit against the request context.
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Flow>;

    /// Parameters the unit reads, for documentation.
    fn params(&self) -> Vec<ParamDescriptor> {
        Vec::new()
    }

    /// Responses the unit may produce, for documentation.
    fn responses(&self) -> Vec<ResponseContract> {
        Vec::new()
    }

    /// Returns the marker source view of this unit, if it annotates routes.
    fn marker_source(&self) -> Option<&dyn MarkerSource> {
        None
    }

    /// Called once after the application is assembled, with the final
    /// route listing.
    fn installed(&self, _routes: &[RouteDescriptor]) {}
}

impl fmt::Debug for dyn Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit").field("id", &self.id()).finish()
    }
}

/// A unit backed by a synchronous closure.
pub struct FnUnit<F> {
    id: UnitId,
    func: F,
    params: Vec<ParamDescriptor>,
    responses: Vec<ResponseContract>,
}

/// Wraps a closure returning a [`Flow`].
pub fn unit_fn<F>(id: impl Into<UnitId>, func: F) -> FnUnit<F>
where
    F: Fn(&mut Context) -> Flow + Send + Sync + 'static,
{
    FnUnit {
        id: id.into(),
        func,
        params: Vec::new(),
        responses: Vec::new(),
    }
}

impl<F> FnUnit<F> {
    /// Declares a parameter.
    #[must_use]
    pub fn param(mut self, param: ParamDescriptor) -> Self {
        self.params.push(param);
        self
    }

    /// Declares a response.
    #[must_use]
    pub fn response(mut self, contract: ResponseContract) -> Self {
        self.responses.push(contract);
        self
    }
}

impl<F> Unit for FnUnit<F>
where
    F: Fn(&mut Context) -> Flow + Send + Sync + 'static,
{
    fn id(&self) -> UnitId {
        self.id
    }

    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Flow> {
        let flow = (self.func)(ctx);
        Box::pin(std::future::ready(flow))
    }

    fn params(&self) -> Vec<ParamDescriptor> {
        self.params.clone()
    }

    fn responses(&self) -> Vec<ResponseContract> {
        self.responses.clone()
    }
}

/// Wraps a terminal closure: `Ok` terminates, `Err` fails.
pub fn handler_fn<F>(
    id: impl Into<UnitId>,
    func: F,
) -> FnUnit<impl Fn(&mut Context) -> Flow + Send + Sync + 'static>
where
    F: Fn(&mut Context) -> StrataResult<Reply> + Send + Sync + 'static,
{
    unit_fn(id, move |ctx: &mut Context| Flow::from(func(ctx)))
}

/// An asynchronous terminal handler implemented as a type.
///
/// Wrap it in [`HandlerUnit`] to mount it.
pub trait Handler: Send + Sync + 'static {
    /// Identity of the handler.
    fn id(&self) -> UnitId;

    /// Produces the reply.
    fn handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, StrataResult<Reply>>;

    /// Parameters the handler reads.
    fn params(&self) -> Vec<ParamDescriptor> {
        Vec::new()
    }

    /// Responses the handler may produce.
    fn responses(&self) -> Vec<ResponseContract> {
        Vec::new()
    }
}

/// Adapts a [`Handler`] into a terminal [`Unit`].
#[derive(Debug)]
pub struct HandlerUnit<H>(pub H);

impl<H: Handler> Unit for HandlerUnit<H> {
    fn id(&self) -> UnitId {
        self.0.id()
    }

    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Flow> {
        Box::pin(async move { Flow::from(self.0.handle(ctx).await) })
    }

    fn params(&self) -> Vec<ParamDescriptor> {
        self.0.params()
    }

    fn responses(&self) -> Vec<ResponseContract> {
        self.0.responses()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::Request;

    #[test]
    fn test_jump_to_collects_ids() {
        let flow = Flow::jump_to(["A.a", "B.b"]);
        match flow {
            Flow::JumpTo(ids) => assert_eq!(ids, [UnitId::new("A.a"), UnitId::new("B.b")]),
            other => panic!("unexpected flow: {other:?}"),
        }
    }

    #[test]
    fn test_flow_from_result() {
        assert!(matches!(Flow::from(Ok(Reply::empty())), Flow::Terminate(_)));
        assert!(matches!(
            Flow::from(Err(StrataError::validation("bad"))),
            Flow::Fail(StrataError::Validation { .. })
        ));
        assert!(!Flow::Proceed.is_terminal());
    }

    #[tokio::test]
    async fn test_handler_fn_terminates() {
        let unit = handler_fn("Echo.get", |ctx| {
            Ok(Reply::new(serde_json::json!({ "path": ctx.request().path() })))
        })
        .response(ResponseContract::new(StatusCode::OK, "echo"));

        let mut ctx = Context::new(Request::new(http::Method::GET, "/echo"));
        match unit.call(&mut ctx).await {
            Flow::Terminate(reply) => assert_eq!(reply.body().unwrap()["path"], "/echo"),
            other => panic!("unexpected flow: {other:?}"),
        }
        assert_eq!(unit.responses()[0].status, 200);
    }

    struct Slow;

    impl Handler for Slow {
        fn id(&self) -> UnitId {
            UnitId::new("Slow.get")
        }

        fn handle<'a>(&'a self, _ctx: &'a mut Context) -> BoxFuture<'a, StrataResult<Reply>> {
            Box::pin(async {
                tokio::task::yield_now().await;
                Err(StrataError::business(StatusCode::CONFLICT, "busy"))
            })
        }
    }

    #[tokio::test]
    async fn test_handler_unit_maps_error_to_fail() {
        let unit = HandlerUnit(Slow);
        let mut ctx = Context::new(Request::new(http::Method::GET, "/"));
        assert_eq!(unit.id().as_str(), "Slow.get");
        assert!(matches!(unit.call(&mut ctx).await, Flow::Fail(_)));
    }
}
