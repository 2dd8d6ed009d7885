//! Route nodes: the declarative, nestable building block of a route tree.

use http::Method;

/// A terminal endpoint declared on a node.
#[derive(Debug, Clone)]
pub struct Endpoint<U> {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the declaring node's prefix (may be empty).
    pub path: String,
    /// The terminal handler unit.
    pub handler: U,
}

/// A prefix-addressed node of the route tree.
///
/// A node owns an ordered local chain of units, a set of terminal endpoints
/// and an ordered list of mounted children. Prefixes compose by
/// concatenation from the root down, and every unit in a node's local chain
/// runs before anything declared deeper.
///
/// # Example
///
/// ```rust
/// use http::Method;
/// use strata_router::RouteNode;
///
/// let users = RouteNode::new("/users")
///     .unit("users-guard")
///     .route(Method::GET, "", "list")
///     .route(Method::PUT, "user_:id", "update");
///
/// let api = RouteNode::new("/api").unit("trace").mount(users);
/// assert_eq!(api.children().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct RouteNode<U> {
    prefix: String,
    chain: Vec<U>,
    endpoints: Vec<Endpoint<U>>,
    children: Vec<RouteNode<U>>,
}

impl<U> RouteNode<U> {
    /// Creates an empty node mounted at `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            chain: Vec::new(),
            endpoints: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Appends a unit to this node's local chain.
    #[must_use]
    pub fn unit(mut self, unit: U) -> Self {
        self.chain.push(unit);
        self
    }

    /// Declares a terminal handler for `method` at `path` below this prefix.
    #[must_use]
    pub fn route(mut self, method: Method, path: impl Into<String>, handler: U) -> Self {
        self.endpoints.push(Endpoint {
            method,
            path: path.into(),
            handler,
        });
        self
    }

    /// Mounts a child node; the child's prefix is appended to this one.
    #[must_use]
    pub fn mount(mut self, child: RouteNode<U>) -> Self {
        self.children.push(child);
        self
    }

    /// The node's own (relative) prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The node's local chain.
    #[must_use]
    pub fn chain(&self) -> &[U] {
        &self.chain
    }

    /// Endpoints declared directly on this node.
    #[must_use]
    pub fn endpoints(&self) -> &[Endpoint<U>] {
        &self.endpoints
    }

    /// Mounted children, in mount order.
    #[must_use]
    pub fn children(&self) -> &[RouteNode<U>] {
        &self.children
    }
}
