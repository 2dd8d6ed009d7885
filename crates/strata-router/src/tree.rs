//! The assembled, read-only route tree.

use std::collections::HashMap;

use http::Method;

use crate::error::RouteError;
use crate::node::RouteNode;
use crate::params::Params;
use crate::pattern::{join, Pattern};

/// One element of a route's executable chain.
#[derive(Debug, Clone)]
pub struct ChainLink<U> {
    /// The unit to run.
    pub unit: U,
    /// Composed prefix of the node that declared the unit. For the terminal
    /// handler this is the full route path.
    pub scope: String,
}

/// A fully resolved terminal route.
#[derive(Debug, Clone)]
pub struct Route<U> {
    index: usize,
    method: Method,
    pattern: Pattern,
    scopes: Vec<String>,
    chain: Vec<ChainLink<U>>,
}

impl<U> Route<U> {
    /// Stable position of this route in the tree.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// HTTP method served by the route.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Full path pattern, e.g. `/api/users/user_:id`.
    #[must_use]
    pub fn path(&self) -> &str {
        self.pattern.source()
    }

    /// The compiled matcher.
    #[must_use]
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Composed mount prefixes from the root down to the declaring node.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Ancestor local chains in root-to-leaf order, then the handler.
    #[must_use]
    pub fn chain(&self) -> &[ChainLink<U>] {
        &self.chain
    }

    /// The terminal handler.
    #[must_use]
    pub fn handler(&self) -> &U {
        // `collect` always appends the handler, so the chain is never empty.
        &self.chain[self.chain.len() - 1].unit
    }
}

/// A successful match.
#[derive(Debug)]
pub struct RouteMatch<'a, U> {
    /// The matched route.
    pub route: &'a Route<U>,
    /// Raw path parameters.
    pub params: Params,
}

/// An immutable tree of routes built once at startup.
///
/// Matching is deterministic: candidates are ordered by specificity (for
/// each segment, literal text beats a literal-plus-parameter segment, which
/// beats a constrained parameter, which beats a bare parameter), then by path
/// text, then by method. Insertion order of unrelated siblings never decides
/// a match.
///
/// # Example
///
/// ```rust
/// use http::Method;
/// use strata_router::{RouteNode, RouteTree};
///
/// let root = RouteNode::new("/api")
///     .unit("a")
///     .mount(RouteNode::new("/users").unit("b").route(Method::GET, ":id", "get_user"));
///
/// let tree = RouteTree::build(root).unwrap();
/// let matched = tree.match_route(&Method::GET, "/api/users/7").unwrap();
///
/// let chain: Vec<_> = matched.route.chain().iter().map(|l| l.unit).collect();
/// assert_eq!(chain, ["a", "b", "get_user"]);
/// assert_eq!(matched.params.get("id"), Some("7"));
/// ```
#[derive(Debug, Clone)]
pub struct RouteTree<U> {
    routes: Vec<Route<U>>,
}

impl<U: Clone> RouteTree<U> {
    /// Flattens `root` into executable routes.
    ///
    /// Fails with [`RouteError::InvalidPattern`] for malformed prefixes or
    /// paths and [`RouteError::Conflict`] when two endpoints share a method
    /// and path shape.
    pub fn build(root: RouteNode<U>) -> Result<Self, RouteError> {
        let mut routes = Vec::new();
        collect(&root, "", &mut Vec::new(), &mut Vec::new(), &mut routes)?;

        routes.sort_by(|a, b| {
            a.pattern
                .ranks()
                .cmp(b.pattern.ranks())
                .then_with(|| a.pattern.source().cmp(b.pattern.source()))
                .then_with(|| a.method.as_str().cmp(b.method.as_str()))
        });

        let mut seen: HashMap<(String, String), String> = HashMap::new();
        for route in &routes {
            let key = (
                route.method.as_str().to_string(),
                route.pattern.shape().to_string(),
            );
            if let Some(existing) = seen.get(&key) {
                return Err(RouteError::Conflict {
                    method: key.0,
                    path: route.pattern.source().to_string(),
                    existing: existing.clone(),
                });
            }
            seen.insert(key, route.pattern.source().to_string());
        }

        for (index, route) in routes.iter_mut().enumerate() {
            route.index = index;
        }

        Ok(Self { routes })
    }
}

impl<U> RouteTree<U> {
    /// Resolves a request to a route.
    ///
    /// A trailing slash is ignored. `HEAD` falls back to the `GET` route when
    /// no explicit `HEAD` endpoint matches.
    pub fn match_route(
        &self,
        method: &Method,
        path: &str,
    ) -> Result<RouteMatch<'_, U>, RouteError> {
        let path = normalize_request_path(path);

        if let Some(found) = self.find(method, path) {
            return Ok(found);
        }
        if method == Method::HEAD {
            if let Some(found) = self.find(&Method::GET, path) {
                return Ok(found);
            }
        }

        Err(RouteError::NotFound {
            method: method.to_string(),
            path: path.to_string(),
        })
    }

    fn find(&self, method: &Method, path: &str) -> Option<RouteMatch<'_, U>> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                route
                    .pattern
                    .matches(path)
                    .map(|params| RouteMatch { route, params })
            })
    }

    /// All routes in match-priority order.
    #[must_use]
    pub fn routes(&self) -> &[Route<U>] {
        &self.routes
    }

    /// Route by index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Route<U>> {
        self.routes.get(index)
    }

    /// Number of terminal routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true if the tree has no routes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn collect<U: Clone>(
    node: &RouteNode<U>,
    parent: &str,
    scopes: &mut Vec<String>,
    chain: &mut Vec<ChainLink<U>>,
    out: &mut Vec<Route<U>>,
) -> Result<(), RouteError> {
    let prefix = Pattern::compile(&join(parent, node.prefix()))?
        .source()
        .to_string();

    let opens_scope = !node.prefix().trim_matches('/').is_empty();
    if opens_scope {
        scopes.push(prefix.clone());
    }

    let base = chain.len();
    chain.extend(node.chain().iter().map(|unit| ChainLink {
        unit: unit.clone(),
        scope: prefix.clone(),
    }));

    for endpoint in node.endpoints() {
        let pattern = Pattern::compile(&join(&prefix, &endpoint.path))?;
        let mut full = chain.clone();
        full.push(ChainLink {
            unit: endpoint.handler.clone(),
            scope: pattern.source().to_string(),
        });
        out.push(Route {
            index: 0,
            method: endpoint.method.clone(),
            pattern,
            scopes: scopes.clone(),
            chain: full,
        });
    }

    for child in node.children() {
        collect(child, &prefix, scopes, chain, out)?;
    }

    chain.truncate(base);
    if opens_scope {
        scopes.pop();
    }
    Ok(())
}

fn normalize_request_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units<U: Copy>(route: &Route<U>) -> Vec<U> {
        route.chain().iter().map(|l| l.unit).collect()
    }

    #[test]
    fn test_static_beats_param() {
        let root = RouteNode::new("/users")
            .route(Method::GET, ":id", "by_id")
            .route(Method::GET, "me", "me");
        let tree = RouteTree::build(root).unwrap();

        let m = tree.match_route(&Method::GET, "/users/me").unwrap();
        assert_eq!(*m.route.handler(), "me");

        let m = tree.match_route(&Method::GET, "/users/42").unwrap();
        assert_eq!(*m.route.handler(), "by_id");
    }

    #[test]
    fn test_order_independent_of_insertion() {
        let a = RouteNode::new("/")
            .route(Method::GET, "/x/:id", "param")
            .route(Method::GET, "/x/x_:id", "prefixed");
        let b = RouteNode::new("/")
            .route(Method::GET, "/x/x_:id", "prefixed")
            .route(Method::GET, "/x/:id", "param");

        for root in [a, b] {
            let tree = RouteTree::build(root).unwrap();
            let m = tree.match_route(&Method::GET, "/x/x_1").unwrap();
            assert_eq!(*m.route.handler(), "prefixed");
        }
    }

    #[test]
    fn test_conflict_detected() {
        let root = RouteNode::new("/")
            .mount(RouteNode::new("/users").route(Method::GET, ":id", "a"))
            .mount(RouteNode::new("/users").route(Method::GET, ":uid", "b"));
        let err = RouteTree::build(root).unwrap_err();
        assert!(matches!(err, RouteError::Conflict { .. }));
    }

    #[test]
    fn test_same_path_different_methods_ok() {
        let root = RouteNode::new("/users")
            .route(Method::GET, ":id", "get")
            .route(Method::PUT, ":id", "put");
        let tree = RouteTree::build(root).unwrap();
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_not_found() {
        let tree = RouteTree::build(RouteNode::new("/a").route(Method::GET, "", "a")).unwrap();
        let err = tree.match_route(&Method::POST, "/a").unwrap_err();
        assert!(matches!(err, RouteError::NotFound { .. }));
        assert!(tree.match_route(&Method::GET, "/b").is_err());
    }

    #[test]
    fn test_head_falls_back_to_get() {
        let tree = RouteTree::build(RouteNode::new("/a").route(Method::GET, "", "a")).unwrap();
        let m = tree.match_route(&Method::HEAD, "/a/").unwrap();
        assert_eq!(*m.route.handler(), "a");
    }

    #[test]
    fn test_scopes_and_link_scopes() {
        let root = RouteNode::new("/api").unit("root").mount(
            RouteNode::new("/users")
                .unit("users")
                .route(Method::PUT, "user_:id", "update"),
        );
        let tree = RouteTree::build(root).unwrap();
        let route = &tree.routes()[0];

        assert_eq!(route.path(), "/api/users/user_:id");
        assert_eq!(route.scopes(), ["/api".to_string(), "/api/users".to_string()]);
        assert_eq!(units(route), vec!["root", "users", "update"]);

        let link_scopes: Vec<_> = route.chain().iter().map(|l| l.scope.as_str()).collect();
        assert_eq!(link_scopes, vec!["/api", "/api/users", "/api/users/user_:id"]);
    }

    #[test]
    fn test_sibling_chains_do_not_leak() {
        let root = RouteNode::new("/")
            .mount(RouteNode::new("/a").unit("a-guard").route(Method::GET, "", "a"))
            .mount(RouteNode::new("/b").route(Method::GET, "", "b"));
        let tree = RouteTree::build(root).unwrap();

        let b = tree.match_route(&Method::GET, "/b").unwrap();
        assert_eq!(units(b.route), vec!["b"]);
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        let root: RouteNode<&str> = RouteNode::new("/").mount(RouteNode::new("/bad{"));
        assert!(matches!(
            RouteTree::build(root),
            Err(RouteError::InvalidPattern { .. })
        ));
    }
}
