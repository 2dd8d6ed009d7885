//! Prefix-mounted route tree for Strata.
//!
//! Routes are declared as a tree of [`RouteNode`]s. Each node has a mount
//! prefix, an ordered local chain of units, terminal endpoints and mounted
//! children. [`RouteTree::build`] flattens the tree once at startup into
//! compiled routes whose chain is every ancestor's local chain, root first,
//! followed by the terminal handler.
//!
//! The tree is generic over the unit type `U`, so it knows nothing about how
//! units run. The middleware crate instantiates it with shared unit handles.
//!
//! # Path syntax
//!
//! - `:name` captures one segment (or the remainder of a segment after a
//!   literal, as in `user_:id`)
//! - `:name{re}` captures text matching `re`
//! - `{re}` matches `re` without capturing
//!
//! # Example
//!
//! ```rust
//! use http::Method;
//! use strata_router::{RouteNode, RouteTree};
//!
//! let tree = RouteTree::build(
//!     RouteNode::new("/api")
//!         .unit("trace")
//!         .mount(
//!             RouteNode::new("/users")
//!                 .unit("guard")
//!                 .route(Method::PUT, "user_:id", "update_user"),
//!         ),
//! )
//! .unwrap();
//!
//! let matched = tree.match_route(&Method::PUT, "/api/users/user_9").unwrap();
//! assert_eq!(*matched.route.handler(), "update_user");
//! assert_eq!(matched.params.get("id"), Some("9"));
//! assert_eq!(matched.route.scopes(), ["/api", "/api/users"]);
//! ```

mod error;
mod node;
mod params;
mod pattern;
mod tree;

pub use error::RouteError;
pub use node::{Endpoint, RouteNode};
pub use params::Params;
pub use pattern::{join, Pattern};
pub use tree::{ChainLink, Route, RouteMatch, RouteTree};
