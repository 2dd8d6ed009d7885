//! # Strata Middleware
//!
//! Chain execution and the built-in units of the Strata request pipeline.
//!
//! A route's chain is the concatenation of the local chains of every node on
//! the path from the root, followed by the route's handler. Units declared
//! near the root therefore run before anything declared deeper:
//!
//! ```text
//! /api        [Trace.init, AccessGuard.check, RateLimit.check]
//!   /users    [Users.load]
//!     PUT user_:id -> Users.update
//!
//! PUT /api/users/user_7:
//!   Trace.init → AccessGuard.check → RateLimit.check → Users.load → Users.update
//! ```
//!
//! ## Modules
//!
//! | Module       | Purpose                                              |
//! |--------------|------------------------------------------------------|
//! | [`unit`]     | The [`Unit`] trait and the [`Flow`] it returns       |
//! | [`context`]  | Per-request [`Context`]                              |
//! | [`executor`] | Interprets flows, including jumps                    |
//! | [`marker`]   | Route markers aggregated at assembly time            |
//! | [`stages`]   | Tracing, access and rate-limit units                 |
//! | [`app`]      | [`AppBuilder`], [`App::dispatch`], the route listing |
//! | [`health`]   | Liveness and readiness handlers                      |

#![doc(html_root_url = "https://docs.rs/strata-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
pub mod context;
pub mod executor;
pub mod health;
pub mod marker;
pub mod stages;
pub mod unit;

pub use app::{listing_handler, App, AppBuilder, RouteDescriptor, RouteListing};
pub use context::{Completion, CompletionHook, Context, Cursor, RouteInfo};
pub use executor::Executor;
pub use marker::{scope_marks, AccessMarkerList, MarkerAggregator, MarkerSource};
pub use unit::{
    handler_fn, unit_fn, BoxFuture, Flow, FnUnit, Handler, HandlerUnit, ParamDescriptor,
    ParamSource, ResponseContract, Unit, UnitId, UnitNode, UnitRef,
};
