//! # Strata Server
//!
//! Serves a Strata [`App`](strata_middleware::App) over HTTP/1.1 with hyper.
//!
//! The server owns nothing but transport: it reads the request body, records
//! the peer address, dispatches, and writes the JSON outcome. Two failures
//! are produced here rather than by the chain:
//!
//! | Condition                           | Status |
//! |-------------------------------------|--------|
//! | Request body could not be read      | `400`  |
//! | Request exceeded `request_timeout`  | `504`  |
//!
//! A request cut off by the timeout is dropped mid-chain, so it leaves no
//! request record.

#![doc(html_root_url = "https://docs.rs/strata-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod server;
pub mod shutdown;

pub use error::ServerError;
pub use server::{into_http, HttpResponse, Server, ServerBuilder};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
