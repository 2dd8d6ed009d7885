//! # Strata Core
//!
//! Core types shared by every Strata crate:
//!
//! - [`StrataError`] and [`ErrorEnvelope`] - the error taxonomy and its wire form
//! - [`Component`] and [`ContextStore`] - per-request, memoised typed values
//! - [`CallerIdentity`] and [`MarkerEntry`] - who is calling and what they may reach
//! - [`Request`], [`Reply`] and [`Response`] - transport-neutral request and outcome

#![doc(html_root_url = "https://docs.rs/strata-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod component;
mod error;
mod identity;
mod request;

pub use component::{Component, ComponentId, ContextStore};
pub use error::{ErrorCategory, ErrorEnvelope, StrataError, StrataResult};
pub use identity::{CallerIdentity, MarkerEntry, Session};
pub use request::{Reply, Request, Response};
