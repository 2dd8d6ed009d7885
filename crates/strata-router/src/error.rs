//! Route tree error types.

use thiserror::Error;

/// Errors raised while assembling or matching a route tree.
///
/// `InvalidPattern` and `Conflict` are startup errors: they are produced while
/// the tree is being built and must abort startup. `NotFound` is the only
/// variant that can occur at request time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// A path pattern could not be compiled.
    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two endpoints claim the same method and path shape.
    #[error("route conflict: {method} {path} overlaps {existing}")]
    Conflict {
        /// HTTP method shared by both endpoints.
        method: String,
        /// The endpoint that was registered second.
        path: String,
        /// The endpoint that was registered first.
        existing: String,
    },

    /// No route matches the method and path.
    #[error("no route for {method} {path}")]
    NotFound {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
    },
}

impl RouteError {
    pub(crate) fn invalid(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors that can only happen while building the tree.
    #[must_use]
    pub fn is_startup_error(&self) -> bool {
        !matches!(self, Self::NotFound { .. })
    }
}
