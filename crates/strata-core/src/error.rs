//! Error types for Strata.
//!
//! [`StrataError`] is the single error type that crosses the chain boundary.
//! Every unit failure is one of its variants, and the dispatcher converts it
//! exactly once into an [`ErrorEnvelope`] of the form
//! `{ "message": ..., "status": ..., "data": ... }`.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_router::RouteError;
use thiserror::Error;

/// Result type alias using [`StrataError`].
pub type StrataResult<T> = Result<T, StrataError>;

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Route, marker or chain misconfiguration.
    Configuration,
    /// No route matched.
    NotFound,
    /// Invalid input.
    Validation,
    /// Marker check failed.
    AccessDenied,
    /// No valid session.
    AuthRequired,
    /// Rate ceiling exceeded.
    RateLimited,
    /// Raised by a handler with its own status.
    Business,
    /// Anything else.
    Internal,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this category.
    ///
    /// Business errors carry their own status; `400` is only the fallback.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Configuration | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Validation | Self::Business => StatusCode::BAD_REQUEST,
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::AuthRequired => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

/// Standard error type for Strata.
///
/// # Example
///
/// ```
/// use http::StatusCode;
/// use strata_core::StrataError;
///
/// let err = StrataError::business(StatusCode::CONFLICT, "email already taken");
/// let envelope = err.to_envelope();
///
/// assert_eq!(envelope.status, 409);
/// assert_eq!(envelope.message, "email already taken");
/// ```
#[derive(Error, Debug)]
pub enum StrataError {
    /// Route, marker or chain misconfiguration. Fatal at startup.
    #[error("configuration error: {message}")]
    Configuration {
        /// Human-readable error message.
        message: String,
    },

    /// No route matches the request.
    #[error("no route for {method} {path}")]
    RouteNotFound {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
    },

    /// Request input is invalid.
    #[error("validation error: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
        /// Field level details.
        data: Option<Value>,
    },

    /// The caller lacks a grant for one of the route's marker scopes.
    #[error("access denied: {message}")]
    AccessDenied {
        /// Human-readable error message.
        message: String,
        /// The marker name whose check failed.
        marker: Option<String>,
    },

    /// The request has no valid session.
    #[error("authentication required: {message}")]
    AuthRequired {
        /// Human-readable error message.
        message: String,
    },

    /// The caller exceeded the hard ceiling of a rate-limited scope.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Human-readable error message.
        message: String,
        /// Seconds until the current window ends.
        retry_after_seconds: Option<u64>,
    },

    /// Ad-hoc error raised by a handler.
    #[error("{message}")]
    Business {
        /// Response status.
        status: StatusCode,
        /// Human-readable error message.
        message: String,
        /// Optional payload for the client.
        data: Option<Value>,
    },

    /// Internal failure. The source is logged, never sent to clients.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl StrataError {
    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a route-not-found error.
    #[must_use]
    pub fn route_not_found(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::RouteNotFound {
            method: method.into(),
            path: path.into(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            data: None,
        }
    }

    /// Creates a validation error with field details.
    #[must_use]
    pub fn validation_with_data(message: impl Into<String>, data: Value) -> Self {
        Self::Validation {
            message: message.into(),
            data: Some(data),
        }
    }

    /// Creates an access-denied error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
            marker: None,
        }
    }

    /// Creates an access-denied error naming the failed marker.
    #[must_use]
    pub fn access_denied_for(marker: impl Into<String>) -> Self {
        let marker = marker.into();
        Self::AccessDenied {
            message: format!("missing grant for `{marker}`"),
            marker: Some(marker),
        }
    }

    /// Creates an auth-required error.
    #[must_use]
    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::AuthRequired {
            message: message.into(),
        }
    }

    /// Creates a rate-limited error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after_seconds: Option<u64>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after_seconds,
        }
    }

    /// Creates a business error with an explicit status.
    #[must_use]
    pub fn business(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Business {
            status,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches client-visible data to a business or validation error.
    #[must_use]
    pub fn with_data(self, value: Value) -> Self {
        match self {
            Self::Business {
                status, message, ..
            } => Self::Business {
                status,
                message,
                data: Some(value),
            },
            Self::Validation { message, .. } => Self::Validation {
                message,
                data: Some(value),
            },
            other => other,
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::RouteNotFound { .. } => ErrorCategory::NotFound,
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::AccessDenied { .. } => ErrorCategory::AccessDenied,
            Self::AuthRequired { .. } => ErrorCategory::AuthRequired,
            Self::RateLimited { .. } => ErrorCategory::RateLimited,
            Self::Business { .. } => ErrorCategory::Business,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Business { status, .. } => *status,
            other => other.category().default_status_code(),
        }
    }

    /// Converts this error into the client-facing envelope.
    ///
    /// Configuration and internal errors are reported generically so that
    /// misconfiguration details stay in the logs.
    #[must_use]
    pub fn to_envelope(&self) -> ErrorEnvelope {
        let status = self.status_code();
        let message = match self {
            Self::Configuration { .. } | Self::Internal { .. } => status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string(),
            Self::RouteNotFound { .. } => "Not Found".to_string(),
            Self::Validation { message, .. }
            | Self::AccessDenied { message, .. }
            | Self::AuthRequired { message }
            | Self::RateLimited { message, .. }
            | Self::Business { message, .. } => message.clone(),
        };

        ErrorEnvelope {
            message,
            status: status.as_u16(),
            data: self.envelope_data(),
        }
    }

    fn envelope_data(&self) -> Option<Value> {
        match self {
            Self::Validation { data, .. } | Self::Business { data, .. } => data.clone(),
            Self::RateLimited {
                retry_after_seconds: Some(seconds),
                ..
            } => Some(serde_json::json!({ "retry_after_seconds": seconds })),
            Self::AccessDenied {
                marker: Some(marker),
                ..
            } => Some(serde_json::json!({ "marker": marker })),
            _ => None,
        }
    }
}

impl From<RouteError> for StrataError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::NotFound { method, path } => Self::RouteNotFound { method, path },
            other => Self::configuration(other.to_string()),
        }
    }
}

/// Serialisable error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Human-readable message.
    pub message: String,
    /// HTTP status code.
    pub status: u16,
    /// Optional error payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
