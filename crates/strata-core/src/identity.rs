//! Caller identity and access grants.
//!
//! A [`MarkerEntry`] is both what a route requires and what a caller holds:
//! the marker aggregator produces entries per route, and a session carries
//! the entries it was granted, grouped by marker name.

use std::collections::HashMap;
use std::fmt;

use http::Method;
use serde::{Deserialize, Serialize};

/// One access constraint: a mount scope or an exact method and path.
///
/// Serialises as `{"prefix": "/api"}` or `{"method": "put", "path": "/api/users/user_:id"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkerEntry {
    /// Grants everything mounted below `prefix`.
    Prefix {
        /// Composed mount prefix.
        prefix: String,
    },
    /// Grants one endpoint.
    Route {
        /// Lowercase HTTP method.
        method: String,
        /// Route path pattern.
        path: String,
    },
}

impl MarkerEntry {
    /// Creates a prefix entry.
    #[must_use]
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix {
            prefix: prefix.into(),
        }
    }

    /// Creates a route entry. The method is stored lowercase.
    #[must_use]
    pub fn route(method: &Method, path: impl Into<String>) -> Self {
        Self::Route {
            method: method.as_str().to_ascii_lowercase(),
            path: path.into(),
        }
    }
}

impl fmt::Display for MarkerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix { prefix } => write!(f, "{prefix}/*"),
            Self::Route { method, path } => write!(f, "{method} {path}"),
        }
    }
}

/// An authenticated session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Stable session identifier.
    pub session_id: String,
    /// Held grants keyed by marker name.
    #[serde(default)]
    pub grants: HashMap<String, Vec<MarkerEntry>>,
}

impl Session {
    /// Creates a session with no grants.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            grants: HashMap::new(),
        }
    }

    /// Adds a grant under `marker`.
    #[must_use]
    pub fn grant(mut self, marker: impl Into<String>, entry: MarkerEntry) -> Self {
        self.grants.entry(marker.into()).or_default().push(entry);
        self
    }
}

/// Who is making the request.
///
/// # Example
///
/// ```
/// use strata_core::{CallerIdentity, MarkerEntry, Session};
///
/// let caller = CallerIdentity::Session(
///     Session::new("s-1").grant("access", MarkerEntry::prefix("/api")),
/// );
///
/// assert_eq!(caller.session_id(), Some("s-1"));
/// assert_eq!(caller.grants_for("access").len(), 1);
/// assert!(caller.grants_for("billing").is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallerIdentity {
    /// No session.
    #[default]
    Anonymous,
    /// A resolved session.
    Session(Session),
}

impl CallerIdentity {
    /// Returns the session id, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Session(session) => Some(&session.session_id),
            Self::Anonymous => None,
        }
    }

    /// Returns the grants held under `marker`.
    #[must_use]
    pub fn grants_for(&self, marker: &str) -> &[MarkerEntry] {
        match self {
            Self::Session(session) => session
                .grants
                .get(marker)
                .map(Vec::as_slice)
                .unwrap_or_default(),
            Self::Anonymous => &[],
        }
    }

    /// Returns `true` for anonymous callers.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// A string identifier suitable for logging.
    #[must_use]
    pub fn log_id(&self) -> String {
        match self {
            Self::Session(session) => format!("session:{}", session.session_id),
            Self::Anonymous => "anonymous".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_entry_json_shape() {
        let prefix = serde_json::to_value(MarkerEntry::prefix("/api")).unwrap();
        assert_eq!(prefix, serde_json::json!({ "prefix": "/api" }));

        let route =
            serde_json::to_value(MarkerEntry::route(&Method::PUT, "/api/users/user_:id")).unwrap();
        assert_eq!(
            route,
            serde_json::json!({ "method": "put", "path": "/api/users/user_:id" })
        );
    }

    #[test]
    fn test_marker_entry_deserializes_both_shapes() {
        let entries: Vec<MarkerEntry> = serde_json::from_str(
            r#"[{"prefix":"/api"},{"method":"get","path":"/api/users"}]"#,
        )
        .unwrap();
        assert_eq!(entries[0], MarkerEntry::prefix("/api"));
        assert_eq!(entries[1], MarkerEntry::route(&Method::GET, "/api/users"));
    }

    #[test]
    fn test_anonymous() {
        let caller = CallerIdentity::default();
        assert!(caller.is_anonymous());
        assert_eq!(caller.session_id(), None);
        assert!(caller.grants_for("access").is_empty());
        assert_eq!(caller.log_id(), "anonymous");
    }

    #[test]
    fn test_session_log_id() {
        let caller = CallerIdentity::Session(Session::new("abc"));
        assert_eq!(caller.log_id(), "session:abc");
    }
}
