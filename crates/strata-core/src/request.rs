//! Transport-neutral request and response values.

use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use strata_router::Params;

use crate::error::{StrataError, StrataResult};

/// An inbound request as seen by the chain.
///
/// The server adapter builds it from the transport; tests build it directly.
///
/// # Example
///
/// ```
/// use http::Method;
/// use strata_core::Request;
///
/// let request = Request::new(Method::GET, "/api/users?page=2")
///     .with_header("x-forwarded-for", "10.0.0.1, 10.0.0.2");
///
/// assert_eq!(request.path(), "/api/users");
/// assert_eq!(request.query_param("page"), Some("2"));
/// assert_eq!(request.header("x-forwarded-for"), Some("10.0.0.1, 10.0.0.2"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    params: Params,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Creates a request for `target`, which may carry a `?query`.
    #[must_use]
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (target, None),
        };
        Self {
            method,
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: Params::new(),
            remote_addr: None,
        }
    }

    /// Builds a request from `http` parts and a collected body.
    #[must_use]
    pub fn from_parts(
        parts: http::request::Parts,
        body: Bytes,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(ToString::to_string),
            headers: parts.headers,
            body,
            params: Params::new(),
            remote_addr,
        }
    }

    /// Adds a header. Invalid names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and content type.
    pub fn with_json<T: Serialize>(self, value: &T) -> StrataResult<Self> {
        let body = serde_json::to_vec(value).map_err(|e| {
            StrataError::internal_with_source("request body serialization failed", e)
        })?;
        Ok(self.with_header(CONTENT_TYPE.as_str(), "application/json").with_body(body))
    }

    /// Sets the transport peer address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Stores the parameters captured by the route match.
    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// First value of a query parameter, undecoded.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == name).then_some(value)
        })
    }

    /// All headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header as text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Raw body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Deserialises the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> StrataResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| StrataError::validation(format!("invalid JSON body: {e}")))
    }

    /// Path parameters captured by the matched route.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Raw value of a path parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Transport peer address.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

/// A successful terminal value.
///
/// The body is serialised as-is with status 200 unless a unit sets another.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    status: StatusCode,
    body: Option<Value>,
    headers: HeaderMap,
}

impl Reply {
    /// A 200 reply with a JSON body.
    #[must_use]
    pub fn new(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: Some(body),
            headers: HeaderMap::new(),
        }
    }

    /// Serialises `value` into a 200 reply.
    pub fn json<T: Serialize>(value: &T) -> StrataResult<Self> {
        serde_json::to_value(value)
            .map(Self::new)
            .map_err(|e| StrataError::internal_with_source("reply serialization failed", e))
    }

    /// A 204 reply without a body.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            body: None,
            headers: HeaderMap::new(),
        }
    }

    /// Overrides the status.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Adds a response header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Reply status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Reply body.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Reply headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// The final, transport-ready outcome of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Status code.
    pub status: StatusCode,
    /// Headers to send.
    pub headers: HeaderMap,
    /// JSON body, absent for 204 replies.
    pub body: Option<Value>,
}

impl Response {
    /// Converts a successful reply.
    #[must_use]
    pub fn from_reply(reply: Reply) -> Self {
        Self {
            status: reply.status,
            headers: reply.headers,
            body: reply.body,
        }
    }

    /// Converts an error into its envelope.
    #[must_use]
    pub fn from_error(err: &StrataError) -> Self {
        let envelope = err.to_envelope();
        let mut headers = HeaderMap::new();
        if let StrataError::RateLimited {
            retry_after_seconds: Some(seconds),
            ..
        } = err
        {
            headers.insert(http::header::RETRY_AFTER, HeaderValue::from(*seconds));
        }
        Self {
            status: err.status_code(),
            headers,
            body: serde_json::to_value(envelope).ok(),
        }
    }

    /// Merges headers set by units during the chain walk. Existing keys win.
    pub fn merge_headers(&mut self, extra: HeaderMap) {
        for (name, value) in &extra {
            if !self.headers.contains_key(name) {
                self.headers.insert(name.clone(), value.clone());
            }
        }
    }

    /// Serialises the body to bytes.
    #[must_use]
    pub fn body_bytes(&self) -> Bytes {
        self.body
            .as_ref()
            .and_then(|body| serde_json::to_vec(body).ok())
            .map(Bytes::from)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_target_without_query() {
        let request = Request::new(Method::POST, "/users");
        assert_eq!(request.path(), "/users");
        assert_eq!(request.query(), None);
        assert_eq!(request.query_param("x"), None);
    }

    #[test]
    fn test_query_flags() {
        let request = Request::new(Method::GET, "/?verbose&limit=5");
        assert_eq!(request.query_param("verbose"), Some(""));
        assert_eq!(request.query_param("limit"), Some("5"));
    }

    #[test]
    fn test_json_body() {
        #[derive(Debug, Deserialize)]
        struct Body {
            name: String,
        }

        let request = Request::new(Method::POST, "/users").with_body(r#"{"name":"ada"}"#);
        let body: Body = request.json().unwrap();
        assert_eq!(body.name, "ada");

        let bad = Request::new(Method::POST, "/users").with_body("{");
        let err = bad.json::<Body>().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_reply_defaults_to_ok() {
        let reply = Reply::json(&serde_json::json!({ "id": 1 })).unwrap();
        assert_eq!(reply.status(), StatusCode::OK);

        let response = Response::from_reply(reply);
        assert_eq!(response.body_bytes(), Bytes::from_static(br#"{"id":1}"#));
    }

    #[test]
    fn test_empty_reply() {
        let response = Response::from_reply(Reply::empty());
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert!(response.body_bytes().is_empty());
    }

    #[test]
    fn test_error_response_sets_retry_after() {
        let response = Response::from_error(&StrataError::rate_limited("slow", Some(30)));
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers["retry-after"], "30");
        assert_eq!(response.body.unwrap()["status"], 429);
    }

    #[test]
    fn test_merge_headers_keeps_existing() {
        let mut response = Response::from_reply(
            Reply::empty().with_header(
                HeaderName::from_static("x-a"),
                HeaderValue::from_static("reply"),
            ),
        );
        let mut extra = HeaderMap::new();
        extra.insert("x-a", HeaderValue::from_static("unit"));
        extra.insert("x-b", HeaderValue::from_static("unit"));
        response.merge_headers(extra);

        assert_eq!(response.headers["x-a"], "reply");
        assert_eq!(response.headers["x-b"], "unit");
    }
}
