//! Accept loop and request adaptation.
//!
//! Each connection is served by hyper's HTTP/1.1 implementation. A request
//! body is collected in full, turned into a [`strata_core::Request`] carrying
//! the peer address, and handed to [`App::dispatch`]. The resulting
//! [`strata_core::Response`] is written back as JSON.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use strata_config::ServerConfig;
use strata_core::{Request, Response, StrataError};
use strata_middleware::health::ReadinessCheck;
use strata_middleware::App;
use tokio::net::{TcpListener, TcpStream};

use crate::error::ServerError;
use crate::shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};

/// HTTP response type written to the wire.
pub type HttpResponse = http::Response<Full<Bytes>>;

const DEFAULT_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Serves an [`App`] over HTTP/1.1.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use http::Method;
/// use strata_middleware::health::HealthCheck;
/// use strata_middleware::{AppBuilder, UnitNode};
/// use strata_server::Server;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let root = UnitNode::new("/")
///     .route(Method::GET, "health", Arc::new(HealthCheck::new("orders", "1.0.0")));
/// let app = AppBuilder::new(root).build()?;
///
/// Server::builder(app).http_addr("127.0.0.1:8080").build().run().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Server {
    app: Arc<App>,
    http_addr: String,
    request_timeout: Duration,
    shutdown_timeout: Duration,
    readiness: Option<ReadinessCheck>,
}

impl Server {
    /// Creates a server from the `server` configuration section.
    #[must_use]
    pub fn new(config: &ServerConfig, app: impl Into<Arc<App>>) -> Self {
        Self::builder(app).config(config).build()
    }

    /// Starts a builder with default settings.
    #[must_use]
    pub fn builder(app: impl Into<Arc<App>>) -> ServerBuilder {
        ServerBuilder {
            app: app.into(),
            http_addr: None,
            request_timeout: None,
            shutdown_timeout: None,
            readiness: None,
        }
    }

    /// The served application.
    #[must_use]
    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// Configured bind address.
    #[must_use]
    pub fn http_addr(&self) -> &str {
        &self.http_addr
    }

    /// Budget for reading and dispatching one request.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// How long shutdown waits for open connections.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Serves until SIGTERM or Ctrl+C.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Binds the configured address and serves until `shutdown` triggers.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr: SocketAddr =
            self.http_addr
                .parse()
                .map_err(|e: std::net::AddrParseError| ServerError::InvalidAddress {
                    addr: self.http_addr.clone(),
                    reason: e.to_string(),
                })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener.
    ///
    /// Once `shutdown` triggers, no new connection is accepted, open
    /// connections finish their in-flight request, and the call returns
    /// when they have closed or the shutdown timeout elapses.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let local = listener.local_addr()?;
        tracing::info!(addr = %local, routes = self.app.tree().len(), "server listening");

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        Arc::clone(&server).spawn_connection(stream, remote, shutdown, token);
                    }
                    Err(e) => tracing::error!(error = %e, "failed to accept connection"),
                },
                () = shutdown.recv() => break,
            }
        }

        if let Some(readiness) = &server.readiness {
            readiness.set_ready(false);
        }

        tracing::info!(
            open = tracker.active(),
            timeout_ms = u64::try_from(server.shutdown_timeout.as_millis()).unwrap_or(u64::MAX),
            "stopped accepting, draining connections"
        );
        if tokio::time::timeout(server.shutdown_timeout, tracker.drained())
            .await
            .is_err()
        {
            tracing::warn!(
                open = tracker.active(),
                "shutdown timeout reached with open connections"
            );
        }

        tracing::info!("server stopped");
        Ok(())
    }

    fn spawn_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote: SocketAddr,
        shutdown: ShutdownSignal,
        token: ConnectionToken,
    ) {
        tokio::spawn(async move {
            let _token = token;
            let service = service_fn(move |request| {
                let server = Arc::clone(&self);
                async move { Ok::<_, Infallible>(server.handle(request, remote).await) }
            });

            let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
            tokio::pin!(conn);

            let mut closing = false;
            let result = loop {
                tokio::select! {
                    result = conn.as_mut() => break result,
                    () = shutdown.recv(), if !closing => {
                        closing = true;
                        conn.as_mut().graceful_shutdown();
                    }
                }
            };

            if let Err(e) = result {
                tracing::debug!(%remote, error = %e, "connection closed with error");
            }
        });
    }

    async fn handle(&self, request: http::Request<Incoming>, remote: SocketAddr) -> HttpResponse {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let outcome = tokio::time::timeout(self.request_timeout, async {
            let (parts, body) = request.into_parts();
            match body.collect().await {
                Ok(collected) => {
                    let request = Request::from_parts(parts, collected.to_bytes(), Some(remote));
                    Ok(self.app.dispatch(request).await)
                }
                Err(e) => Err(e),
            }
        })
        .await;

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(%method, %path, %remote, error = %e, "failed to read request body");
                Response::from_error(&StrataError::validation("Failed to read request body"))
            }
            Err(_) => {
                tracing::warn!(%method, %path, %remote, "request timed out");
                Response::from_error(&StrataError::business(
                    StatusCode::GATEWAY_TIMEOUT,
                    "Gateway Timeout",
                ))
            }
        };

        into_http(response)
    }
}

/// Converts a dispatch outcome into a wire response.
///
/// Bodies are JSON; a `content-type` already set by a unit is kept.
#[must_use]
pub fn into_http(response: Response) -> HttpResponse {
    let body = response.body_bytes();
    let has_body = response.body.is_some();

    let mut out = http::Response::new(Full::new(body));
    *out.status_mut() = response.status;
    *out.headers_mut() = response.headers;
    if has_body {
        out.headers_mut()
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));
    }
    out
}

/// Builder for [`Server`].
#[derive(Debug)]
pub struct ServerBuilder {
    app: Arc<App>,
    http_addr: Option<String>,
    request_timeout: Option<Duration>,
    shutdown_timeout: Option<Duration>,
    readiness: Option<ReadinessCheck>,
}

impl ServerBuilder {
    /// Applies every field of a `server` configuration section.
    #[must_use]
    pub fn config(self, config: &ServerConfig) -> Self {
        self.http_addr(config.http_addr.clone())
            .request_timeout(Duration::from_secs(config.request_timeout_secs))
            .shutdown_timeout(Duration::from_secs(config.shutdown_timeout_secs))
    }

    /// Sets the bind address.
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.http_addr = Some(addr.into());
        self
    }

    /// Sets the per-request budget. Requests exceeding it get a `504`.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets how long shutdown waits for open connections.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Readiness handler to flip to not-ready when shutdown starts.
    ///
    /// Pass a clone of the handler mounted in the app; clones share state.
    #[must_use]
    pub fn readiness(mut self, readiness: ReadinessCheck) -> Self {
        self.readiness = Some(readiness);
        self
    }

    /// Builds the server.
    #[must_use]
    pub fn build(self) -> Server {
        Server {
            app: self.app,
            http_addr: self.http_addr.unwrap_or_else(|| DEFAULT_ADDR.to_string()),
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_TIMEOUT),
            shutdown_timeout: self.shutdown_timeout.unwrap_or(DEFAULT_TIMEOUT),
            readiness: self.readiness,
        }
    }
}
