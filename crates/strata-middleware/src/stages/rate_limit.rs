//! Fixed-window rate limiting per scope and caller.
//!
//! ## Algorithm
//!
//! Each key owns a window of `in_seconds`. Every request increments the
//! window's count under the key's map-entry lock:
//!
//! - `count <= safe_requests`: pass immediately
//! - `count <= max_requests`: pass after sleeping `wait_seconds`
//! - otherwise: reject with `429` until the window ends
//!
//! A rejected request still counts, and rejection never restarts the window.
//! Window state is created lazily on first use.
//!
//! ## Keys
//!
//! The key is the limiter's scope followed by the caller: the session id if
//! there is one, else the first address in the trusted proxy header, else
//! the transport peer address.
//!
//! ## Example
//!
//! ```rust
//! use strata_config::RateLimitConfig;
//! use strata_middleware::stages::RateLimiterRegistry;
//!
//! let registry = RateLimiterRegistry::new();
//! let a = registry.limiter("/api", RateLimitConfig::new(10, 30, 60, 2)).unwrap();
//! let b = registry.limiter("/api", RateLimitConfig::new(10, 30, 60, 2)).unwrap();
//! assert!(std::sync::Arc::ptr_eq(&a, &b));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use strata_config::{RateLimitConfig, StrataConfig};
use strata_core::{StrataError, StrataResult};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::context::Context;
use crate::unit::{BoxFuture, Flow, ResponseContract, Unit, UnitId, UnitRef};

/// Rate limit header names.
pub mod headers {
    /// Maximum requests allowed in the window.
    pub const LIMIT: &str = "x-ratelimit-limit";
    /// Remaining requests in the current window.
    pub const REMAINING: &str = "x-ratelimit-remaining";
}

/// Caller part of the key when nothing identifies the caller.
const UNKNOWN_CALLER: &str = "unknown";

/// Unit id of limiters built without an explicit one.
pub const DEFAULT_LIMITER_ID: UnitId = UnitId::new("RateLimit.check");

/// Outcome of one counted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Serve now.
    Pass {
        /// Requests left in the window.
        remaining: u32,
    },
    /// Serve after sleeping.
    Delay {
        /// How long to wait.
        wait: Duration,
        /// Requests left in the window.
        remaining: u32,
    },
    /// Refuse.
    Reject {
        /// Time until the window ends.
        retry_after: Duration,
    },
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    window_start: Instant,
    window: Duration,
    count: u32,
}

impl WindowState {
    fn ends_at(&self) -> Instant {
        self.window_start + self.window
    }
}

/// Shared window counters for every limiter of a registry.
#[derive(Debug, Default)]
pub struct RateLimitStore {
    windows: DashMap<String, WindowState>,
}

impl RateLimitStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one request for `key` at `now` and decides its fate.
    ///
    /// The increment and the comparison happen while the entry is locked,
    /// so concurrent requests for the same key never share a count.
    pub fn hit(&self, key: &str, config: &RateLimitConfig, now: Instant) -> Decision {
        let window = Duration::from_secs(config.in_seconds);
        let mut state = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| WindowState {
                window_start: now,
                window,
                count: 0,
            });

        if now >= state.ends_at() {
            state.window_start = now;
            state.window = window;
            state.count = 0;
        }
        state.count = state.count.saturating_add(1);

        if state.count > config.max_requests {
            Decision::Reject {
                retry_after: state.ends_at().saturating_duration_since(now),
            }
        } else if state.count > config.safe_requests {
            Decision::Delay {
                wait: Duration::from_secs(config.wait_seconds),
                remaining: config.max_requests - state.count,
            }
        } else {
            Decision::Pass {
                remaining: config.max_requests - state.count,
            }
        }
    }

    /// Drops every window that has ended by `now`. Returns how many went.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, state| now < state.ends_at());
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Returns `true` if no key is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Identifies the caller for key derivation.
///
/// Session id first, then the first entry of `trusted_header`, then the
/// peer IP address.
#[must_use]
pub fn caller_key(ctx: &Context, trusted_header: &str) -> String {
    if let Some(session) = ctx.identity().session_id() {
        return format!("session:{session}");
    }
    if let Some(forwarded) = ctx
        .request()
        .header(trusted_header)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return format!("addr:{forwarded}");
    }
    ctx.request()
        .remote_addr()
        .map_or_else(|| UNKNOWN_CALLER.to_string(), |addr| format!("addr:{}", addr.ip()))
}

/// Limiter unit for one scope.
#[derive(Debug)]
pub struct RateLimitUnit {
    id: UnitId,
    scope: String,
    config: RateLimitConfig,
    trusted_header: String,
    store: Arc<RateLimitStore>,
}

impl RateLimitUnit {
    /// The scope prefix of this limiter.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The limits applied.
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn key(&self, ctx: &Context) -> String {
        format!("{}|{}", self.scope, caller_key(ctx, &self.trusted_header))
    }

    fn set_headers(&self, ctx: &mut Context, remaining: u32) {
        ctx.insert_response_header(
            HeaderName::from_static(headers::LIMIT),
            HeaderValue::from(self.config.max_requests),
        );
        ctx.insert_response_header(
            HeaderName::from_static(headers::REMAINING),
            HeaderValue::from(remaining),
        );
    }
}

impl Unit for RateLimitUnit {
    fn id(&self) -> UnitId {
        self.id
    }

    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            let key = self.key(ctx);
            match self.store.hit(&key, &self.config, Instant::now()) {
                Decision::Pass { remaining } => {
                    self.set_headers(ctx, remaining);
                    Flow::Proceed
                }
                Decision::Delay { wait, remaining } => {
                    tracing::debug!(key = %key, wait_ms = wait.as_millis(), "rate limit delay");
                    self.set_headers(ctx, remaining);
                    tokio::time::sleep(wait).await;
                    Flow::Proceed
                }
                Decision::Reject { retry_after } => {
                    tracing::warn!(
                        key = %key,
                        retry_after_ms = retry_after.as_millis(),
                        "rate limit exceeded"
                    );
                    self.set_headers(ctx, 0);
                    let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                    Flow::Fail(StrataError::rate_limited(
                        "Too many requests. Please try again later.",
                        Some(seconds.max(1)),
                    ))
                }
            }
        })
    }

    fn responses(&self) -> Vec<ResponseContract> {
        vec![ResponseContract::new(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded")]
    }
}

/// Hands out one limiter per scope and owns the shared store.
///
/// Limiters are built on first request for a scope and reused for every
/// later one, so all routes naming the same scope share counters.
#[derive(Debug, Clone)]
pub struct RateLimiterRegistry {
    store: Arc<RateLimitStore>,
    limiters: Arc<DashMap<String, Arc<RateLimitUnit>>>,
    seeds: BTreeMap<String, RateLimitConfig>,
    trusted_header: String,
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterRegistry {
    /// An empty registry trusting `x-forwarded-for`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(RateLimitStore::new()),
            limiters: Arc::new(DashMap::new()),
            seeds: BTreeMap::new(),
            trusted_header: "x-forwarded-for".to_string(),
        }
    }

    /// A registry seeded with the scopes and proxy header of `config`.
    #[must_use]
    pub fn from_config(config: &StrataConfig) -> Self {
        Self {
            seeds: config.rate_limits.clone(),
            trusted_header: config.proxy.trusted_header.to_ascii_lowercase(),
            ..Self::new()
        }
    }

    /// Overrides the trusted proxy header.
    #[must_use]
    pub fn with_trusted_header(mut self, header: impl Into<String>) -> Self {
        self.trusted_header = header.into().to_ascii_lowercase();
        self
    }

    /// The limiter for `scope`, built with `config` on first use, under
    /// [`DEFAULT_LIMITER_ID`].
    ///
    /// A later call with different limits gets the existing limiter.
    pub fn limiter(&self, scope: &str, config: RateLimitConfig) -> StrataResult<UnitRef> {
        self.limiter_as(DEFAULT_LIMITER_ID, scope, config)
    }

    /// Like [`limiter`](Self::limiter), with an explicit unit id.
    ///
    /// Unit ids must be unique within a chain, so a chain holding limiters
    /// for several scopes names each one.
    pub fn limiter_as(
        &self,
        id: impl Into<UnitId>,
        scope: &str,
        config: RateLimitConfig,
    ) -> StrataResult<UnitRef> {
        let id = id.into();
        if let Some(existing) = self.limiters.get(scope) {
            if existing.config != config {
                tracing::warn!(scope, "rate limiter already built with different limits");
            }
            if existing.id != id {
                tracing::warn!(
                    scope,
                    id = %existing.id,
                    requested = %id,
                    "rate limiter already built under another id"
                );
            }
            let unit: UnitRef = existing.clone();
            return Ok(unit);
        }

        config
            .validate(scope)
            .map_err(|e| StrataError::configuration(e.to_string()))?;

        let unit: UnitRef = self
            .limiters
            .entry(scope.to_string())
            .or_insert_with(|| {
                tracing::debug!(scope, "rate limiter built");
                Arc::new(RateLimitUnit {
                    id,
                    scope: scope.to_string(),
                    config,
                    trusted_header: self.trusted_header.clone(),
                    store: Arc::clone(&self.store),
                })
            })
            .clone();
        Ok(unit)
    }

    /// The limiter for a scope seeded from configuration.
    pub fn configured(&self, scope: &str) -> StrataResult<UnitRef> {
        self.configured_as(DEFAULT_LIMITER_ID, scope)
    }

    /// Like [`configured`](Self::configured), with an explicit unit id.
    pub fn configured_as(&self, id: impl Into<UnitId>, scope: &str) -> StrataResult<UnitRef> {
        let config = self.seeds.get(scope).copied().ok_or_else(|| {
            StrataError::configuration(format!("no rate limit configured for scope `{scope}`"))
        })?;
        self.limiter_as(id, scope, config)
    }

    /// The shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<RateLimitStore> {
        &self.store
    }

    /// Number of limiters built so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// Returns `true` if no limiter was built yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    /// Periodically evicts ended windows. Must be called within a runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = store.sweep(Instant::now());
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = store.len(), "rate limit windows swept");
                }
            }
        })
    }
}
