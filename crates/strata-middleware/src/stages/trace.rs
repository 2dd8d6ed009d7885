//! Per-request trace accumulation.
//!
//! [`TraceInit`] runs first in the chain. It creates the request's [`Trace`]
//! component and registers a completion hook that turns the trace into one
//! [`RequestRecord`] and hands it to the configured sink. Business units
//! never log the request themselves; they only attach state to the trace.
//!
//! - [`Trace::attach`] stores a deferred read of a component, evaluated when
//!   the record is flushed, so the record shows the component's final state.
//! - [`Trace::watch`] stores a snapshot taken right now, tagged with the
//!   unit that took it.
//!
//! Both move the record's `current_time` forward.
//!
//! ## Timings
//!
//! - `lifetime_ms`: from the first touch of the request to the hook firing,
//!   including time spent sleeping in rate-limit delays or waiting on I/O
//! - `duration_ms`: from trace start to the moment the outcome was final

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use strata_core::{Component, ComponentId, Request, StrataError, StrataResult};
use strata_telemetry::{RequestRecord, WatchRecord};
use tokio::time::Instant;
use uuid::Uuid;

use crate::context::{Completion, Context};
use crate::unit::{BoxFuture, Flow, Unit, UnitId};

/// Header carrying a client supplied idempotence key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// A component whose state can be written into the request record.
pub trait Snapshot {
    /// Current state as JSON.
    fn snapshot(&self) -> Value;
}

type Deferred = Box<dyn Fn() -> Value + Send + Sync>;

struct TraceState {
    attachments: Vec<(ComponentId, Deferred)>,
    watches: Vec<WatchRecord>,
    current_time: DateTime<Utc>,
}

/// The trace of one request.
pub struct Trace {
    idempotence_key: String,
    started: Instant,
    start_time: DateTime<Utc>,
    hooked: AtomicBool,
    state: Mutex<TraceState>,
}

impl Component for Trace {
    const ID: ComponentId = ComponentId::new("Trace");

    fn create(request: &Request) -> StrataResult<Self> {
        let idempotence_key = request
            .header(IDEMPOTENCY_KEY_HEADER)
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map_or_else(|| Uuid::now_v7().to_string(), ToString::to_string);

        let start_time = Utc::now();
        Ok(Self {
            idempotence_key,
            started: Instant::now(),
            start_time,
            hooked: AtomicBool::new(false),
            state: Mutex::new(TraceState {
                attachments: Vec::new(),
                watches: Vec::new(),
                current_time: start_time,
            }),
        })
    }
}

impl Trace {
    /// The request's idempotence key.
    #[must_use]
    pub fn idempotence_key(&self) -> &str {
        &self.idempotence_key
    }

    /// Attaches component `T`, resolving it if needed. Its snapshot is taken
    /// when the record is flushed.
    ///
    /// Attaching the same component twice keeps one entry.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error if [`TraceInit`] has not run, and
    /// with `T`'s own error if it cannot be resolved.
    pub fn attach<T: Component + Snapshot>(ctx: &mut Context) -> StrataResult<()> {
        let trace = Self::current(ctx)?;
        let component = ctx.resolve::<T>()?;

        let mut state = trace.state.lock();
        if !state.attachments.iter().any(|(id, _)| *id == T::ID) {
            state
                .attachments
                .push((T::ID, Box::new(move || component.snapshot())));
        }
        state.current_time = Utc::now();
        Ok(())
    }

    /// Records `value` as it is now, under `label`.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error if [`TraceInit`] has not run, and
    /// with an internal error if `value` does not serialise.
    pub fn watch<V: Serialize>(ctx: &Context, label: &str, value: &V) -> StrataResult<()> {
        let trace = Self::current(ctx)?;
        let value = serde_json::to_value(value)
            .map_err(|e| StrataError::internal_with_source("watch value serialization failed", e))?;
        let origin = ctx
            .cursor()
            .map_or_else(|| "<outside chain>".to_string(), |c| c.origin.to_string());

        let elapsed = Instant::now().saturating_duration_since(trace.started);
        let mut state = trace.state.lock();
        state.watches.push(WatchRecord {
            label: label.to_string(),
            origin,
            elapsed_ms: millis(elapsed),
            value,
        });
        state.current_time = Utc::now();
        Ok(())
    }

    fn current(ctx: &Context) -> StrataResult<Arc<Self>> {
        ctx.get::<Self>().ok_or_else(|| {
            StrataError::configuration("request trace used before `Trace.init` ran in the chain")
        })
    }

    /// Builds the final record. Deferred attachments are evaluated here.
    fn finish(&self, done: &Completion<'_>, received_at: Instant) -> RequestRecord {
        let fired = Instant::now();
        let duration = done.finished_at.saturating_duration_since(self.started);
        let lifetime = fired.saturating_duration_since(received_at);

        let state = self.state.lock();
        let attachments = state
            .attachments
            .iter()
            .map(|(id, read)| (id.to_string(), read()))
            .collect();

        RequestRecord {
            idempotence_key: self.idempotence_key.clone(),
            method: done.method.to_string(),
            path: done.path.to_string(),
            route: done.route.map(ToString::to_string),
            status: done.status.as_u16(),
            start_time: self.start_time,
            current_time: state.current_time,
            finish_time: Utc::now(),
            lifetime_ms: millis(lifetime),
            duration_ms: millis(duration),
            error: done.error.map(ToString::to_string),
            attachments,
            watches: state.watches.clone(),
        }
    }
}

impl std::fmt::Debug for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Trace")
            .field("idempotence_key", &self.idempotence_key)
            .field("start_time", &self.start_time)
            .field("current_time", &state.current_time)
            .field(
                "attachments",
                &state.attachments.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            )
            .field("watches", &state.watches.len())
            .finish_non_exhaustive()
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Starts the request trace and schedules its single flush.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceInit;

impl TraceInit {
    fn start(ctx: &mut Context) -> StrataResult<()> {
        let trace = ctx.resolve::<Trace>()?;
        if trace.hooked.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let sink = ctx.sink();
        let received_at = ctx.received_at();
        ctx.on_complete(Box::new(move |done: &Completion<'_>| {
            sink.emit(trace.finish(done, received_at));
        }));
        Ok(())
    }
}

impl Unit for TraceInit {
    fn id(&self) -> UnitId {
        UnitId::new("Trace.init")
    }

    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Flow> {
        let flow = match Self::start(ctx) {
            Ok(()) => Flow::Proceed,
            Err(err) => Flow::Fail(err),
        };
        Box::pin(std::future::ready(flow))
    }
}
