//! End-to-end dispatch tests.
//!
//! These exercise a full application: route tree, chain executor, context
//! store, access markers, rate limiting and request records together.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::{Method, StatusCode};
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::{json, Value};
use strata_config::RateLimitConfig;
use strata_core::{
    CallerIdentity, Component, ComponentId, MarkerEntry, Reply, Request, Session, StrataError,
    StrataResult,
};
use strata_middleware::stages::{AccessGuard, RateLimiterRegistry, Snapshot, Trace, TraceInit};
use strata_middleware::{
    handler_fn, listing_handler, unit_fn, App, AppBuilder, Flow, UnitId, UnitNode, UnitRef,
};
use strata_telemetry::{MemorySink, Severity};
use tokio::time::Instant;

/// Loads a session from `x-session` and grants every prefix listed in
/// `x-grant` under the `access` marker.
fn session_unit() -> UnitRef {
    Arc::new(unit_fn("Session.load", |ctx| {
        if let Some(id) = ctx.request().header("x-session").map(str::to_string) {
            let grants = ctx.request().header("x-grant").unwrap_or_default().to_string();
            let session = grants
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .fold(Session::new(id), |s, g| s.grant("access", MarkerEntry::prefix(g)));
            ctx.set_identity(CallerIdentity::Session(session));
        }
        Flow::Proceed
    }))
}

fn ok(id: &'static str) -> UnitRef {
    Arc::new(handler_fn(id, move |_ctx| Ok(Reply::new(json!({ "handler": id })))))
}

fn build(root: UnitNode) -> (App, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let app = AppBuilder::new(root).sink(sink.clone()).build().unwrap();
    (app, sink)
}

// ---------------------------------------------------------------------------
// Chain composition
// ---------------------------------------------------------------------------

fn recorder(id: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> UnitRef {
    let log = Arc::clone(log);
    Arc::new(unit_fn(id, move |_ctx| {
        log.lock().push(id);
        Flow::Proceed
    }))
}

const IDS: [&str; 6] = ["L0.run", "L1.run", "L2.run", "L3.run", "L4.run", "L5.run"];

fn nested(depth: usize, log: &Arc<Mutex<Vec<&'static str>>>) -> UnitNode {
    let mut node = UnitNode::new(format!("n{depth}"))
        .unit(recorder(IDS[depth], log))
        .route(Method::GET, "leaf", ok("Leaf.get"));
    for level in (0..depth).rev() {
        node = UnitNode::new(format!("n{level}"))
            .unit(recorder(IDS[level], log))
            .mount(node);
    }
    node
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn executed_chain_is_root_to_leaf_concatenation(depth in 0usize..6) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (app, _) = build(nested(depth, &log));

        let path: String = (0..=depth).map(|l| format!("/n{l}")).collect::<String>() + "/leaf";
        let response = runtime().block_on(app.dispatch(Request::new(Method::GET, &path)));

        prop_assert_eq!(response.status, StatusCode::OK);
        prop_assert_eq!(log.lock().clone(), IDS[..=depth].to_vec());
    }
}

// ---------------------------------------------------------------------------
// Context store
// ---------------------------------------------------------------------------

static PROFILES: AtomicU32 = AtomicU32::new(0);

struct Profile {
    serial: u32,
    visits: AtomicU32,
}

impl Component for Profile {
    const ID: ComponentId = ComponentId::new("Profile");

    fn create(_: &Request) -> StrataResult<Self> {
        Ok(Self {
            serial: PROFILES.fetch_add(1, Ordering::SeqCst),
            visits: AtomicU32::new(0),
        })
    }
}

impl Snapshot for Profile {
    fn snapshot(&self) -> Value {
        json!({ "visits": self.visits.load(Ordering::SeqCst) })
    }
}

#[tokio::test]
async fn same_type_resolves_to_one_instance_per_request() {
    let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

    let first = Arc::clone(&seen);
    let second = Arc::clone(&seen);
    let root = UnitNode::new("/")
        .unit(Arc::new(unit_fn("Profile.first", move |ctx| match ctx.resolve::<Profile>() {
            Ok(p) => {
                first.lock().push(Arc::as_ptr(&p) as usize);
                p.visits.fetch_add(1, Ordering::SeqCst);
                Flow::Proceed
            }
            Err(err) => Flow::Fail(err),
        })))
        .route(
            Method::GET,
            "me",
            Arc::new(handler_fn("Profile.get", move |ctx| {
                let p = ctx.resolve::<Profile>()?;
                second.lock().push(Arc::as_ptr(&p) as usize);
                p.visits.fetch_add(1, Ordering::SeqCst);
                let visits = p.visits.load(Ordering::SeqCst);
                Ok(Reply::new(json!({ "serial": p.serial, "visits": visits })))
            })),
        );
    let (app, _) = build(root);

    let a = app.dispatch(Request::new(Method::GET, "/me")).await;
    let b = app.dispatch(Request::new(Method::GET, "/me")).await;

    assert_eq!(a.body.as_ref().unwrap()["visits"], 2);
    assert_eq!(b.body.as_ref().unwrap()["visits"], 2);
    assert_ne!(a.body.unwrap()["serial"], b.body.unwrap()["serial"]);

    let seen = seen.lock();
    assert_eq!(seen[0], seen[1]);
    assert_eq!(seen[2], seen[3]);
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn limiter_passes_delays_then_rejects_within_window() {
    let limits = RateLimiterRegistry::new();
    let root = UnitNode::new("/api")
        .unit(limits.limiter("/api", RateLimitConfig::new(10, 30, 60, 2)).unwrap())
        .route(Method::GET, "items", ok("Items.list"));
    let (app, _) = build(root);

    let call = || {
        app.dispatch(
            Request::new(Method::GET, "/api/items").with_header("x-forwarded-for", "192.0.2.7"),
        )
    };
    let window_start = Instant::now();

    for n in 1..=10 {
        let started = Instant::now();
        let response = call().await;
        assert_eq!(response.status, StatusCode::OK, "request {n}");
        assert!(started.elapsed() < Duration::from_secs(2), "request {n} was delayed");
    }

    for n in 11..=30 {
        let started = Instant::now();
        let response = call().await;
        assert_eq!(response.status, StatusCode::OK, "request {n}");
        assert!(started.elapsed() >= Duration::from_secs(2), "request {n} was not delayed");
    }

    let rejected = call().await;
    assert_eq!(rejected.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(rejected.body.as_ref().unwrap()["status"], 429);
    assert!(rejected.headers.contains_key(http::header::RETRY_AFTER));

    // Another caller has its own window.
    let other = app
        .dispatch(
            Request::new(Method::GET, "/api/items").with_header("x-forwarded-for", "192.0.2.8"),
        )
        .await;
    assert_eq!(other.status, StatusCode::OK);

    tokio::time::sleep_until(window_start + Duration::from_secs(60)).await;

    let started = Instant::now();
    let fresh = call().await;
    assert_eq!(fresh.status, StatusCode::OK);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(fresh.headers["x-ratelimit-remaining"], "29");
}

// ---------------------------------------------------------------------------
// Markers and access
// ---------------------------------------------------------------------------

fn guarded_api() -> UnitNode {
    UnitNode::new("/api")
        .unit(session_unit())
        .unit(Arc::new(AccessGuard::new()))
        .mount(
            UnitNode::new("/users")
                .route(Method::PUT, "user_:id", ok("Users.update"))
                .route(Method::GET, "", ok("Users.list")),
        )
}

#[test]
fn nested_mounts_produce_exact_marker_list() {
    let (app, _) = build(guarded_api());
    let markers = app.markers_for(&Method::PUT, "/api/users/user_7").unwrap();

    assert_eq!(
        markers.get("access"),
        [
            MarkerEntry::prefix("/api"),
            MarkerEntry::prefix("/api/users"),
            MarkerEntry::prefix("/api/users/user_:id"),
            MarkerEntry::route(&Method::PUT, "/api/users/user_:id"),
        ]
    );
    assert_eq!(markers.names().collect::<Vec<_>>(), ["access"]);
}

#[tokio::test]
async fn access_guard_enforces_markers() {
    let (app, _) = build(guarded_api());
    let put = |headers: &[(&str, &str)]| {
        headers
            .iter()
            .fold(Request::new(Method::PUT, "/api/users/user_7"), |r, (k, v)| r.with_header(k, v))
    };

    let anonymous = app.dispatch(put(&[])).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let outsider = app.dispatch(put(&[("x-session", "s-1"), ("x-grant", "/admin")])).await;
    assert_eq!(outsider.status, StatusCode::FORBIDDEN);
    assert_eq!(outsider.body.unwrap()["data"]["marker"], "access");

    let member = app.dispatch(put(&[("x-session", "s-2"), ("x-grant", "/api/users")])).await;
    assert_eq!(member.status, StatusCode::OK);
    assert_eq!(member.body.unwrap()["handler"], "Users.update");
}

// ---------------------------------------------------------------------------
// Non-linear continuation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn jump_to_missing_unit_is_configuration_error() {
    let root = UnitNode::new("/")
        .unit(Arc::new(TraceInit))
        .unit(Arc::new(unit_fn("Router.skip", |_| Flow::jump_to(["Audit.missing"]))))
        .route(Method::GET, "jump", ok("Jump.get"));
    let (app, sink) = build(root);

    let response = app.dispatch(Request::new(Method::GET, "/jump")).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body.unwrap()["message"], "Internal Server Error");

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let error = records[0].error.as_deref().unwrap();
    assert!(error.starts_with("configuration error"));
    assert!(error.contains("Audit.missing"));
}

#[tokio::test]
async fn jump_skips_units_between() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let root = UnitNode::new("/")
        .unit(Arc::new(unit_fn("Cache.check", |ctx| {
            if ctx.request().header("x-cached").is_some() {
                Flow::JumpTo(vec![UnitId::new("Cache.serve")])
            } else {
                Flow::Proceed
            }
        })))
        .unit(recorder("Db.load", &log))
        .unit(recorder("Cache.serve", &log))
        .route(Method::GET, "item", ok("Item.get"));
    let (app, _) = build(root);

    app.dispatch(Request::new(Method::GET, "/item").with_header("x-cached", "1")).await;
    assert_eq!(*log.lock(), ["Cache.serve"]);

    app.dispatch(Request::new(Method::GET, "/item")).await;
    assert_eq!(*log.lock(), ["Cache.serve", "Db.load", "Cache.serve"]);
}

// ---------------------------------------------------------------------------
// Envelopes and records
// ---------------------------------------------------------------------------

#[tokio::test]
async fn business_error_yields_one_envelope_and_one_record() {
    let root = UnitNode::new("/")
        .unit(Arc::new(TraceInit))
        .unit(Arc::new(unit_fn("Profile.attach", |ctx| match Trace::attach::<Profile>(ctx) {
            Ok(()) => Flow::Proceed,
            Err(err) => Flow::Fail(err),
        })))
        .route(
            Method::POST,
            "orders",
            Arc::new(handler_fn("Orders.create", |ctx| {
                ctx.resolve::<Profile>()?.visits.fetch_add(5, Ordering::SeqCst);
                Trace::watch(ctx, "checkout", &json!({ "step": "payment" }))?;
                Err(StrataError::business(StatusCode::PAYMENT_REQUIRED, "card declined")
                    .with_data(json!({ "retry": false })))
            })),
        );
    let (app, sink) = build(root);

    let response = app
        .dispatch(Request::new(Method::POST, "/orders").with_header("idempotency-key", "order-42"))
        .await;

    assert_eq!(response.status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(
        response.body.unwrap(),
        json!({ "message": "card declined", "status": 402, "data": { "retry": false } })
    );

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.severity(), Severity::Error);
    assert_eq!(record.idempotence_key, "order-42");
    assert_eq!(record.route.as_deref(), Some("/orders"));
    assert_eq!(record.attachments["Profile"], json!({ "visits": 5 }));
    assert_eq!(record.watches[0].origin, "Orders.create");
    assert_eq!(sink.by_severity(Severity::Success).len(), 0);
}

#[tokio::test]
async fn success_is_recorded_on_success_channel() {
    let root = UnitNode::new("/")
        .unit(Arc::new(TraceInit))
        .route(Method::GET, "ping", ok("Ping.get"));
    let (app, sink) = build(root);

    let response = app.dispatch(Request::new(Method::GET, "/ping")).await;
    assert_eq!(response.body.unwrap(), json!({ "handler": "Ping.get" }));
    assert_eq!(sink.by_severity(Severity::Success).len(), 1);
    assert!(sink.records()[0].error.is_none());
}

#[tokio::test]
async fn unmatched_route_gets_generic_not_found() {
    let (app, sink) = build(
        UnitNode::new("/")
            .unit(Arc::new(TraceInit))
            .route(Method::GET, "ping", ok("Ping.get")),
    );

    let response = app.dispatch(Request::new(Method::DELETE, "/ping")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body.unwrap(), json!({ "message": "Not Found", "status": 404 }));
    assert!(sink.is_empty());
}

// ---------------------------------------------------------------------------
// Route listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn listing_round_trips_to_same_handler() {
    let root = UnitNode::new("/")
        .route(Method::GET, "routes", Arc::new(listing_handler("Docs.routes")))
        .mount(guarded_api())
        .mount(
            UnitNode::new("/shop")
                .route(Method::GET, "items/:sku", ok("Items.get"))
                .route(Method::GET, "items/featured", ok("Items.featured"))
                .route(Method::DELETE, "items/:sku", ok("Items.delete")),
        );
    let (app, _) = build(root);

    let response = app.dispatch(Request::new(Method::GET, "/routes")).await;
    let listing: Vec<Value> = serde_json::from_value(response.body.unwrap()).unwrap();
    assert_eq!(listing.len(), app.routes().len());

    for entry in &listing {
        let method: Method = entry["method"].as_str().unwrap().parse().unwrap();
        let path = entry["path"].as_str().unwrap();
        let matched = app.tree().match_route(&method, path).unwrap();
        assert_eq!(matched.route.handler().id().as_str(), entry["handler"].as_str().unwrap());
    }

    let update = listing
        .iter()
        .find(|e| e["handler"] == "Users.update")
        .unwrap();
    assert_eq!(
        update["markers"]["access"],
        json!([
            { "prefix": "/api" },
            { "prefix": "/api/users" },
            { "prefix": "/api/users/user_:id" },
            { "method": "put", "path": "/api/users/user_:id" },
        ])
    );
}
