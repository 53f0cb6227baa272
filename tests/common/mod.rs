//! Shared utilities for integration tests: a mock loopback identity service.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use tailnet_listener::config::OverlayConfig;
use tailnet_listener::engine::simulated::SimulatedEngine;
use tailnet_listener::transport::{
    BindEndpoint, ConnectionListenerAdapter, ConnectionListenerFactory, ListenerFactory,
};

pub const ALICE_ADDR: &str = "100.101.102.103:50000";
pub const BOB_ADDR: &str = "100.101.102.104:50001";
pub const CAROL_ADDR: &str = "100.101.102.105:50002";

/// What the mock answers for one address.
#[derive(Clone)]
pub enum Answer {
    Identity(Value),
    Status(u16),
    Body(&'static str),
    /// Hold the request this long, then answer with the identity.
    Stall(Duration, Value),
}

/// Observations shared between the mock and the test.
#[derive(Default)]
pub struct MockState {
    pub credential: String,
    pub delay: Duration,
    pub answers: Mutex<HashMap<String, Answer>>,
    pub requests: AtomicUsize,
    pub rejected: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    /// Engine's accepted-connection count observed at each lookup.
    pub accepted_at_request: Mutex<Vec<usize>>,
    pub engine: Option<Arc<SimulatedEngine>>,
}

pub struct MockLocalApi {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockLocalApi {
    pub fn answer(&self, address: &str, answer: Answer) {
        self.state
            .answers
            .lock()
            .unwrap()
            .insert(address.to_string(), answer);
    }

    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub fn rejected(&self) -> usize {
        self.state.rejected.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn accepted_at_request(&self) -> Vec<usize> {
        self.state.accepted_at_request.lock().unwrap().clone()
    }
}

pub fn identity(display_name: &str, login_name: &str, node: &str) -> Value {
    json!({
        "Node": {
            "ID": 4815162342u64,
            "StableID": "nZ3tR5CNTRL",
            "Name": format!("{}.tail1234.ts.net.", node),
            "Addresses": ["100.101.102.103/32"],
            "Hostinfo": {"OS": "linux", "Hostname": node},
            "ComputedName": node
        },
        "UserProfile": {
            "ID": 1234567,
            "LoginName": login_name,
            "DisplayName": display_name,
            "ProfilePicURL": "https://pic/x.png"
        },
        "CapMap": null
    })
}

pub fn alice() -> Value {
    identity("Alice", "alice@example.com", "laptop")
}

async fn whois(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);

    let expected_auth = format!(
        "Basic {}",
        BASE64_STANDARD.encode(format!(":{}", state.credential))
    );
    let header_ok = headers
        .get("sec-tailscale")
        .map(|v| v == "localapi")
        .unwrap_or(false);
    let auth_ok = headers
        .get("authorization")
        .map(|v| v == expected_auth.as_str())
        .unwrap_or(false);
    if !header_ok || !auth_ok {
        state.rejected.fetch_add(1, Ordering::SeqCst);
        return StatusCode::FORBIDDEN.into_response();
    }

    if let Some(engine) = &state.engine {
        state
            .accepted_at_request
            .lock()
            .unwrap()
            .push(engine.accepted_count());
    }
    let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(current, Ordering::SeqCst);
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    state.in_flight.fetch_sub(1, Ordering::SeqCst);

    let answer = query
        .get("addr")
        .and_then(|addr| state.answers.lock().unwrap().get(addr).cloned());
    match answer {
        Some(Answer::Identity(body)) => Json(body).into_response(),
        Some(Answer::Status(code)) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        Some(Answer::Body(body)) => (StatusCode::OK, body).into_response(),
        Some(Answer::Stall(delay, body)) => {
            tokio::time::sleep(delay).await;
            Json(body).into_response()
        }
        None => (StatusCode::NOT_FOUND, "no match for IP:port").into_response(),
    }
}

/// Start a mock loopback service and point `engine`'s loopback call at it.
pub async fn start_mock_localapi(engine: &Arc<SimulatedEngine>, delay: Duration) -> MockLocalApi {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let state = Arc::new(MockState {
        credential: engine.local_api_credential(),
        delay,
        engine: Some(Arc::clone(engine)),
        ..Default::default()
    });
    let app = Router::new()
        .route("/localapi/v0/whois", get(whois))
        .with_state(Arc::clone(&state));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    engine.set_loopback_address(addr.to_string());
    MockLocalApi { addr, state }
}

/// Bind the default overlay endpoint on `engine`.
pub fn bind(engine: &Arc<SimulatedEngine>) -> (ListenerFactory, ConnectionListenerAdapter) {
    bind_with_timeout(engine, 2)
}

/// Bind with an identity lookup deadline of `whois_timeout_secs`.
pub fn bind_with_timeout(
    engine: &Arc<SimulatedEngine>,
    whois_timeout_secs: u64,
) -> (ListenerFactory, ConnectionListenerAdapter) {
    let mut config = OverlayConfig::default();
    config.identity.whois_timeout_secs = whois_timeout_secs;
    let mut factory = ListenerFactory::new(engine.clone(), &config);
    let adapter = factory
        .bind(&BindEndpoint::overlay(&config.listener))
        .unwrap();
    (factory, adapter)
}

/// Make a dialed peer usable from async code.
pub fn into_async(peer: std::os::unix::net::UnixStream) -> tokio::net::UnixStream {
    peer.set_nonblocking(true).unwrap();
    tokio::net::UnixStream::from_std(peer).unwrap()
}
