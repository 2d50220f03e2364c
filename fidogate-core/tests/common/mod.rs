//! In-process mock FIDO2 server for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Route library logs through the test harness (`RUST_LOG` or debug).
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fidogate_core=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Capability document with relative endpoints served by this mock.
pub const FLAT_METADATA: &str = r#"{"assertion_endpoint":"/a","verify_endpoint":"/v"}"#;

/// A well-shaped signed assertion as a browser would post it.
pub const SIGNED_ASSERTION: &str = r#"{
    "id": "Y3JlZC1pZA",
    "rawId": "Y3JlZC1pZA",
    "type": "public-key",
    "clientExtensionResults": {},
    "response": {
        "clientDataJSON": "eyJ0eXBlIjoid2ViYXV0aG4uZ2V0In0",
        "authenticatorData": "SZYN5YgOjGh0NBcPZHZgW4_krrmihjLHmVzzuoMdl2MFAAAAAQ",
        "signature": "MEUCIQD",
        "userHandle": "YWxpY2U"
    }
}"#;

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    fn into_response(self) -> (StatusCode, String) {
        (
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            self.body,
        )
    }
}

pub struct MockState {
    pub discovery: Mutex<Reply>,
    /// When unset, the assertion endpoint issues a challenge naming the user.
    pub assertion: Mutex<Option<Reply>>,
    pub verify: Mutex<Reply>,
    pub discovery_delay: Mutex<Duration>,
    pub verify_delay: Mutex<Duration>,
    pub discovery_hits: AtomicUsize,
    pub assertion_hits: AtomicUsize,
    pub verify_hits: AtomicUsize,
    pub assertion_bodies: Mutex<Vec<Value>>,
    pub verify_bodies: Mutex<Vec<Value>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            discovery: Mutex::new(Reply::ok(FLAT_METADATA)),
            assertion: Mutex::new(None),
            verify: Mutex::new(Reply::ok(r#"{"status":"ok"}"#)),
            discovery_delay: Mutex::new(Duration::ZERO),
            verify_delay: Mutex::new(Duration::ZERO),
            discovery_hits: AtomicUsize::new(0),
            assertion_hits: AtomicUsize::new(0),
            verify_hits: AtomicUsize::new(0),
            assertion_bodies: Mutex::new(Vec::new()),
            verify_bodies: Mutex::new(Vec::new()),
        }
    }
}

pub struct MockFidoServer {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockFidoServer {
    pub async fn start() -> Self {
        init_tracing();
        let state = Arc::new(MockState::default());

        let app = Router::new()
            .route("/.well-known/fido2-configuration", get(discovery))
            .route("/a", post(assertion))
            .route("/v", post(verify))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock server address");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server");
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn set_discovery(&self, reply: Reply) {
        *self.state.discovery.lock().unwrap() = reply;
    }

    pub fn set_assertion(&self, reply: Reply) {
        *self.state.assertion.lock().unwrap() = Some(reply);
    }

    pub fn set_verify(&self, reply: Reply) {
        *self.state.verify.lock().unwrap() = reply;
    }

    pub fn set_discovery_delay(&self, delay: Duration) {
        *self.state.discovery_delay.lock().unwrap() = delay;
    }

    pub fn set_verify_delay(&self, delay: Duration) {
        *self.state.verify_delay.lock().unwrap() = delay;
    }

    pub fn discovery_hits(&self) -> usize {
        self.state.discovery_hits.load(Ordering::SeqCst)
    }

    pub fn assertion_hits(&self) -> usize {
        self.state.assertion_hits.load(Ordering::SeqCst)
    }

    pub fn verify_hits(&self) -> usize {
        self.state.verify_hits.load(Ordering::SeqCst)
    }

    pub fn assertion_bodies(&self) -> Vec<Value> {
        self.state.assertion_bodies.lock().unwrap().clone()
    }

    pub fn verify_bodies(&self) -> Vec<Value> {
        self.state.verify_bodies.lock().unwrap().clone()
    }
}

/// URL of a local port nothing is listening on.
pub fn unreachable_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    let addr = listener.local_addr().expect("free port address");
    drop(listener);
    format!("http://{addr}")
}

async fn discovery(State(state): State<Arc<MockState>>) -> (StatusCode, String) {
    state.discovery_hits.fetch_add(1, Ordering::SeqCst);

    let delay = *state.discovery_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let reply = state.discovery.lock().unwrap().clone();
    reply.into_response()
}

async fn assertion(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    state.assertion_hits.fetch_add(1, Ordering::SeqCst);
    state.assertion_bodies.lock().unwrap().push(body.clone());

    let fixed = state.assertion.lock().unwrap().clone();
    if let Some(reply) = fixed {
        return reply.into_response();
    }

    let username = body["username"].as_str().unwrap_or_default().to_string();

    // Hold the first user back so concurrent requests overlap.
    if username == "alice" {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let challenge = json!({
        "challenge": format!("challenge-for-{username}"),
        "rpId": "localhost",
        "allowCredentials": [],
        "user": { "name": username },
    });
    (StatusCode::OK, challenge.to_string())
}

async fn verify(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    state.verify_hits.fetch_add(1, Ordering::SeqCst);
    state.verify_bodies.lock().unwrap().push(body);

    let delay = *state.verify_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let reply = state.verify.lock().unwrap().clone();
    reply.into_response()
}
