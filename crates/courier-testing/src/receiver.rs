//! In-process webhook endpoint.
//!
//! Binds an axum server on `127.0.0.1:0`, answers each request with the next
//! scripted status (falling back to the default once the script runs out) and
//! records what it received so tests can verify signatures against the raw
//! bytes.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use bytes::Bytes;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ReceivedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Default)]
struct ReceiverState {
    script: VecDeque<StatusCode>,
    default_status: Option<StatusCode>,
    delay: Option<Duration>,
    received: Vec<ReceivedRequest>,
}

type Shared = Arc<Mutex<ReceiverState>>;

pub struct MockWebhookReceiver {
    addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl MockWebhookReceiver {
    /// Start a receiver that answers every request with `200 OK`.
    pub async fn start() -> Self {
        Self::start_with(StatusCode::OK).await
    }

    /// Start a receiver whose fallback status is `status`.
    pub async fn start_with(status: StatusCode) -> Self {
        let state: Shared = Arc::new(Mutex::new(ReceiverState {
            default_status: Some(status),
            ..Default::default()
        }));

        let app = Router::new()
            .route("/hook", post(record))
            .route("/redirect", post(redirect))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// URL of the recording endpoint.
    pub fn url(&self) -> String {
        format!("http://{}/hook", self.addr)
    }

    /// URL that answers `307` pointing at [`MockWebhookReceiver::url`].
    pub fn redirect_url(&self) -> String {
        format!("http://{}/redirect", self.addr)
    }

    /// Queue statuses returned before falling back to the default.
    pub fn script(&self, statuses: impl IntoIterator<Item = StatusCode>) {
        self.state.lock().unwrap().script.extend(statuses);
    }

    /// Delay every response, for timeout tests.
    pub fn delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.state.lock().unwrap().received.clone()
    }

    pub fn count(&self) -> usize {
        self.state.lock().unwrap().received.len()
    }
}

impl Drop for MockWebhookReceiver {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn record(State(state): State<Shared>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let (status, delay) = {
        let mut s = state.lock().unwrap();
        s.received.push(ReceivedRequest { headers, body });
        let status = s
            .script
            .pop_front()
            .or(s.default_status)
            .unwrap_or(StatusCode::OK);
        (status, s.delay)
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    status
}

async fn redirect() -> (StatusCode, [(axum::http::HeaderName, &'static str); 1]) {
    (
        StatusCode::TEMPORARY_REDIRECT,
        [(axum::http::header::LOCATION, "/hook")],
    )
}
