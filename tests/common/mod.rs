#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use nowplaying::logging::DiagnosticLog;
use nowplaying::spotify::auth::RefresherOptions;
use nowplaying::spotify::{CredentialSet, CredentialStore, TokenRefresher};

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn bytes(content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type,
            body,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

impl Recorded {
    pub fn form(&self) -> HashMap<String, String> {
        serde_urlencoded::from_str(&self.body).unwrap()
    }
}

#[derive(Default)]
struct State {
    requests: Mutex<Vec<Recorded>>,
    queued: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    fixed: Mutex<HashMap<String, MockResponse>>,
    delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl State {
    fn next(&self, path: &str) -> MockResponse {
        if let Some(response) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(|queue| queue.pop_front())
        {
            return response;
        }
        self.fixed
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_else(|| MockResponse::json(404, r#"{"error":{"status":404,"message":"no mock"}}"#))
    }
}

/// In-process HTTP endpoint standing in for the account service and Web API
pub struct MockServer {
    pub url: String,
    state: Arc<State>,
    shutdown: CancellationToken,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let state = Arc::new(State::default());
        let shutdown = CancellationToken::new();

        let server_state = state.clone();
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = tokio::select! {
                    _ = server_shutdown.cancelled() => break,
                    accepted = listener.accept() => accepted.unwrap(),
                };
                let state = server_state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let state = state.clone();
                        async move { Ok::<_, Infallible>(handle(state, req).await) }
                    });
                    let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
                });
            }
        });

        Self { url, state, shutdown }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.url)
    }

    /// Answer every request to `path` with `response` once the queue is drained
    pub fn respond(&self, path: &str, response: MockResponse) {
        self.state.fixed.lock().unwrap().insert(path.to_string(), response);
    }

    /// Answer the next request to `path` with `response`
    pub fn enqueue(&self, path: &str, response: MockResponse) {
        self.state
            .queued
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = delay;
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle(state: Arc<State>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(current, Ordering::SeqCst);

    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let authorization = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = req.into_body().collect().await.unwrap().to_bytes();

    state.requests.lock().unwrap().push(Recorded {
        method,
        path: path.clone(),
        query,
        authorization,
        body: String::from_utf8_lossy(&body).to_string(),
    });

    let delay = *state.delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mock = state.next(&path);
    state.in_flight.fetch_sub(1, Ordering::SeqCst);

    Response::builder()
        .status(mock.status)
        .header("Content-Type", mock.content_type)
        .body(Full::new(Bytes::from(mock.body)))
        .unwrap()
}

pub const TOKEN_PATH: &str = "/api/token";

pub fn credentials() -> CredentialSet {
    CredentialSet::new(8080, "client-id", "client-secret", "http://localhost/callback/").with_access_token("auth-code")
}

/// Store `credentials` in `dir` and build a refresher pointed at `token_url`
pub fn refresher(dir: &Path, credentials: &CredentialSet, token_url: String, interval: Duration) -> TokenRefresher {
    let store = CredentialStore::new(dir.join("credentials.json"));
    store.persist(credentials).unwrap();
    TokenRefresher::load(
        store,
        DiagnosticLog::new(dir.join("messages.log")),
        RefresherOptions {
            token_url,
            interval,
            timeout: Duration::from_secs(5),
        },
    )
    .unwrap()
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_for<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
