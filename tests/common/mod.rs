//! Canned-response HTTP server for REST store tests
//!
//! An axum router on its own tokio runtime thread, so the blocking client
//! under test never runs inside an async context. Every request is recorded
//! before its response is sent, and answered from a handler closure.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use tokio::sync::oneshot;

/// One request as received by the server.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    /// Path including the query string.
    pub path: String,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Path without the query string.
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or_default()
    }

    pub fn is(&self, method: &str, endpoint: &str) -> bool {
        self.method == method && self.route() == format!("/api/2.0/mlflow/{endpoint}")
    }
}

pub type Response = (u16, String);

type Handler = dyn Fn(&Request, &str) -> Response + Send + Sync;

#[derive(Clone)]
struct ServerState {
    handler: Arc<Handler>,
    base_url: String,
    requests: Arc<Mutex<Vec<Request>>>,
}

pub struct MockServer {
    base_url: String,
    requests: Arc<Mutex<Vec<Request>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockServer {
    /// Start serving on an ephemeral port. The handler gets each request and
    /// the server's base URL.
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&Request, &str) -> Response + Send + Sync + 'static,
    {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let state = ServerState {
            handler: Arc::new(handler),
            base_url: base_url.clone(),
            requests: Arc::clone(&requests),
        };
        let app = Router::new().fallback(respond).with_state(state);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown_rx.await;
                    })
                    .await
                    .unwrap();
            });
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// Recorded requests to one endpoint, in arrival order.
    pub fn requests_to(&self, method: &str, endpoint: &str) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.is(method, endpoint))
            .collect()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn respond(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let request = Request {
        method: method.to_string(),
        path: uri
            .path_and_query()
            .map_or_else(|| uri.path().to_string(), ToString::to_string),
        headers: headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap().to_string(),
                )
            })
            .collect(),
        body: body.to_vec(),
    };

    let (status, body) = (state.handler)(&request, &state.base_url);
    state.requests.lock().unwrap().push(request);
    (
        StatusCode::from_u16(status).unwrap(),
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
}

/// `runs/get` / `runs/create` response body.
pub fn run_json(run_id: &str, experiment_id: &str, artifact_uri: &str) -> String {
    serde_json::json!({
        "run": {
            "info": {
                "run_id": run_id,
                "run_uuid": run_id,
                "experiment_id": experiment_id,
                "run_name": "canned",
                "user_id": "tester",
                "status": "RUNNING",
                "start_time": "1700000000000",
                "artifact_uri": artifact_uri,
                "lifecycle_stage": "active"
            },
            "data": {
                "tags": [{"key": "mlflow.user", "value": "tester"}],
                "params": [{"key": "seed", "value": "7"}]
            }
        }
    })
    .to_string()
}
