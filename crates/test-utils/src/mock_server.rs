//! A scripted HTTP server for exercising API clients.
//!
//! Every request is recorded and answered by a responder closure, so tests
//! can assert on what a client sent as well as how it handles replies.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};

/// A request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Body parsed as JSON, panicking if it is not JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|e| panic!("request body to {} is not JSON: {}", self.path, e))
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Header value by lower-case name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Value of a query-string parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == name).then(|| value.to_string())
        })
    }
}

/// A scripted reply.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl MockResponse {
    pub fn ok(body: serde_json::Value) -> Self {
        Self { status: 200, body }
    }

    pub fn status(status: u16, body: serde_json::Value) -> Self {
        Self { status, body }
    }

    /// A Google-style error body.
    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({
                "error": {"code": status, "message": message, "status": "ERROR"}
            }),
        }
    }
}

type Responder = dyn Fn(&RecordedRequest) -> MockResponse + Send + Sync;

#[derive(Clone)]
struct ServerState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    responder: Arc<Responder>,
}

/// A running mock server bound to a random local port.
pub struct MockServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    /// Start serving; each request is answered by `responder`.
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
    {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = ServerState {
            requests: requests.clone(),
            responder: Arc::new(responder),
        };

        let router = Router::new().fallback(handle).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock server");
        let addr = listener.local_addr().expect("mock server has no address");

        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        Self { addr, requests }
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Snapshot of all requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("request log poisoned").clone()
    }

    /// Requests whose path matches exactly.
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

async fn handle(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers: headers
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect(),
        body: body.to_vec(),
    };

    let reply = (state.responder)(&request);
    state
        .requests
        .lock()
        .expect("request log poisoned")
        .push(request);

    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_and_replies() {
        let server = MockServer::start(|req| {
            if req.path == "/ping" {
                MockResponse::ok(serde_json::json!({"pong": true}))
            } else {
                MockResponse::error(404, "not found")
            }
        })
        .await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/ping?x=1&y=two", server.url()))
            .body("{\"hello\": 1}")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let missing = client.get(format!("{}/other", server.url())).send().await.unwrap();
        assert_eq!(missing.status(), 404);

        let recorded = server.requests_to("/ping");
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].method, "POST");
        assert_eq!(recorded[0].query_param("y").as_deref(), Some("two"));
        assert_eq!(recorded[0].json()["hello"], 1);
        assert_eq!(server.requests().len(), 2);
    }
}
