use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use serde_json::Value;
use tokio::net::TcpListener;

use jimeng_client::{JimengClient, connect};
use jimeng_core::config::{ClientConfig, Region};
use jimeng_core::retry::RetryPolicy;
use jimeng_core::signature::Credentials;

pub const TEST_ACCESS_KEY: &str = "AKTEST";
pub const TEST_SESSION_TOKEN: &str = "session-token";

/// A request as seen by the fixture server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[derive(Default)]
struct ServerState {
    /// Scripted replies; the last one repeats once the others are used.
    replies: Mutex<VecDeque<(u16, String)>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct TestServer {
    pub base_url: String,
    state: Arc<ServerState>,
}

impl TestServer {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    /// Client pointed at this server, with short retry delays.
    pub fn client(&self, max_retries: u32) -> JimengClient {
        let config = ClientConfig::new(Region::Cn)
            .with_base_url(self.base_url.clone())
            .with_retry(RetryPolicy::new(max_retries, Duration::from_millis(10)))
            .with_request_timeout(Duration::from_secs(5));
        connect(config).unwrap()
    }
}

pub fn credentials() -> Credentials {
    Credentials::new(TEST_ACCESS_KEY, "SKTEST").with_session_token(TEST_SESSION_TOKEN)
}

pub fn envelope(data: Value) -> (u16, String) {
    (200, serde_json::json!({ "ret": "0", "errmsg": "success", "data": data }).to_string())
}

pub fn remote_failure(ret: &str, errmsg: &str) -> (u16, String) {
    (200, serde_json::json!({ "ret": ret, "errmsg": errmsg }).to_string())
}

pub fn status(code: u16, body: &str) -> (u16, String) {
    (code, body.to_string())
}

/// Start a fixture server answering every request with the scripted replies.
pub async fn spawn_server(replies: Vec<(u16, String)>) -> TestServer {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let state = Arc::new(ServerState {
        replies: Mutex::new(replies.into()),
        requests: Mutex::new(Vec::new()),
    });
    let router = Router::new().fallback(handle).with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{addr}"),
        state,
    }
}

async fn handle(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        headers,
        body,
    });

    let mut replies = state.replies.lock().unwrap();
    let (code, body) = if replies.len() > 1 {
        replies.pop_front().unwrap()
    } else {
        replies
            .front()
            .cloned()
            .unwrap_or_else(|| envelope(Value::Null))
    };
    (StatusCode::from_u16(code).unwrap(), body)
}
