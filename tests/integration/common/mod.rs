//! Scripted chat-completions server shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use coursecraft_engine::TransportSettings;
use serde_json::{json, Value};

/// Path the mock serves completions on.
pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// One scripted reply.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl MockReply {
    /// A successful completion whose message content is `content`.
    pub fn completion(content: &str) -> Self {
        Self {
            status: 200,
            body: json!({
                "id": "chatcmpl-test",
                "object": "chat.completion",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": content},
                    "finish_reason": "stop"
                }]
            })
            .to_string(),
            delay: Duration::ZERO,
        }
    }

    /// A reply with an arbitrary status and raw body.
    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    /// Delays the reply.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Shared state of the mock server.
#[derive(Clone, Default)]
pub struct MockServer {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    requests: Arc<Mutex<Vec<Value>>>,
    authorizations: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    /// Number of requests received.
    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("lock poisoned").len()
    }

    /// Bodies of all requests received.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().expect("lock poisoned").clone()
    }

    /// Authorization headers of all requests received.
    pub fn authorizations(&self) -> Vec<String> {
        self.authorizations.lock().expect("lock poisoned").clone()
    }
}

/// Helper to find an available port for testing.
pub fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

async fn handle_completion(
    State(server): State<MockServer>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    server.requests.lock().expect("lock poisoned").push(body);
    if let Some(auth) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        server
            .authorizations
            .lock()
            .expect("lock poisoned")
            .push(auth.to_string());
    }

    // Unscripted calls get a retryable server error.
    let reply = server
        .replies
        .lock()
        .expect("lock poisoned")
        .pop_front()
        .unwrap_or_else(|| MockReply::status(500, "no scripted reply"));

    tokio::time::sleep(reply.delay).await;
    let status = StatusCode::from_u16(reply.status).expect("valid status code");
    (status, reply.body)
}

/// Spawns the mock server with scripted replies and returns its completions URL.
pub async fn spawn_mock_server(replies: Vec<MockReply>) -> (String, MockServer) {
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");
    let url = format!("http://{addr}{COMPLETIONS_PATH}");

    let server = MockServer {
        replies: Arc::new(Mutex::new(replies.into())),
        ..MockServer::default()
    };
    let router = Router::new()
        .route(COMPLETIONS_PATH, post(handle_completion))
        .with_state(server.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (url, server)
}

/// Transport settings pointing at `url` with a test key and no backoff.
pub fn test_settings(url: &str) -> TransportSettings {
    TransportSettings {
        api_key: Some("test-key".to_string()),
        api_url: url.to_string(),
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(5),
        max_retries: 2,
        backoff_factor: 0.0,
    }
}
