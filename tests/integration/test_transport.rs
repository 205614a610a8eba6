//! Integration tests for the HTTP transport against a local mock service.
//!
//! Each test starts an axum server on an ephemeral port that replays
//! scripted chat-completions replies.

mod common;

use std::time::Duration;

use common::{find_available_port, spawn_mock_server, test_settings, MockReply};
use coursecraft_engine::{FailureKind, HttpTransport, TimeoutPhase, Transport, TransportError};

const MODEL: &str = "deepseek-chat";

// ============================================================================
// Success
// ============================================================================

/// Tests that the message content is returned and the request is well formed.
#[tokio::test]
async fn test_success_returns_message_content() {
    let (url, server) = spawn_mock_server(vec![MockReply::completion("你好")]).await;
    let transport = HttpTransport::new(test_settings(&url)).expect("valid settings");

    let content = transport
        .send("写一段课程介绍", MODEL, 0.7)
        .await
        .expect("request should succeed");

    assert_eq!(content, "你好");
    assert_eq!(server.request_count(), 1);
    assert_eq!(server.authorizations(), vec!["Bearer test-key".to_string()]);

    let body = &server.requests()[0];
    assert_eq!(body["model"], MODEL);
    assert_eq!(body["stream"], false);
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"], "写一段课程介绍");
}

// ============================================================================
// Retries
// ============================================================================

/// Tests that a retryable status is retried and a later success returned.
#[tokio::test]
async fn test_service_unavailable_is_retried() {
    let (url, server) = spawn_mock_server(vec![
        MockReply::status(503, "busy"),
        MockReply::status(429, "slow down"),
        MockReply::completion("ok"),
    ])
    .await;
    let transport = HttpTransport::new(test_settings(&url)).expect("valid settings");

    let content = transport.send("prompt", MODEL, 0.7).await.expect("third try succeeds");

    assert_eq!(content, "ok");
    assert_eq!(server.request_count(), 3);
}

/// Tests that retries stop after `max_retries` and the last status is reported.
#[tokio::test]
async fn test_retries_are_bounded() {
    let (url, server) = spawn_mock_server(vec![]).await;
    let transport = HttpTransport::new(test_settings(&url)).expect("valid settings");

    let err = transport.send("prompt", MODEL, 0.7).await.unwrap_err();

    assert!(matches!(err, TransportError::HttpError { status: 500, .. }));
    assert!(err.is_transient());
    // One attempt plus two retries.
    assert_eq!(server.request_count(), 3);
}

/// Tests that a non-retryable status fails immediately as permanent.
#[tokio::test]
async fn test_not_found_is_not_retried() {
    let (url, server) = spawn_mock_server(vec![MockReply::status(404, "no such model")]).await;
    let transport = HttpTransport::new(test_settings(&url)).expect("valid settings");

    let err = transport.send("prompt", MODEL, 0.7).await.unwrap_err();

    match &err {
        TransportError::HttpError { status, body } => {
            assert_eq!(*status, 404);
            assert_eq!(body, "no such model");
        }
        other => panic!("expected HttpError, got: {other:?}"),
    }
    assert_eq!(err.kind(), FailureKind::TransportPermanent);
    assert_eq!(server.request_count(), 1);
}

// ============================================================================
// Failures
// ============================================================================

/// Tests that a slow response is reported as a read timeout.
#[tokio::test]
async fn test_slow_response_is_read_timeout() {
    let (url, server) = spawn_mock_server(vec![
        MockReply::completion("late").delayed(Duration::from_secs(4))
    ])
    .await;
    let mut settings = test_settings(&url);
    settings.connect_timeout = Duration::from_secs(1);
    settings.read_timeout = Duration::from_secs(1);
    settings.max_retries = 0;
    let transport = HttpTransport::new(settings).expect("valid settings");

    let err = transport.send("prompt", MODEL, 0.7).await.unwrap_err();

    assert!(
        matches!(
            err,
            TransportError::Timeout {
                phase: TimeoutPhase::Read,
                ..
            }
        ),
        "expected read timeout, got: {err:?}"
    );
    assert!(err.is_transient());
    assert_eq!(server.request_count(), 1);
}

/// Tests that a body without message content is an invalid response.
#[tokio::test]
async fn test_unexpected_body_is_invalid_response() {
    let (url, _server) = spawn_mock_server(vec![
        MockReply::status(200, "not json"),
        MockReply::status(200, r#"{"choices": []}"#),
    ])
    .await;
    let transport = HttpTransport::new(test_settings(&url)).expect("valid settings");

    let err = transport.send("prompt", MODEL, 0.7).await.unwrap_err();
    assert!(matches!(err, TransportError::InvalidResponse(_)));

    let err = transport.send("prompt", MODEL, 0.7).await.unwrap_err();
    assert!(matches!(err, TransportError::InvalidResponse(_)));
}

/// Tests that a refused connection carries diagnostics after retries.
#[tokio::test]
async fn test_refused_connection_has_diagnostics() {
    let port = find_available_port();
    let url = format!("http://127.0.0.1:{port}/v1/chat/completions");
    let mut settings = test_settings(&url);
    settings.max_retries = 1;
    let transport = HttpTransport::new(settings).expect("valid settings");

    let err = transport.send("prompt", MODEL, 0.7).await.unwrap_err();

    match &err {
        TransportError::ConnectionFailure { diagnostics, .. } => {
            let diagnostics = diagnostics.as_ref().expect("diagnostics gathered");
            assert_eq!(diagnostics.host, "127.0.0.1");
            assert!(diagnostics.tcp.is_err());
        }
        other => panic!("expected ConnectionFailure, got: {other:?}"),
    }
    assert!(err.is_transient());
}

/// Tests that a missing key fails before any request is made.
#[tokio::test]
async fn test_missing_key_is_unauthorized() {
    let (url, server) = spawn_mock_server(vec![MockReply::completion("unused")]).await;
    let mut settings = test_settings(&url);
    settings.api_key = None;
    let transport = HttpTransport::new(settings).expect("valid settings");

    let err = transport.send("prompt", MODEL, 0.7).await.unwrap_err();

    assert!(matches!(err, TransportError::Unauthorized));
    assert_eq!(err.kind(), FailureKind::CredentialMissing);
    assert_eq!(server.request_count(), 0);
}
