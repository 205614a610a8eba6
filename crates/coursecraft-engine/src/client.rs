//! HTTP transport to an `OpenAI`-compatible chat completions service.
//!
//! The transport owns connection-layer concerns only: timeouts, bounded
//! retry with exponential backoff on transient statuses, and advisory
//! connection diagnostics. It never decides between remote and synthetic
//! content and never touches [`crate::health::ApiHealth`].

use std::future::Future;
use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use serde_json::Value;

use crate::error::FailureKind;

/// HTTP statuses retried at the connection layer.
pub const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Longest pause between connection-layer retries.
pub const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Budget for the raw TCP probe run after a connection failure.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Credential values that are template placeholders rather than real keys.
const PLACEHOLDER_KEYS: [&str; 3] = ["", "your-api-key", "你的API密钥"];

// ============================================================================
// Transport trait
// ============================================================================

/// Sends a prompt to a text-generation service and returns the reply text.
///
/// Implemented by [`HttpTransport`]; tests substitute scripted transports.
pub trait Transport {
    /// Sends one prompt.
    ///
    /// Implementations may retry internally but must return a single final
    /// outcome per call.
    fn send(
        &self,
        prompt: &str,
        model: &str,
        temperature: f32,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;
}

// ============================================================================
// Errors
// ============================================================================

/// Which phase of the HTTP exchange ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// Establishing the TCP/TLS connection.
    Connect,
    /// Waiting for or reading the response.
    Read,
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Read => write!(f, "read"),
        }
    }
}

/// Results of probing the API host after a connection failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDiagnostics {
    /// Host that was probed.
    pub host: String,
    /// Number of resolved addresses, or the resolver error.
    pub dns: Result<usize, String>,
    /// Outcome of a raw TCP connect to the host and port.
    pub tcp: Result<(), String>,
}

impl std::fmt::Display for ConnectionDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.dns {
            Ok(count) => write!(f, "DNS for {} resolved ({count} addresses)", self.host)?,
            Err(e) => write!(f, "DNS for {} failed: {e}", self.host)?,
        }
        match &self.tcp {
            Ok(()) => write!(f, ", TCP connect succeeded"),
            Err(e) => write!(f, ", TCP connect failed: {e}"),
        }
    }
}

/// Errors returned by a [`Transport`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// No usable credential is configured. No request was sent.
    #[error("API key is not configured\n\nSuggestion: Set apiKey in coursecraft.json or export COURSECRAFT_API_KEY")]
    Unauthorized,

    /// A timeout expired.
    #[error("API call timed out during {phase} after {}s\n\nSuggestion: Check your network connection or retry later", .budget.as_secs())]
    Timeout {
        /// Phase that timed out.
        phase: TimeoutPhase,
        /// Budget configured for that phase.
        budget: Duration,
    },

    /// The connection could not be established.
    #[error("Connection to API failed: {message}{}", format_diagnostics(.diagnostics.as_ref()))]
    ConnectionFailure {
        /// Underlying error chain.
        message: String,
        /// Advisory probe results, when they could be gathered.
        diagnostics: Option<ConnectionDiagnostics>,
    },

    /// The service answered with a non-success status.
    #[error("API returned HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// A success response did not contain `choices[0].message.content`.
    #[error("API response has no message content: {0}")]
    InvalidResponse(String),

    /// The request was rejected before sending.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Any other client error.
    #[error("Unexpected transport error: {0}")]
    Unknown(String),
}

fn format_diagnostics(diagnostics: Option<&ConnectionDiagnostics>) -> String {
    diagnostics.map_or_else(String::new, |d| format!("\nDiagnostics: {d}"))
}

impl TransportError {
    /// Classifies this error for retry and fallback decisions.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unauthorized => FailureKind::CredentialMissing,
            Self::Timeout { .. }
            | Self::ConnectionFailure { .. }
            | Self::InvalidResponse(_)
            | Self::Unknown(_) => FailureKind::TransportTransient,
            Self::HttpError { status, .. } if RETRY_STATUSES.contains(status) => {
                FailureKind::TransportTransient
            }
            Self::HttpError { .. } | Self::InvalidRequest(_) => FailureKind::TransportPermanent,
        }
    }

    /// Returns `true` if a later attempt may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::TransportTransient
    }

    /// Returns `true` for failures the transport itself retries.
    fn retried_by_transport(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::ConnectionFailure { .. } => true,
            Self::HttpError { status, .. } => RETRY_STATUSES.contains(status),
            _ => false,
        }
    }
}

// ============================================================================
// HttpTransport
// ============================================================================

/// Connection settings for [`HttpTransport`].
#[derive(Clone)]
pub struct TransportSettings {
    /// Bearer credential.
    pub api_key: Option<String>,
    /// Chat completions endpoint.
    pub api_url: String,
    /// Budget for establishing a connection.
    pub connect_timeout: Duration,
    /// Budget for waiting on and reading the response.
    pub read_timeout: Duration,
    /// Additional attempts after the first for transient failures.
    pub max_retries: u32,
    /// Base of the exponential backoff, in seconds.
    pub backoff_factor: f64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: "https://api.deepseek.com/v1/chat/completions".to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(120),
            max_retries: 3,
            backoff_factor: 0.5,
        }
    }
}

impl std::fmt::Debug for TransportSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("max_retries", &self.max_retries)
            .field("backoff_factor", &self.backoff_factor)
            .finish()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// [`Transport`] over `reqwest`, reusing one pooled client for every call.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    settings: TransportSettings,
}

impl HttpTransport {
    /// Builds a transport.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidRequest`] if the URL does not parse,
    /// or [`TransportError::Unknown`] if the HTTP client cannot be built.
    pub fn new(settings: TransportSettings) -> Result<Self, TransportError> {
        let url = Url::parse(&settings.api_url).map_err(|e| {
            TransportError::InvalidRequest(format!("invalid API URL '{}': {e}", settings.api_url))
        })?;
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .timeout(settings.connect_timeout + settings.read_timeout)
            .build()
            .map_err(|e| TransportError::Unknown(error_chain(&e)))?;
        Ok(Self {
            client,
            url,
            settings,
        })
    }

    /// Returns the settings this transport was built with.
    #[must_use]
    pub const fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    fn credential(&self) -> Option<&str> {
        self.settings
            .api_key
            .as_deref()
            .filter(|key| !is_placeholder_key(key))
    }

    async fn post_once(&self, key: &str, request: &ChatRequest<'_>) -> Result<String, TransportError> {
        let response = self
            .client
            .post(self.url.clone())
            .bearer_auth(key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "API responded");
        let body = response.text().await.map_err(|e| self.classify(&e))?;

        if !status.is_success() {
            return Err(TransportError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        message_content(&body)
    }

    fn classify(&self, err: &reqwest::Error) -> TransportError {
        if err.is_timeout() {
            if err.is_connect() {
                TransportError::Timeout {
                    phase: TimeoutPhase::Connect,
                    budget: self.settings.connect_timeout,
                }
            } else {
                TransportError::Timeout {
                    phase: TimeoutPhase::Read,
                    budget: self.settings.read_timeout,
                }
            }
        } else if err.is_connect() {
            TransportError::ConnectionFailure {
                message: error_chain(err),
                diagnostics: None,
            }
        } else {
            TransportError::Unknown(error_chain(err))
        }
    }
}

impl Transport for HttpTransport {
    async fn send(&self, prompt: &str, model: &str, temperature: f32) -> Result<String, TransportError> {
        validate_request(prompt, temperature)?;
        let key = self.credential().ok_or(TransportError::Unauthorized)?;

        let request = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
            stream: false,
        };

        tracing::info!(
            url = %self.url,
            model,
            prompt_chars = prompt.chars().count(),
            "Calling generation API"
        );

        let mut retry_index = 0;
        loop {
            match self.post_once(key, &request).await {
                Ok(content) => return Ok(content),
                Err(err) if err.retried_by_transport() && retry_index < self.settings.max_retries => {
                    let delay = backoff_delay(self.settings.backoff_factor, retry_index);
                    tracing::warn!(
                        error = %err,
                        retry = retry_index + 1,
                        delay_ms = delay.as_millis(),
                        "Transient API failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry_index += 1;
                }
                Err(TransportError::ConnectionFailure { message, .. }) => {
                    let diagnostics = diagnose(&self.url).await;
                    if let Some(diagnostics) = &diagnostics {
                        tracing::warn!(%diagnostics, "Connection diagnostics");
                    }
                    return Err(TransportError::ConnectionFailure {
                        message,
                        diagnostics,
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Returns `true` for empty keys and template placeholders such as `<your key>`.
#[must_use]
pub fn is_placeholder_key(key: &str) -> bool {
    let key = key.trim();
    PLACEHOLDER_KEYS.contains(&key) || (key.starts_with('<') && key.ends_with('>'))
}

/// Delay before retry number `retry_index` (zero-based), capped at [`MAX_BACKOFF`].
#[must_use]
pub fn backoff_delay(backoff_factor: f64, retry_index: u32) -> Duration {
    let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
    let secs = backoff_factor.max(0.0) * 2f64.powi(exponent);
    if secs.is_finite() && secs < MAX_BACKOFF.as_secs_f64() {
        Duration::from_secs_f64(secs)
    } else {
        MAX_BACKOFF
    }
}

fn validate_request(prompt: &str, temperature: f32) -> Result<(), TransportError> {
    if prompt.trim().is_empty() {
        return Err(TransportError::InvalidRequest("prompt is empty".to_string()));
    }
    if !(0.0..=2.0).contains(&temperature) {
        return Err(TransportError::InvalidRequest(format!(
            "temperature {temperature} is outside [0, 2]"
        )));
    }
    Ok(())
}

fn message_content(body: &str) -> Result<String, TransportError> {
    let payload: Value = serde_json::from_str(body)
        .map_err(|e| TransportError::InvalidResponse(format!("body is not JSON: {e}")))?;
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| TransportError::InvalidResponse(truncate(body, 200)))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Probes DNS and TCP reachability of the API host.
///
/// Results are advisory and never change the error being reported.
async fn diagnose(url: &Url) -> Option<ConnectionDiagnostics> {
    let host = url
        .host_str()?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = url.port_or_known_default().unwrap_or(443);

    let dns = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map(Iterator::count)
        .map_err(|e| e.to_string());

    let tcp = match tokio::time::timeout(
        PROBE_TIMEOUT,
        tokio::net::TcpStream::connect((host.as_str(), port)),
    )
    .await
    {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("no answer within {}s", PROBE_TIMEOUT.as_secs())),
    };

    Some(ConnectionDiagnostics { host, dns, tcp })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn transport_with_key(key: Option<&str>) -> HttpTransport {
        HttpTransport::new(TransportSettings {
            api_key: key.map(str::to_string),
            api_url: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            max_retries: 0,
            ..TransportSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn test_placeholder_keys() {
        assert!(is_placeholder_key(""));
        assert!(is_placeholder_key("  "));
        assert!(is_placeholder_key("your-api-key"));
        assert!(is_placeholder_key("你的API密钥"));
        assert!(is_placeholder_key("<DEEPSEEK_API_KEY>"));
        assert!(!is_placeholder_key("sk-live-123"));
    }

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        assert_eq!(backoff_delay(0.5, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(0.5, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(0.5, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(0.5, 20), MAX_BACKOFF);
        assert_eq!(backoff_delay(0.0, 3), Duration::ZERO);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(TransportError::Unauthorized.kind(), FailureKind::CredentialMissing);
        let busy = TransportError::HttpError {
            status: 503,
            body: String::new(),
        };
        assert!(busy.is_transient());
        let missing = TransportError::HttpError {
            status: 404,
            body: String::new(),
        };
        assert_eq!(missing.kind(), FailureKind::TransportPermanent);
        assert_eq!(
            TransportError::InvalidRequest("x".to_string()).kind(),
            FailureKind::TransportPermanent
        );
        let timeout = TransportError::Timeout {
            phase: TimeoutPhase::Read,
            budget: Duration::from_secs(120),
        };
        assert!(timeout.is_transient());
        assert!(timeout.to_string().contains("read after 120s"));
    }

    #[test]
    fn test_message_content_parsing() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        assert_eq!(message_content(body).unwrap(), "hello");

        let err = message_content(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, TransportError::InvalidResponse(_)));

        let err = message_content("<html>").unwrap_err();
        assert!(matches!(err, TransportError::InvalidResponse(_)));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = HttpTransport::new(TransportSettings {
            api_url: "not a url".to_string(),
            ..TransportSettings::default()
        })
        .unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }

    #[test]
    fn test_empty_prompt_rejected_without_network() {
        let transport = transport_with_key(Some("sk-test"));
        let err = tokio_test::block_on(transport.send("   ", "deepseek-chat", 0.7)).unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }

    #[test]
    fn test_temperature_out_of_range_rejected() {
        let transport = transport_with_key(Some("sk-test"));
        let err = tokio_test::block_on(transport.send("hi", "deepseek-chat", 2.5)).unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }

    #[test]
    fn test_missing_credential_is_unauthorized() {
        let transport = transport_with_key(None);
        let err = tokio_test::block_on(transport.send("hi", "deepseek-chat", 0.7)).unwrap_err();
        assert!(matches!(err, TransportError::Unauthorized));

        let transport = transport_with_key(Some("你的API密钥"));
        let err = tokio_test::block_on(transport.send("hi", "deepseek-chat", 0.7)).unwrap_err();
        assert!(matches!(err, TransportError::Unauthorized));
    }

    #[test]
    fn test_settings_debug_redacts_key() {
        let settings = TransportSettings {
            api_key: Some("sk-secret".to_string()),
            ..TransportSettings::default()
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_diagnostics_display() {
        let diagnostics = ConnectionDiagnostics {
            host: "api.example.com".to_string(),
            dns: Ok(2),
            tcp: Err("connection refused".to_string()),
        };
        let text = diagnostics.to_string();
        assert!(text.contains("resolved (2 addresses)"));
        assert!(text.contains("TCP connect failed: connection refused"));

        let err = TransportError::ConnectionFailure {
            message: "refused".to_string(),
            diagnostics: Some(diagnostics),
        };
        assert!(err.to_string().contains("Diagnostics:"));
    }
}
