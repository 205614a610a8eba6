//! Error types for the course generation engine.
//!
//! [`CourseError`] covers process-level failures (configuration, session
//! files, invalid requests). Generation-path failures never escape the
//! orchestrator; they are classified by [`FailureKind`] and recorded on the
//! synthesized artifact instead.

use std::path::PathBuf;

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, CourseError>;

/// Errors that can occur outside the generation pipeline.
///
/// Error variants include actionable suggestions where possible to help
/// users resolve issues.
#[derive(Debug, thiserror::Error)]
pub enum CourseError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your coursecraft.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// A generation request was rejected before any work was done.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No chapter with the given name exists in the current outline.
    #[error("Chapter not found: '{name}'\n\nSuggestion: Run 'coursecraft status' to list the chapters of the current course")]
    ChapterNotFound {
        /// The chapter name that was looked up.
        name: String,
    },

    /// An operation needed a course outline but the session has none.
    #[error("No course outline in session\n\nSuggestion: Run 'coursecraft outline' first")]
    NoOutline,

    // ========================================================================
    // Session Persistence Errors
    // ========================================================================
    /// Session file contains malformed JSON that cannot be recovered.
    #[error("Corrupted session file '{path}': {message}\n\nSuggestion: Remove the session file to start fresh")]
    SessionCorrupted {
        /// Path to the corrupted session file.
        path: PathBuf,
        /// Description of the corruption.
        message: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Categories of generation failures, used to decide retry versus fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No usable credential is configured; the remote path is unavailable.
    CredentialMissing,
    /// Timeout, connection failure or retryable HTTP status.
    TransportTransient,
    /// Non-retryable HTTP status or a request the service would reject.
    TransportPermanent,
    /// The service answered but the output could not be turned into a record.
    ExtractionFailure,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CredentialMissing => write!(f, "credential_missing"),
            Self::TransportTransient => write!(f, "transport_transient"),
            Self::TransportPermanent => write!(f, "transport_permanent"),
            Self::ExtractionFailure => write!(f, "extraction_failure"),
        }
    }
}

impl FailureKind {
    /// Returns a suggestion message for this failure kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::CredentialMissing => {
                "Set apiKey in coursecraft.json or export COURSECRAFT_API_KEY"
            }
            Self::TransportTransient => "Check your network connection or retry later",
            Self::TransportPermanent => "Check the API URL, model name and account status",
            Self::ExtractionFailure => "Retry; the model returned output that could not be parsed",
        }
    }

    /// Returns `true` if another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportTransient | Self::ExtractionFailure)
    }
}

impl CourseError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Creates a new `ChapterNotFound` error.
    #[must_use]
    pub fn chapter_not_found(name: impl Into<String>) -> Self {
        Self::ChapterNotFound { name: name.into() }
    }

    /// Creates a new `SessionCorrupted` error.
    #[must_use]
    pub fn session_corrupted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::SessionCorrupted {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error comes from the user's configuration file.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. } | Self::ConfigValidationError { .. }
        )
    }
}
