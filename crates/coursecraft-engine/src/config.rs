//! Configuration for the `coursecraft` tools.
//!
//! Settings live in `coursecraft.json` with `camelCase` keys. Every field has
//! a default, so a missing file or a partial file is valid.

use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::client::{is_placeholder_key, TransportSettings};
use crate::error::{CourseError, Result};
use crate::model::Language;
use crate::orchestrator::RetryPolicy;

/// The default config file name.
const CONFIG_FILE_NAME: &str = "coursecraft.json";

fn default_api_url() -> String {
    "https://api.deepseek.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

const fn default_temperature() -> f32 {
    0.7
}

/// Default connection-layer retries after the first attempt.
const fn default_max_retries() -> u32 {
    3
}

const fn default_connect_timeout() -> u64 {
    10
}

const fn default_read_timeout() -> u64 {
    120
}

const fn default_backoff_factor() -> f64 {
    0.5
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_fallback_threshold() -> u32 {
    2
}

const fn default_skip_threshold() -> u32 {
    3
}

const fn default_retry_delay_ms() -> u64 {
    1000
}

/// Default session file path.
fn default_session_file() -> String {
    ".coursecraft/session.json".to_string()
}

/// Default output directory for exports.
fn default_output_dir() -> String {
    ".".to_string()
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Generation service connection.
    #[serde(default)]
    pub api: ApiConfig,

    /// Retry, fallback and output language.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Path of the persisted session.
    #[serde(default = "default_session_file")]
    pub session_file: String,

    /// Directory exports are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            generation: GenerationConfig::default(),
            session_file: default_session_file(),
            output_dir: default_output_dir(),
        }
    }
}

/// Connection settings for the generation service.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    /// Bearer credential. Usually supplied through `COURSECRAFT_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Chat completions endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature in `[0, 2]`.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Connection-layer retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Base of the exponential retry backoff, in seconds.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .field("backoff_factor", &self.backoff_factor)
            .finish()
    }
}

impl ApiConfig {
    /// Returns `true` if a real (non-placeholder) key is configured.
    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !is_placeholder_key(k))
    }

    /// Settings for [`crate::client::HttpTransport`].
    #[must_use]
    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            api_key: self.api_key.clone(),
            api_url: self.api_url.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            max_retries: self.max_retries,
            backoff_factor: self.backoff_factor,
        }
    }
}

/// Orchestrator behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Always synthesize locally.
    #[serde(default)]
    pub prefer_local: bool,

    /// Remote attempts per artifact.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fall back once consecutive failures exceed this.
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: u32,

    /// Skip the service while consecutive failures exceed this.
    #[serde(default = "default_skip_threshold")]
    pub skip_threshold: u32,

    /// Pause between attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Language of generated lectures.
    #[serde(default)]
    pub language: Language,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            prefer_local: false,
            max_attempts: default_max_attempts(),
            fallback_threshold: default_fallback_threshold(),
            skip_threshold: default_skip_threshold(),
            retry_delay_ms: default_retry_delay_ms(),
            language: Language::default(),
        }
    }
}

impl GenerationConfig {
    /// The orchestrator retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            fallback_threshold: self.fallback_threshold,
            skip_threshold: self.skip_threshold,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `coursecraft.json` exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            CourseError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `coursecraft.json` from `dir`, or defaults if it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a file path.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::ConfigParseError` if the file cannot be read or
    /// parsed, and `CourseError::ConfigValidationError` if a value is out of
    /// range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(CourseError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| CourseError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::ConfigValidationError` naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if let Err(e) = Url::parse(&self.api.api_url) {
            return Err(CourseError::config_validation(
                format!("api.apiUrl '{}' is not a valid URL: {e}", self.api.api_url),
                "Use a full URL such as https://api.deepseek.com/v1/chat/completions",
            ));
        }

        if self.api.model.trim().is_empty() {
            return Err(CourseError::config_validation(
                "api.model must not be empty",
                "Set api.model in your coursecraft.json (for example deepseek-chat)",
            ));
        }

        if !(0.0..=2.0).contains(&self.api.temperature) {
            return Err(CourseError::config_validation(
                format!("api.temperature {} is outside [0, 2]", self.api.temperature),
                "Set api.temperature between 0 and 2 in your coursecraft.json",
            ));
        }

        if self.api.connect_timeout_secs == 0 || self.api.read_timeout_secs == 0 {
            return Err(CourseError::config_validation(
                "api.connectTimeoutSecs and api.readTimeoutSecs must be greater than 0",
                "Set both timeouts to at least 1 second in your coursecraft.json",
            ));
        }

        if !self.api.backoff_factor.is_finite() || self.api.backoff_factor < 0.0 {
            return Err(CourseError::config_validation(
                "api.backoffFactor must be a non-negative number",
                "Set api.backoffFactor to 0.5 or another non-negative value",
            ));
        }

        if self.generation.max_attempts == 0 {
            return Err(CourseError::config_validation(
                "generation.maxAttempts must be greater than 0",
                "Set generation.maxAttempts to at least 1 in your coursecraft.json",
            ));
        }

        if self.session_file.trim().is_empty() {
            return Err(CourseError::config_validation(
                "sessionFile must not be empty",
                "Provide a session file path in your coursecraft.json",
            ));
        }

        if self.output_dir.trim().is_empty() {
            return Err(CourseError::config_validation(
                "outputDir must not be empty",
                "Provide a valid output directory path in your coursecraft.json (use '.' for current directory)",
            ));
        }

        Ok(())
    }
}
