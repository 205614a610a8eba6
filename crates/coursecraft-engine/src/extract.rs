//! Recovery of JSON records from free-form model output.
//!
//! Models wrap JSON in prose, code fences or both. [`extract`] tries a fixed
//! sequence of strategies and returns the first strict parse that succeeds;
//! nothing is ever guessed.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Greedy span from the first `{` to the last `}`, or `[` to `]`.
static JSON_SPAN: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?s)(\{.*\}|\[.*\])").unwrap()
});

/// A bare identifier used as a key in front of a nested object.
static BARE_OBJECT_KEY: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(\w+)\s*:\s*\{").unwrap()
});

static TRAILING_COMMA_OBJECT: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r",\s*\}").unwrap()
});

static TRAILING_COMMA_ARRAY: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r",\s*\]").unwrap()
});

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// No JSON value could be recovered from a model response.
///
/// Carries the unmodified response so callers can show it to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not extract valid JSON from model output ({} chars)", .raw_text.chars().count())]
pub struct ExtractionError {
    /// The response text exactly as received.
    pub raw_text: String,
}

/// Extracts the first JSON value found in `text`.
///
/// Strategies, first success wins:
///
/// 1. the greedy `{...}` or `[...]` span;
/// 2. the content between the first "```json" and the following fence;
/// 3. the content between the first two fences;
/// 4. the whole text.
///
/// # Errors
///
/// Returns [`ExtractionError`] with the original text when every strategy
/// fails to parse.
///
/// # Examples
///
/// ```
/// use coursecraft_engine::extract::extract;
///
/// let value = extract("Here you go: {\"a\": 1} hope that helps").unwrap();
/// assert_eq!(value["a"], 1);
/// ```
pub fn extract(text: &str) -> Result<Value, ExtractionError> {
    if let Some(m) = JSON_SPAN.find(text) {
        if let Some(value) = parse_strict(m.as_str()) {
            return Ok(value);
        }
    }

    if let Some((_, after)) = text.split_once(JSON_FENCE) {
        let body = after.split(FENCE).next().unwrap_or_default();
        if let Some(value) = parse_strict(body) {
            return Ok(value);
        }
    }

    if let Some(body) = text.split(FENCE).nth(1) {
        if let Some(value) = parse_strict(body) {
            return Ok(value);
        }
    }

    parse_strict(text).ok_or_else(|| ExtractionError {
        raw_text: text.to_string(),
    })
}

/// Like [`extract`], but retries once on [`repair`]ed text.
///
/// The repaired text is only consulted when the raw text fails, and the
/// error still carries the raw text.
///
/// # Errors
///
/// Returns [`ExtractionError`] when neither the raw nor the repaired text
/// yields a value.
pub fn extract_lenient(text: &str) -> Result<Value, ExtractionError> {
    extract(text).or_else(|err| {
        let repaired = repair(text);
        if repaired == text {
            return Err(err);
        }
        tracing::debug!("Raw extraction failed, retrying on repaired text");
        extract(&repaired).map_err(|_| err)
    })
}

/// Fixes common formatting mistakes in model-written JSON.
///
/// Unescapes `\"`, flattens literal `\n` and `\t` sequences to spaces,
/// quotes bare keys in front of nested objects and drops trailing commas.
#[must_use]
pub fn repair(text: &str) -> String {
    let cleaned = text
        .replace("\\\"", "\"")
        .replace("\\n", " ")
        .replace("\\t", " ");
    let cleaned = BARE_OBJECT_KEY.replace_all(&cleaned, "\"$1\": {");
    let cleaned = TRAILING_COMMA_OBJECT.replace_all(&cleaned, "}");
    TRAILING_COMMA_ARRAY.replace_all(&cleaned, "]").into_owned()
}

fn parse_strict(candidate: &str) -> Option<Value> {
    serde_json::from_str(candidate.trim()).ok()
}
