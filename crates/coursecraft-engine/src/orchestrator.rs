//! Generation orchestrator.
//!
//! For every artifact the orchestrator decides between the remote service
//! and the offline synthesizers, recovers structured records from model
//! output, and retries or falls back according to a [`RetryPolicy`] and the
//! caller's [`ApiHealth`]. No operation returns an error: the worst outcome
//! is a synthesized artifact that records why the remote path was abandoned.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::{Transport, TransportError};
use crate::error::{CourseError, FailureKind};
use crate::extract::{extract_lenient, ExtractionError};
use crate::health::ApiHealth;
use crate::model::{
    Chapter, ConversationTurn, CourseOutline, EducationStage, Language, LectureContent,
    ResourceCategory, ResourceItem, ResourceSet,
};
use crate::prompt;
use crate::synth;

// ============================================================================
// Requests
// ============================================================================

/// Inputs for generating a course outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineRequest {
    /// Course name.
    pub course_name: String,
    /// Teaching objectives.
    pub objectives: String,
    /// Total hour budget.
    pub total_hours: u32,
    /// Target stage.
    pub stage: EducationStage,
    /// Policy requirements to honour, empty for none.
    #[serde(default)]
    pub policy_text: String,
}

impl OutlineRequest {
    /// Checks the request before any generation work is started.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.course_name.trim().is_empty() {
            return Err(CourseError::invalid_request("course name must not be empty"));
        }
        if self.total_hours == 0 {
            return Err(CourseError::invalid_request(
                "total hours must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Inputs for generating one chapter's lecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LectureRequest {
    /// Chapter name.
    pub chapter_name: String,
    /// Key points to cover.
    pub key_points: String,
    /// Teaching hours.
    pub hours: u32,
    /// Target stage.
    pub stage: EducationStage,
    /// Output language.
    pub language: Language,
    /// Policy requirements to honour, empty for none.
    pub policy_text: String,
}

impl LectureRequest {
    /// Builds a request for an outline chapter.
    #[must_use]
    pub fn for_chapter(
        chapter: &Chapter,
        stage: EducationStage,
        language: Language,
        policy_text: impl Into<String>,
    ) -> Self {
        Self {
            chapter_name: chapter.name.clone(),
            key_points: chapter.key_points.clone(),
            hours: chapter.hours,
            stage,
            language,
            policy_text: policy_text.into(),
        }
    }
}

/// Inputs for revising an existing lecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    /// Lecture being revised.
    pub current: LectureContent,
    /// The user's revision request.
    pub request: String,
    /// Target stage.
    pub stage: EducationStage,
    /// Output language.
    pub language: Language,
    /// Policy requirements to honour, empty for none.
    pub policy_text: String,
}

// ============================================================================
// Outcomes
// ============================================================================

/// Why a remote attempt did not produce the artifact.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationFailure {
    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// No JSON could be recovered from the reply.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// JSON was recovered but does not have the expected shape.
    #[error("unexpected response shape: {0}")]
    Shape(String),
}

impl GenerationFailure {
    /// Classifies this failure for retry and fallback decisions.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport(err) => err.kind(),
            Self::Extraction(_) | Self::Shape(_) => FailureKind::ExtractionFailure,
        }
    }

    /// Raw model output, when the failure was an extraction failure.
    #[must_use]
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            Self::Extraction(err) => Some(&err.raw_text),
            _ => None,
        }
    }
}

/// Why an artifact was synthesized locally.
#[derive(Debug, Clone)]
pub enum FallbackReason {
    /// The caller asked for local synthesis.
    PreferLocal,
    /// Too many consecutive failures; the service was not called.
    HealthTripped {
        /// Failure count at call start.
        consecutive_errors: u32,
    },
    /// Remote attempts were made and failed.
    Failed(GenerationFailure),
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreferLocal => write!(f, "local generation requested"),
            Self::HealthTripped { consecutive_errors } => write!(
                f,
                "generation service skipped after {consecutive_errors} consecutive failures"
            ),
            Self::Failed(failure) => write!(f, "{} ({})", failure, failure.kind()),
        }
    }
}

/// Where an artifact came from.
#[derive(Debug, Clone)]
pub enum ArtifactSource {
    /// Produced by the generation service.
    Remote,
    /// Produced by the offline synthesizers.
    Synthesized {
        /// Why the remote path was not used.
        reason: FallbackReason,
    },
}

/// A generated artifact and its provenance.
#[derive(Debug, Clone)]
pub struct Generated<A> {
    /// The artifact.
    pub artifact: A,
    /// Where it came from.
    pub source: ArtifactSource,
}

impl<A> Generated<A> {
    const fn remote(artifact: A) -> Self {
        Self {
            artifact,
            source: ArtifactSource::Remote,
        }
    }

    const fn synthesized(artifact: A, reason: FallbackReason) -> Self {
        Self {
            artifact,
            source: ArtifactSource::Synthesized { reason },
        }
    }

    /// Returns `true` if the generation service produced the artifact.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self.source, ArtifactSource::Remote)
    }

    /// The fallback reason, if the artifact was synthesized.
    #[must_use]
    pub const fn fallback_reason(&self) -> Option<&FallbackReason> {
        match &self.source {
            ArtifactSource::Remote => None,
            ArtifactSource::Synthesized { reason } => Some(reason),
        }
    }

    /// The last remote failure, if remote attempts failed.
    #[must_use]
    pub const fn failure(&self) -> Option<&GenerationFailure> {
        match self.fallback_reason() {
            Some(FallbackReason::Failed(failure)) => Some(failure),
            _ => None,
        }
    }

    /// Raw model output that could not be parsed, for display as a soft error.
    #[must_use]
    pub fn unparsed_output(&self) -> Option<&str> {
        self.failure().and_then(GenerationFailure::raw_text)
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Bounds on remote attempts for one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Remote attempts per artifact before falling back.
    pub max_attempts: u32,
    /// Fall back once the failure count exceeds this.
    pub fallback_threshold: u32,
    /// Skip the service entirely while the failure count exceeds this.
    pub skip_threshold: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            fallback_threshold: 2,
            skip_threshold: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Produces course artifacts from the generation service, falling back to
/// local synthesis.
#[derive(Debug, Clone)]
pub struct Orchestrator<T> {
    transport: T,
    policy: RetryPolicy,
    model: String,
    temperature: f32,
    prefer_local: bool,
}

impl<T: Transport> Orchestrator<T> {
    /// Creates an orchestrator with the default policy and model.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            policy: RetryPolicy::default(),
            model: "deepseek-chat".to_string(),
            temperature: 0.7,
            prefer_local: false,
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the model identifier sent to the service.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Always synthesize locally when `prefer_local` is set.
    #[must_use]
    pub const fn with_prefer_local(mut self, prefer_local: bool) -> Self {
        self.prefer_local = prefer_local;
        self
    }

    /// The underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// The active retry policy.
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Generates a course outline.
    ///
    /// Remote outlines are returned as the service allocated them; only
    /// synthesized outlines are rescaled to the requested hours.
    pub async fn get_outline(
        &self,
        health: &mut ApiHealth,
        request: &OutlineRequest,
    ) -> Generated<CourseOutline> {
        let prompt = prompt::outline_prompt(request);
        match self
            .attempt_remote(health, "outline", &prompt, |text| parse_outline(text, request))
            .await
        {
            Ok(outline) => Generated::remote(outline),
            Err(reason) => {
                log_fallback("outline", &reason);
                let outline = synth::synthesize_outline(
                    &request.course_name,
                    &request.objectives,
                    request.total_hours,
                    request.stage,
                    &request.policy_text,
                );
                Generated::synthesized(outline, reason)
            }
        }
    }

    /// Generates the lecture for one chapter.
    pub async fn get_lecture(
        &self,
        health: &mut ApiHealth,
        request: &LectureRequest,
    ) -> Generated<LectureContent> {
        let prompt = prompt::lecture_prompt(request);
        match self.attempt_remote(health, "lecture", &prompt, parse_lecture).await {
            Ok(lecture) => Generated::remote(lecture),
            Err(reason) => {
                log_fallback("lecture", &reason);
                let lecture = synth::synthesize_lecture(
                    &request.chapter_name,
                    &request.key_points,
                    request.hours,
                    request.stage,
                    request.language,
                    &request.policy_text,
                );
                Generated::synthesized(lecture, reason)
            }
        }
    }

    /// Recommends teaching resources for a course.
    ///
    /// Every category of the result is present; categories the service
    /// omitted are back-filled from the synthesizer for the same course.
    pub async fn get_resources(
        &self,
        health: &mut ApiHealth,
        course_name: &str,
        stage: EducationStage,
    ) -> Generated<ResourceSet> {
        let prompt = prompt::resources_prompt(course_name, stage);
        let parse = |text: String| {
            let raw = extract_lenient(&text)?;
            normalize_resources(&raw, &synth::synthesize_resources(course_name, stage))
        };
        match self.attempt_remote(health, "resources", &prompt, parse).await {
            Ok(resources) => Generated::remote(resources),
            Err(reason) => {
                log_fallback("resources", &reason);
                Generated::synthesized(synth::synthesize_resources(course_name, stage), reason)
            }
        }
    }

    /// Revises a lecture and records the exchange in `history`.
    ///
    /// The user turn is appended before generation and exactly one assistant
    /// turn afterwards, describing whether the service or the offline path
    /// produced the revision.
    pub async fn update_lecture(
        &self,
        health: &mut ApiHealth,
        request: &UpdateRequest,
        history: &mut Vec<ConversationTurn>,
    ) -> Generated<LectureContent> {
        history.push(ConversationTurn::user(&request.request));
        let prompt = prompt::update_prompt(request, history);

        let generated = match self
            .attempt_remote(health, "lecture update", &prompt, parse_lecture)
            .await
        {
            Ok(lecture) => Generated::remote(lecture),
            Err(reason) => {
                log_fallback("lecture update", &reason);
                let lecture =
                    synth::synthesize_update(&request.current, &request.request, request.language);
                Generated::synthesized(lecture, reason)
            }
        };

        let reply = match generated.fallback_reason() {
            None | Some(FallbackReason::PreferLocal) => acknowledgment(request.language),
            Some(FallbackReason::Failed(failure)) => {
                failure_notice(request.language, &failure.to_string())
            }
            Some(FallbackReason::HealthTripped { .. }) => failure_notice(
                request.language,
                health.last_error.as_deref().unwrap_or("service unavailable"),
            ),
        };
        history.push(ConversationTurn::assistant(reply));

        generated
    }

    /// Runs the remote path for one artifact.
    ///
    /// Returns the parsed artifact, or the reason the caller should
    /// synthesize instead.
    async fn attempt_remote<A, F>(
        &self,
        health: &mut ApiHealth,
        artifact: &'static str,
        prompt: &str,
        parse: F,
    ) -> Result<A, FallbackReason>
    where
        F: Fn(String) -> Result<A, GenerationFailure>,
    {
        if self.prefer_local {
            return Err(FallbackReason::PreferLocal);
        }
        if health.should_skip_remote(self.policy.skip_threshold) {
            return Err(FallbackReason::HealthTripped {
                consecutive_errors: health.consecutive_error_count,
            });
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(artifact, attempt, "Requesting remote generation");

            let outcome = match self
                .transport
                .send(prompt, &self.model, self.temperature)
                .await
            {
                Ok(text) => {
                    health.record_success();
                    parse(text)
                }
                Err(err) => Err(GenerationFailure::Transport(err)),
            };

            let failure = match outcome {
                Ok(value) => {
                    tracing::info!(artifact, attempt, "Remote generation succeeded");
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            health.record_failure(failure.to_string());
            let kind = failure.kind();
            tracing::warn!(
                artifact,
                attempt,
                %kind,
                consecutive_errors = health.consecutive_error_count,
                error = %failure,
                "Remote generation attempt failed"
            );

            if !kind.is_retryable()
                || health.consecutive_error_count > self.policy.fallback_threshold
                || attempt >= self.policy.max_attempts
            {
                return Err(FallbackReason::Failed(failure));
            }

            tokio::time::sleep(self.policy.retry_delay).await;
        }
    }
}

fn log_fallback(artifact: &str, reason: &FallbackReason) {
    tracing::info!(artifact, %reason, "Using synthesized content");
}

fn acknowledgment(language: Language) -> String {
    match language {
        Language::Chinese => "已根据您的要求更新讲义内容。".to_string(),
        Language::English => "The lecture has been updated as requested.".to_string(),
    }
}

fn failure_notice(language: Language, error: &str) -> String {
    match language {
        Language::Chinese => {
            format!("生成服务暂时不可用（{error}），已使用离线方式更新讲义。")
        }
        Language::English => format!(
            "The generation service was unavailable ({error}); the lecture was revised offline."
        ),
    }
}

// ============================================================================
// Parsing and normalization
// ============================================================================

fn parse_outline(text: String, request: &OutlineRequest) -> Result<CourseOutline, GenerationFailure> {
    let mut value = extract_lenient(&text)?;
    let Value::Object(map) = &mut value else {
        return Err(GenerationFailure::Shape("outline is not a JSON object".to_string()));
    };
    // The requested stage is authoritative; models paraphrase it freely.
    map.remove("教育阶段");
    map.remove("education_stage");

    let mut outline: CourseOutline = serde_json::from_value(value)
        .map_err(|e| GenerationFailure::Shape(format!("outline: {e}")))?;

    if outline.chapters.is_empty() {
        return Err(GenerationFailure::Shape("outline has no chapters".to_string()));
    }
    if outline.chapters.iter().any(|c| c.name.trim().is_empty()) {
        return Err(GenerationFailure::Shape("outline has an unnamed chapter".to_string()));
    }

    outline.education_stage = request.stage;
    if outline.course_name.trim().is_empty() {
        outline.course_name.clone_from(&request.course_name);
    }
    if outline.objectives.trim().is_empty() {
        outline.objectives.clone_from(&request.objectives);
    }
    if outline.total_hours == 0 {
        outline.total_hours = request.total_hours;
    }
    for chapter in &mut outline.chapters {
        chapter.hours = chapter.hours.max(1);
    }

    if outline.hours_allocated() != request.total_hours {
        tracing::warn!(
            requested = request.total_hours,
            allocated = outline.hours_allocated(),
            "Remote outline hours do not match the requested total"
        );
    }

    Ok(outline)
}

#[allow(clippy::needless_pass_by_value)]
fn parse_lecture(text: String) -> Result<LectureContent, GenerationFailure> {
    let body = unwrap_markdown_fence(text.trim());
    if body.is_empty() {
        return Err(GenerationFailure::Shape("lecture is empty".to_string()));
    }
    Ok(LectureContent::new(body))
}

/// Strips a single code fence wrapping the whole reply.
fn unwrap_markdown_fence(text: &str) -> &str {
    if !(text.starts_with("```") && text.ends_with("```") && text.len() > 6) {
        return text;
    }
    let inner = &text[3..text.len() - 3];
    inner
        .split_once('\n')
        .map_or(inner, |(info, rest)| {
            if info.trim().chars().all(char::is_alphanumeric) {
                rest
            } else {
                inner
            }
        })
        .trim()
}

/// Shape of one resource category in a raw service response.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCategory {
    /// Absent or null.
    Missing,
    /// A list of items.
    Sequence(Vec<Value>),
    /// A single labelled item instead of a list.
    SingleItem(Map<String, Value>),
    /// A string, possibly holding encoded JSON.
    EncodedString(String),
    /// A number or boolean.
    Scalar(Value),
}

impl RawCategory {
    /// Classifies the value found for a category.
    #[must_use]
    pub fn classify(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Missing,
            Some(Value::Array(items)) => Self::Sequence(items.clone()),
            Some(Value::Object(map)) => Self::SingleItem(map.clone()),
            Some(Value::String(s)) => Self::EncodedString(s.clone()),
            Some(other) => Self::Scalar(other.clone()),
        }
    }

    /// Coerces the value into a list of items; `None` when missing.
    #[must_use]
    pub fn into_items(self) -> Option<Vec<ResourceItem>> {
        match self {
            Self::Missing => None,
            Self::Sequence(items) => Some(items.into_iter().map(ResourceItem::from_value).collect()),
            Self::SingleItem(map) => Some(vec![ResourceItem::Fields(map)]),
            Self::EncodedString(s) => Some(match serde_json::from_str::<Value>(&s) {
                Ok(Value::Array(items)) => items.into_iter().map(ResourceItem::from_value).collect(),
                Ok(parsed) => vec![ResourceItem::from_value(parsed)],
                Err(_) => vec![ResourceItem::Text(s)],
            }),
            Self::Scalar(value) => Some(vec![ResourceItem::Text(value.to_string())]),
        }
    }
}

/// Coerces a raw resource response into a complete [`ResourceSet`].
///
/// Each category is looked up by its Chinese or English key and coerced into
/// a list. Missing categories are taken from `fallback`.
///
/// # Errors
///
/// Returns [`GenerationFailure::Shape`] if `raw` is not a JSON object.
pub fn normalize_resources(raw: &Value, fallback: &ResourceSet) -> Result<ResourceSet, GenerationFailure> {
    let Value::Object(map) = raw else {
        return Err(GenerationFailure::Shape("resources are not a JSON object".to_string()));
    };

    let mut set = ResourceSet::default();
    for category in ResourceCategory::ALL {
        let value = map.get(category.key_zh()).or_else(|| map.get(category.key()));
        let items = RawCategory::classify(value).into_items().unwrap_or_else(|| {
            tracing::debug!(%category, "Back-filling missing resource category");
            let backup = fallback.get(category);
            if backup.is_empty() {
                vec![ResourceItem::Text(format!("暂无{}信息", category.key_zh()))]
            } else {
                backup.to_vec()
            }
        });
        set.set(category, items);
    }
    Ok(set)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays scripted replies and counts calls.
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<String, TransportError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<String, TransportError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transport for ScriptedTransport {
        async fn send(&self, _prompt: &str, _model: &str, _temperature: f32) -> Result<String, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Unknown("script exhausted".to_string())))
        }
    }

    fn orchestrator(replies: Vec<Result<String, TransportError>>) -> Orchestrator<ScriptedTransport> {
        Orchestrator::new(ScriptedTransport::new(replies)).with_policy(RetryPolicy {
            retry_delay: Duration::ZERO,
            ..RetryPolicy::default()
        })
    }

    fn timeout() -> Result<String, TransportError> {
        Err(TransportError::Timeout {
            phase: crate::client::TimeoutPhase::Read,
            budget: Duration::from_secs(120),
        })
    }

    fn outline_request() -> OutlineRequest {
        OutlineRequest {
            course_name: "Intro to Economics".to_string(),
            objectives: "understand basics".to_string(),
            total_hours: 32,
            stage: EducationStage::Middle,
            policy_text: String::new(),
        }
    }

    fn lecture_request() -> LectureRequest {
        LectureRequest {
            chapter_name: "Markets".to_string(),
            key_points: "supply, demand".to_string(),
            hours: 4,
            stage: EducationStage::High,
            language: Language::English,
            policy_text: String::new(),
        }
    }

    const OUTLINE_REPLY: &str = r#"Here is the outline:
```json
{"课程名称": "Intro to Economics", "教育阶段": "初中阶段", "教学目标": "basics", "总学时": 32,
 "章节列表": [{"章节名称": "Markets", "学时": 10, "重点内容": "supply, demand"},
              {"章节名称": "Money", "学时": 12, "重点内容": "banks"}]}
```"#;

    #[tokio::test]
    async fn test_prefer_local_skips_transport() {
        let orch = orchestrator(vec![]).with_prefer_local(true);
        let mut health = ApiHealth::new();
        let generated = orch.get_outline(&mut health, &outline_request()).await;
        assert_eq!(orch.transport().calls(), 0);
        assert!(matches!(generated.fallback_reason(), Some(FallbackReason::PreferLocal)));
        assert_eq!(generated.artifact.hours_allocated(), 32);
    }

    #[tokio::test]
    async fn test_unhealthy_service_is_skipped() {
        let orch = orchestrator(vec![Ok("# Lecture".to_string())]);
        let mut health = ApiHealth::new();
        for _ in 0..4 {
            health.record_failure("timeout");
        }
        let outline = orch.get_outline(&mut health, &outline_request()).await;
        let lecture = orch.get_lecture(&mut health, &lecture_request()).await;
        let resources = orch
            .get_resources(&mut health, "Intro to Economics", EducationStage::Middle)
            .await;
        assert_eq!(orch.transport().calls(), 0);
        assert!(matches!(
            outline.fallback_reason(),
            Some(FallbackReason::HealthTripped { consecutive_errors: 4 })
        ));
        assert_eq!(outline.artifact.total_hours, 32);
        assert!(matches!(
            lecture.fallback_reason(),
            Some(FallbackReason::HealthTripped { consecutive_errors: 4 })
        ));
        assert!(matches!(
            resources.fallback_reason(),
            Some(FallbackReason::HealthTripped { consecutive_errors: 4 })
        ));
        assert_eq!(health.consecutive_error_count, 4);
    }

    #[test]
    fn test_outline_request_validation() {
        assert!(outline_request().validate().is_ok());

        let zero_hours = OutlineRequest {
            total_hours: 0,
            ..outline_request()
        };
        let err = zero_hours.validate().unwrap_err();
        assert!(matches!(err, CourseError::InvalidRequest(_)));
        assert!(err.to_string().contains("total hours"));

        let blank_name = OutlineRequest {
            course_name: "  ".to_string(),
            ..outline_request()
        };
        assert!(matches!(
            blank_name.validate(),
            Err(CourseError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_skip_threshold_allows_call_at_three() {
        let orch = orchestrator(vec![Ok("# Lecture\n\nBody".to_string())]);
        let mut health = ApiHealth::new();
        for _ in 0..3 {
            health.record_failure("timeout");
        }
        let lecture = orch.get_lecture(&mut health, &lecture_request()).await;
        assert_eq!(orch.transport().calls(), 1);
        assert!(lecture.is_remote());
        assert_eq!(health.consecutive_error_count, 0);
    }

    #[tokio::test]
    async fn test_remote_outline_success_resets_health() {
        let orch = orchestrator(vec![Ok(OUTLINE_REPLY.to_string())]);
        let mut health = ApiHealth::new();
        health.record_failure("old");
        let generated = orch.get_outline(&mut health, &outline_request()).await;
        assert!(generated.is_remote());
        assert_eq!(health.consecutive_error_count, 0);
        assert!(health.last_success_time.is_some());

        let outline = generated.artifact;
        assert_eq!(outline.education_stage, EducationStage::Middle);
        assert_eq!(outline.chapters.len(), 2);
        // Not rescaled to the requested 32 hours.
        assert_eq!(outline.hours_allocated(), 22);
        assert_eq!(outline.total_hours, 32);
    }

    #[tokio::test]
    async fn test_transient_failures_fall_back_after_three_attempts() {
        let orch = orchestrator(vec![timeout(), timeout(), timeout(), Ok("# never".to_string())]);
        let mut health = ApiHealth::new();
        let generated = orch.get_lecture(&mut health, &lecture_request()).await;
        assert_eq!(orch.transport().calls(), 3);
        assert_eq!(health.consecutive_error_count, 3);
        assert!(matches!(
            generated.failure(),
            Some(GenerationFailure::Transport(TransportError::Timeout { .. }))
        ));
        assert!(generated.artifact.as_str().starts_with("# Markets (High School Version)"));
    }

    #[tokio::test]
    async fn test_existing_failures_shorten_retries() {
        let orch = orchestrator(vec![timeout(), Ok("# ok".to_string())]);
        let mut health = ApiHealth::new();
        health.record_failure("a");
        health.record_failure("b");
        let generated = orch.get_lecture(&mut health, &lecture_request()).await;
        assert_eq!(orch.transport().calls(), 1);
        assert!(!generated.is_remote());
        assert_eq!(health.consecutive_error_count, 3);
    }

    #[tokio::test]
    async fn test_recovers_after_one_failure() {
        let orch = orchestrator(vec![timeout(), Ok("# Markets\n\nRemote text".to_string())]);
        let mut health = ApiHealth::new();
        let generated = orch.get_lecture(&mut health, &lecture_request()).await;
        assert_eq!(orch.transport().calls(), 2);
        assert!(generated.is_remote());
        assert_eq!(generated.artifact.as_str(), "# Markets\n\nRemote text");
        assert_eq!(health.consecutive_error_count, 0);
    }

    #[tokio::test]
    async fn test_missing_credential_falls_back_immediately() {
        let orch = orchestrator(vec![Err(TransportError::Unauthorized)]);
        let mut health = ApiHealth::new();
        let generated = orch.get_outline(&mut health, &outline_request()).await;
        assert_eq!(orch.transport().calls(), 1);
        assert_eq!(health.consecutive_error_count, 1);
        assert_eq!(
            generated.failure().map(GenerationFailure::kind),
            Some(FailureKind::CredentialMissing)
        );
    }

    #[tokio::test]
    async fn test_permanent_status_falls_back_immediately() {
        let orch = orchestrator(vec![Err(TransportError::HttpError {
            status: 404,
            body: "no such model".to_string(),
        })]);
        let mut health = ApiHealth::new();
        let generated = orch.get_lecture(&mut health, &lecture_request()).await;
        assert_eq!(orch.transport().calls(), 1);
        assert!(!generated.is_remote());
    }

    #[tokio::test]
    async fn test_unparseable_outline_keeps_raw_text() {
        let garbage = "I cannot produce JSON today.";
        let orch = orchestrator(vec![
            Ok(garbage.to_string()),
            Ok(garbage.to_string()),
            Ok(garbage.to_string()),
        ]);
        let mut health = ApiHealth::new();
        let generated = orch.get_outline(&mut health, &outline_request()).await;
        assert_eq!(orch.transport().calls(), 3);
        assert_eq!(generated.unparsed_output(), Some(garbage));
        assert_eq!(generated.artifact.chapters.len(), 5);
        // Each success resets the count before the extraction failure is recorded.
        assert_eq!(health.consecutive_error_count, 1);
    }

    #[tokio::test]
    async fn test_outline_without_chapters_is_shape_failure() {
        let orch = orchestrator(vec![Ok(r#"{"课程名称": "x", "章节列表": []}"#.to_string())])
            .with_policy(RetryPolicy {
                max_attempts: 1,
                retry_delay: Duration::ZERO,
                ..RetryPolicy::default()
            });
        let mut health = ApiHealth::new();
        let generated = orch.get_outline(&mut health, &outline_request()).await;
        assert!(matches!(generated.failure(), Some(GenerationFailure::Shape(_))));
    }

    #[test]
    fn test_normalize_resources_backfills_and_coerces() {
        let raw = json!({
            "教材": "not json",
            "在线视频": [{"视频标题": "Intro", "链接": "https://example.com/v"}]
        });
        let fallback = synth::synthesize_resources("Intro to Economics", EducationStage::Middle);
        let set = normalize_resources(&raw, &fallback).unwrap();

        assert_eq!(set.textbooks, vec![ResourceItem::Text("not json".to_string())]);
        assert_eq!(set.videos.len(), 1);
        assert_eq!(set.videos[0].title().as_deref(), Some("Intro"));
        assert_eq!(set.tools, fallback.tools);
        assert_eq!(set.case_studies, fallback.case_studies);
    }

    #[test]
    fn test_normalize_resources_shapes() {
        let raw = json!({
            "textbooks": {"title": "Single"},
            "videos": "[\"a\", \"b\"]",
            "tools": 7,
            "case_studies": "{\"案例名称\": \"Encoded\"}"
        });
        let set = normalize_resources(&raw, &ResourceSet::default()).unwrap();
        assert_eq!(set.textbooks[0].title().as_deref(), Some("Single"));
        assert_eq!(
            set.videos,
            vec![ResourceItem::Text("a".to_string()), ResourceItem::Text("b".to_string())]
        );
        assert_eq!(set.tools, vec![ResourceItem::Text("7".to_string())]);
        assert_eq!(set.case_studies[0].title().as_deref(), Some("Encoded"));
    }

    #[test]
    fn test_normalize_resources_placeholder_when_fallback_empty() {
        let set = normalize_resources(&json!({}), &ResourceSet::default()).unwrap();
        assert_eq!(set.tools, vec![ResourceItem::Text("暂无工具/软件信息".to_string())]);
    }

    #[test]
    fn test_normalize_resources_rejects_non_object() {
        let err = normalize_resources(&json!(["a"]), &ResourceSet::default()).unwrap_err();
        assert!(matches!(err, GenerationFailure::Shape(_)));
    }

    #[test]
    fn test_raw_category_classification() {
        assert_eq!(RawCategory::classify(None), RawCategory::Missing);
        assert_eq!(RawCategory::classify(Some(&Value::Null)), RawCategory::Missing);
        assert!(matches!(RawCategory::classify(Some(&json!(true))), RawCategory::Scalar(_)));
        assert!(matches!(RawCategory::classify(Some(&json!([]))), RawCategory::Sequence(_)));
    }

    #[tokio::test]
    async fn test_remote_resources_are_normalized() {
        let reply = r#"{"教材": [{"书名": "Economics"}], "在线视频": "not json"}"#;
        let orch = orchestrator(vec![Ok(reply.to_string())]);
        let mut health = ApiHealth::new();
        let generated = orch
            .get_resources(&mut health, "Intro to Economics", EducationStage::Middle)
            .await;
        assert!(generated.is_remote());
        for category in ResourceCategory::ALL {
            assert!(!generated.artifact.get(category).is_empty());
        }
    }

    #[tokio::test]
    async fn test_update_lecture_records_conversation() {
        let orch = orchestrator(vec![Ok("```markdown\n# Revised\n```".to_string())]);
        let mut health = ApiHealth::new();
        let mut history = Vec::new();
        let request = UpdateRequest {
            current: LectureContent::new("# Original"),
            request: "add an example".to_string(),
            stage: EducationStage::Primary,
            language: Language::English,
            policy_text: String::new(),
        };
        let generated = orch.update_lecture(&mut health, &request, &mut history).await;
        assert!(generated.is_remote());
        assert_eq!(generated.artifact.as_str(), "# Revised");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ConversationTurn::user("add an example"));
        assert_eq!(history[1].role, crate::model::Role::Assistant);
    }

    #[tokio::test]
    async fn test_update_lecture_failure_names_error() {
        let orch = orchestrator(vec![Err(TransportError::HttpError {
            status: 401,
            body: "bad key".to_string(),
        })]);
        let mut health = ApiHealth::new();
        let mut history = vec![ConversationTurn::user("earlier"), ConversationTurn::assistant("ok")];
        let request = UpdateRequest {
            current: LectureContent::new("# Original"),
            request: "shorter".to_string(),
            stage: EducationStage::Primary,
            language: Language::English,
            policy_text: String::new(),
        };
        let generated = orch.update_lecture(&mut health, &request, &mut history).await;
        assert!(!generated.is_remote());
        assert!(generated.artifact.as_str().starts_with("# Original"));
        assert!(generated.artifact.as_str().contains("shorter"));
        assert_eq!(history.len(), 4);
        assert!(history[3].message.contains("HTTP 401"));
    }

    #[test]
    fn test_unwrap_markdown_fence() {
        assert_eq!(unwrap_markdown_fence("```markdown\n# T\n```"), "# T");
        assert_eq!(unwrap_markdown_fence("# T"), "# T");
        assert_eq!(unwrap_markdown_fence("```\n# T\n```"), "# T");
    }

    #[test]
    fn test_fallback_reason_display() {
        let reason = FallbackReason::Failed(GenerationFailure::Shape("x".to_string()));
        assert_eq!(reason.to_string(), "unexpected response shape: x (extraction_failure)");
        let tripped = FallbackReason::HealthTripped { consecutive_errors: 5 };
        assert!(tripped.to_string().contains("5 consecutive failures"));
    }
}
