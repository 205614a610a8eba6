//! Course generation engine
//!
//! Generates course outlines, lectures and teaching resources through a
//! remote text-generation service, recovering JSON from free-form replies
//! and falling back to deterministic offline content when the service fails.

pub mod client;
pub mod config;
pub mod diff;
pub mod error;
pub mod extract;
pub mod health;
pub mod model;
pub mod orchestrator;
pub mod policy;
pub mod prompt;
pub mod session;
pub mod synth;

pub use client::{
    ConnectionDiagnostics, HttpTransport, TimeoutPhase, Transport, TransportError,
    TransportSettings,
};
pub use config::{ApiConfig, Config, GenerationConfig};
pub use diff::{mark_changes, MarkedLine};
pub use error::{CourseError, FailureKind, Result};
pub use extract::{extract, extract_lenient, ExtractionError};
pub use health::ApiHealth;
pub use model::{
    Chapter, ChapterKey, ConversationTurn, CourseOutline, EducationStage, Language,
    LectureContent, ResourceCategory, ResourceItem, ResourceSet, Role,
};
pub use orchestrator::{
    normalize_resources, ArtifactSource, FallbackReason, Generated, GenerationFailure,
    LectureRequest, Orchestrator, OutlineRequest, RawCategory, RetryPolicy, UpdateRequest,
};
pub use session::{CourseSession, SESSION_VERSION};
