//! Course export
//!
//! Renders a generated course into files a teacher can hand out, and tallies
//! teacher satisfaction surveys.
//!
//! # Types
//!
//! - [`CoursePackage`] - Outline, resources and lectures gathered for export
//! - [`slides::SlideDeck`] - Slide plan derived from lecture Markdown
//! - [`survey::SurveyStore`] / [`survey::SurveySummary`] - Survey persistence and tallies
//!
//! # Exporters
//!
//! - [`json::JsonExporter`] - Compact or pretty JSON
//! - [`MarkdownExporter`] - Whole-course Markdown document
//!
//! # Example
//!
//! ```rust
//! use coursecraft_engine::{Chapter, CourseOutline, EducationStage, LectureContent, ResourceSet};
//! use coursecraft_export::{CoursePackage, MarkdownExporter};
//!
//! let outline = CourseOutline {
//!     course_name: "Digital Economy".to_string(),
//!     education_stage: EducationStage::High,
//!     objectives: "Understand platforms".to_string(),
//!     total_hours: 4,
//!     chapters: vec![Chapter::new("Platforms", 4, "network effects")],
//! };
//! let package = CoursePackage::new(outline, ResourceSet::default())
//!     .with_lecture(Chapter::new("Platforms", 4, ""), LectureContent::new("# Platforms"));
//!
//! let markdown = MarkdownExporter::new(&package).generate();
//! assert!(markdown.contains("Digital Economy"));
//! ```

pub mod json;
mod markdown;
pub mod slides;
pub mod survey;

pub use markdown::MarkdownExporter;

use coursecraft_engine::{Chapter, CourseOutline, Language, LectureContent, ResourceSet};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Failed to serialize to JSON.
    #[error("failed to serialize export: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write export files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid export data.
    #[error("invalid export data: {0}")]
    InvalidData(String),
}

/// Result type for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;

// ============================================================================
// CoursePackage
// ============================================================================

/// Everything generated for one course, in chapter order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoursePackage {
    /// Course outline.
    pub outline: CourseOutline,

    /// Recommended resources.
    pub resources: ResourceSet,

    /// Generated lectures paired with their chapter.
    pub lectures: Vec<(Chapter, LectureContent)>,

    /// Language used for headings and labels.
    #[serde(skip)]
    pub language: Language,
}

impl CoursePackage {
    /// Creates a package with no lectures.
    #[must_use]
    pub fn new(outline: CourseOutline, resources: ResourceSet) -> Self {
        Self {
            outline,
            resources,
            lectures: Vec::new(),
            language: Language::default(),
        }
    }

    /// Adds a lecture.
    #[must_use]
    pub fn with_lecture(mut self, chapter: Chapter, lecture: LectureContent) -> Self {
        self.lectures.push((chapter, lecture));
        self
    }

    /// Sets the heading language.
    #[must_use]
    pub const fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Checks that the package has something to export.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InvalidData`] if the outline has no chapters or
    /// a lecture is blank.
    pub fn validate(&self) -> Result<()> {
        if self.outline.chapters.is_empty() {
            return Err(ExportError::InvalidData(format!(
                "course '{}' has no chapters",
                self.outline.course_name
            )));
        }
        if let Some((chapter, _)) = self.lectures.iter().find(|(_, l)| l.is_blank()) {
            return Err(ExportError::InvalidData(format!(
                "lecture for chapter '{}' is empty",
                chapter.name
            )));
        }
        Ok(())
    }
}

static UNSAFE_FILE_CHARS: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r#"[\\/*?:"<>|]"#).unwrap()
});

/// File name stem for a chapter, with characters that are unsafe in file
/// names removed.
///
/// Falls back to `"lecture"` if nothing is left.
#[must_use]
pub fn file_stem_for(chapter_name: &str) -> String {
    let stem = UNSAFE_FILE_CHARS.replace_all(chapter_name, "");
    let stem = stem.trim();
    if stem.is_empty() {
        "lecture".to_string()
    } else {
        stem.to_string()
    }
}
