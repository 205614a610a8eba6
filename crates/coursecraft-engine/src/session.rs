//! Per-course working session.
//!
//! A session holds everything generated for one course so the CLI can work
//! across invocations: the outline request, outline, resources, lectures by
//! chapter key, and each chapter's refinement conversation. API health is
//! kept for the life of the process only.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CourseError, Result};
use crate::health::ApiHealth;
use crate::model::{Chapter, ChapterKey, ConversationTurn, CourseOutline, LectureContent, ResourceSet};
use crate::orchestrator::OutlineRequest;

/// Session file format version.
pub const SESSION_VERSION: u32 = 1;

/// Generated content and conversations for one course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseSession {
    /// File format version.
    pub version: u32,

    /// Inputs the outline was generated from.
    pub request: OutlineRequest,

    /// Current outline, if generated.
    #[serde(default)]
    pub outline: Option<CourseOutline>,

    /// Recommended resources, if generated.
    #[serde(default)]
    pub resources: Option<ResourceSet>,

    /// Lectures keyed by chapter key. Chapters with colliding keys share an entry.
    #[serde(default)]
    pub lectures: BTreeMap<ChapterKey, LectureContent>,

    /// Refinement conversations keyed by chapter key.
    #[serde(default)]
    pub histories: BTreeMap<ChapterKey, Vec<ConversationTurn>>,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// When the session was last modified.
    pub updated_at: DateTime<Utc>,

    /// Remote call health for this process.
    #[serde(skip)]
    pub health: ApiHealth,
}

impl CourseSession {
    /// Starts an empty session for a course request.
    #[must_use]
    pub fn new(request: OutlineRequest) -> Self {
        let now = Utc::now();
        Self {
            version: SESSION_VERSION,
            request,
            outline: None,
            resources: None,
            lectures: BTreeMap::new(),
            histories: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            health: ApiHealth::new(),
        }
    }

    /// Updates the modification time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Looks up a chapter of the current outline by name.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::NoOutline` if no outline has been generated and
    /// `CourseError::ChapterNotFound` if no chapter has that name.
    pub fn chapter(&self, name: &str) -> Result<&Chapter> {
        self.outline
            .as_ref()
            .ok_or(CourseError::NoOutline)?
            .chapter(name)
            .ok_or_else(|| CourseError::chapter_not_found(name))
    }

    /// The lecture stored for a chapter.
    #[must_use]
    pub fn lecture(&self, chapter: &Chapter) -> Option<&LectureContent> {
        self.lectures.get(&chapter.key())
    }

    /// Stores a lecture, replacing any previous one for the same key.
    pub fn set_lecture(&mut self, chapter: &Chapter, lecture: LectureContent) {
        self.lectures.insert(chapter.key(), lecture);
        self.touch();
    }

    /// The conversation for a chapter.
    #[must_use]
    pub fn history(&self, chapter: &Chapter) -> &[ConversationTurn] {
        self.histories
            .get(&chapter.key())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Mutable conversation for a chapter, created on first use.
    pub fn history_mut(&mut self, chapter: &Chapter) -> &mut Vec<ConversationTurn> {
        self.histories.entry(chapter.key()).or_default()
    }

    /// Clears a chapter's conversation. The lecture is kept.
    pub fn reset_history(&mut self, chapter: &Chapter) {
        self.histories.remove(&chapter.key());
        self.touch();
    }

    /// Loads a session from disk.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::SessionCorrupted` if the file is not a valid
    /// session, or `CourseError::Io` if it cannot be read.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let session: Self = serde_json::from_str(&contents)
            .map_err(|e| CourseError::session_corrupted(path, e.to_string()))?;

        if session.version > SESSION_VERSION {
            return Err(CourseError::session_corrupted(
                path,
                format!(
                    "session version {} is newer than supported version {SESSION_VERSION}",
                    session.version
                ),
            ));
        }

        tracing::debug!(path = %path.display(), course = %session.request.course_name, "Loaded session");
        Ok(Some(session))
    }

    /// Writes the session to disk as pretty JSON, creating parent directories.
    ///
    /// The file is written to a temporary sibling and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::Io` or `CourseError::Json` on failure.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        tracing::debug!(path = %path.display(), "Saved session");
        Ok(())
    }
}
