//! Course content types shared by the engine and its consumers.
//!
//! Records deserialize from both the English `snake_case` keys used when
//! persisting sessions and the Chinese keys the generation service is asked
//! to produce, so a parsed model response and a reloaded session go through
//! the same types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// EducationStage
// ============================================================================

/// Target education stage of a course.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EducationStage {
    /// Primary school (default).
    #[default]
    Primary,
    /// Middle school.
    Middle,
    /// High school.
    High,
    /// University.
    University,
}

impl EducationStage {
    /// All stages in ascending order.
    pub const ALL: [Self; 4] = [Self::Primary, Self::Middle, Self::High, Self::University];

    /// Parses a stage from its English or Chinese name, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "primary" | "primary school" | "小学" => Some(Self::Primary),
            "middle" | "middle school" | "初中" => Some(Self::Middle),
            "high" | "high school" | "高中" => Some(Self::High),
            "university" | "college" | "大学" => Some(Self::University),
            _ => None,
        }
    }

    /// Canonical serialized name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Middle => "middle",
            Self::High => "high",
            Self::University => "university",
        }
    }

    /// Chinese label, as used in prompts and Chinese lecture text.
    #[must_use]
    pub const fn label_zh(&self) -> &'static str {
        match self {
            Self::Primary => "小学",
            Self::Middle => "初中",
            Self::High => "高中",
            Self::University => "大学",
        }
    }

    /// English label.
    #[must_use]
    pub const fn label_en(&self) -> &'static str {
        match self {
            Self::Primary => "Primary School",
            Self::Middle => "Middle School",
            Self::High => "High School",
            Self::University => "University",
        }
    }

    /// Stage label in the given language.
    #[must_use]
    pub const fn label(&self, language: Language) -> &'static str {
        match language {
            Language::Chinese => self.label_zh(),
            Language::English => self.label_en(),
        }
    }
}

impl std::fmt::Display for EducationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label_en())
    }
}

impl std::str::FromStr for EducationStage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_str_case_insensitive(s).ok_or_else(|| {
            format!("invalid education stage '{s}': expected one of 'primary', 'middle', 'high', 'university'")
        })
    }
}

impl<'de> Deserialize<'de> for EducationStage {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for EducationStage {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Language
// ============================================================================

/// Output language for lecture text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Language {
    /// Chinese (default).
    #[default]
    Chinese,
    /// English.
    English,
}

impl Language {
    /// Parses a language name, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "chinese" | "zh" | "中文" => Some(Self::Chinese),
            "english" | "en" | "英文" => Some(Self::English),
            _ => None,
        }
    }

    /// Canonical serialized name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Chinese => "chinese",
            Self::English => "english",
        }
    }

    /// Name of the language as written in prompts.
    #[must_use]
    pub const fn prompt_name(&self) -> &'static str {
        match self {
            Self::Chinese => "中文",
            Self::English => "English",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_str_case_insensitive(s)
            .ok_or_else(|| format!("invalid language '{s}': expected one of 'chinese', 'english'"))
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for Language {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// CourseOutline and Chapter
// ============================================================================

/// Structured outline of a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseOutline {
    /// Name of the course.
    #[serde(default, alias = "课程名称")]
    pub course_name: String,

    /// Target education stage.
    #[serde(default, alias = "教育阶段")]
    pub education_stage: EducationStage,

    /// Teaching objectives as free text.
    #[serde(default, alias = "教学目标")]
    pub objectives: String,

    /// Requested hour budget.
    #[serde(default, alias = "总学时", deserialize_with = "de_hours")]
    pub total_hours: u32,

    /// Ordered chapters.
    #[serde(alias = "章节列表")]
    pub chapters: Vec<Chapter>,
}

impl CourseOutline {
    /// Sum of the hours allocated to chapters.
    ///
    /// Remotely generated outlines are not rescaled, so this may differ
    /// from `total_hours`.
    #[must_use]
    pub fn hours_allocated(&self) -> u32 {
        self.chapters.iter().map(|c| c.hours).sum()
    }

    /// Finds a chapter by exact name.
    #[must_use]
    pub fn chapter(&self, name: &str) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.name == name)
    }

    /// Finds the first chapter whose key matches `key`.
    #[must_use]
    pub fn chapter_by_key(&self, key: &ChapterKey) -> Option<&Chapter> {
        self.chapters.iter().find(|c| &c.key() == key)
    }
}

/// One chapter of a course outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter name, expected unique within an outline.
    #[serde(alias = "章节名称")]
    pub name: String,

    /// Teaching hours, at least 1.
    #[serde(alias = "学时", deserialize_with = "de_hours")]
    pub hours: u32,

    /// Key points to cover.
    #[serde(default, alias = "重点内容")]
    pub key_points: String,
}

impl Chapter {
    /// Creates a chapter.
    #[must_use]
    pub fn new(name: impl Into<String>, hours: u32, key_points: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hours,
            key_points: key_points.into(),
        }
    }

    /// Returns the lookup key for this chapter's lecture and conversation.
    #[must_use]
    pub fn key(&self) -> ChapterKey {
        ChapterKey::from_name(&self.name)
    }
}

/// Accepts hours as an integer, a float or a numeric string such as `"4"` or `"4学时"`.
fn de_hours<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    hours_from_value(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid hours value: {value}")))
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn hours_from_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|h| u32::try_from(h).ok())
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u32)),
        Value::String(s) => {
            let digits: String = s
                .trim()
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

// ============================================================================
// ChapterKey
// ============================================================================

/// Normalized lookup key derived from a chapter name.
///
/// Every character that is not alphanumeric or `_` becomes `_`, so distinct
/// names can map to the same key (`"Unit 1: Intro"` and `"Unit_1_ Intro"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterKey(String);

impl ChapterKey {
    /// Derives the key for a chapter name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let clean: String = name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        Self(format!("lecture_{clean}"))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChapterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// LectureContent
// ============================================================================

/// Formatted lecture text (Markdown) for one chapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LectureContent(String);

impl LectureContent {
    /// Wraps lecture text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Returns the text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Returns `true` if the lecture has no visible text.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for LectureContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Resources
// ============================================================================

/// The four resource categories of a [`ResourceSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceCategory {
    /// Textbooks.
    Textbooks,
    /// Online videos.
    Videos,
    /// Tools and software.
    Tools,
    /// Case studies.
    CaseStudies,
}

impl ResourceCategory {
    /// All categories in display order.
    pub const ALL: [Self; 4] = [Self::Textbooks, Self::Videos, Self::Tools, Self::CaseStudies];

    /// Key used in persisted sessions.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Textbooks => "textbooks",
            Self::Videos => "videos",
            Self::Tools => "tools",
            Self::CaseStudies => "case_studies",
        }
    }

    /// Key the generation service is asked to produce.
    #[must_use]
    pub const fn key_zh(&self) -> &'static str {
        match self {
            Self::Textbooks => "教材",
            Self::Videos => "在线视频",
            Self::Tools => "工具/软件",
            Self::CaseStudies => "案例研究",
        }
    }

    /// Human-readable heading.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::Textbooks => "Textbooks",
            Self::Videos => "Online Videos",
            Self::Tools => "Tools & Software",
            Self::CaseStudies => "Case Studies",
        }
    }
}

impl std::fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Recommended teaching resources, grouped by category.
///
/// After orchestration every category is present; an empty sequence only
/// appears when the synthesizer itself had nothing for that category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSet {
    /// Textbooks.
    #[serde(default, alias = "教材")]
    pub textbooks: Vec<ResourceItem>,

    /// Online videos.
    #[serde(default, alias = "在线视频")]
    pub videos: Vec<ResourceItem>,

    /// Tools and software.
    #[serde(default, alias = "工具/软件")]
    pub tools: Vec<ResourceItem>,

    /// Case studies.
    #[serde(default, alias = "案例研究")]
    pub case_studies: Vec<ResourceItem>,
}

impl ResourceSet {
    /// Returns the items of a category.
    #[must_use]
    pub fn get(&self, category: ResourceCategory) -> &[ResourceItem] {
        match category {
            ResourceCategory::Textbooks => &self.textbooks,
            ResourceCategory::Videos => &self.videos,
            ResourceCategory::Tools => &self.tools,
            ResourceCategory::CaseStudies => &self.case_studies,
        }
    }

    /// Replaces the items of a category.
    pub fn set(&mut self, category: ResourceCategory, items: Vec<ResourceItem>) {
        match category {
            ResourceCategory::Textbooks => self.textbooks = items,
            ResourceCategory::Videos => self.videos = items,
            ResourceCategory::Tools => self.tools = items,
            ResourceCategory::CaseStudies => self.case_studies = items,
        }
    }

    /// Total number of items across categories.
    #[must_use]
    pub fn len(&self) -> usize {
        ResourceCategory::ALL.iter().map(|c| self.get(*c).len()).sum()
    }

    /// Returns `true` if no category has any item.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Field labels that carry an item's display title.
const TITLE_KEYS: &[&str] = &[
    "title", "name", "书名", "视频标题", "工具名称", "案例名称",
];

/// Field labels that carry an item's link.
const LINK_KEYS: &[&str] = &["link", "url", "链接"];

/// A single recommended resource.
///
/// The generation service returns either labelled fields or a bare string;
/// both shapes are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceItem {
    /// A bare description.
    Text(String),
    /// Labelled fields such as title, author, link and notes.
    Fields(Map<String, Value>),
}

impl ResourceItem {
    /// Converts an arbitrary JSON value into an item.
    ///
    /// Strings and objects keep their shape; anything else is rendered as text.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            Value::Object(map) => Self::Fields(map),
            other => Self::Text(other.to_string()),
        }
    }

    /// Builds a field item from label/value pairs.
    #[must_use]
    pub fn fields<'a>(pairs: impl IntoIterator<Item = (&'a str, String)>) -> Self {
        Self::Fields(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::String(v)))
                .collect(),
        )
    }

    /// Display title: the first title-like field, or the text itself.
    #[must_use]
    pub fn title(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Fields(map) => TITLE_KEYS
                .iter()
                .find_map(|k| map.get(*k))
                .map(value_text)
                .filter(|s| !s.is_empty()),
        }
    }

    /// Link, if the item has one.
    #[must_use]
    pub fn link(&self) -> Option<String> {
        match self {
            Self::Text(_) => None,
            Self::Fields(map) => LINK_KEYS
                .iter()
                .find_map(|k| map.get(*k))
                .map(value_text)
                .filter(|s| !s.is_empty()),
        }
    }

    /// Remaining non-empty fields as `(label, text)` pairs.
    #[must_use]
    pub fn details(&self) -> Vec<(String, String)> {
        match self {
            Self::Text(_) => Vec::new(),
            Self::Fields(map) => map
                .iter()
                .filter(|(k, _)| !TITLE_KEYS.contains(&k.as_str()) && !LINK_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), value_text(v)))
                .filter(|(_, v)| !v.is_empty())
                .collect(),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// ConversationTurn
// ============================================================================

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The teacher asking for a revision.
    User,
    /// The assistant reporting the outcome.
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One turn of a chapter's refinement conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who spoke.
    pub role: Role,
    /// What was said.
    pub message: String,
}

impl ConversationTurn {
    /// Creates a user turn.
    #[must_use]
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            message: message.into(),
        }
    }

    /// Creates an assistant turn.
    #[must_use]
    pub fn assistant(message: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            message: message.into(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
