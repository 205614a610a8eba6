//! Teacher satisfaction survey: persistence and tallies.
//!
//! Answers are appended to a JSON array file, one object per submission.
//! [`SurveySummary`] counts single-choice and multi-choice answers and
//! collects open responses with their most frequent words.

use std::collections::HashMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

/// Default survey results file.
pub const DEFAULT_SURVEY_FILE: &str = "survey_results.json";

/// Questions answered with one option.
pub const SINGLE_CHOICE: &[&str] = &["q1", "q2", "q3", "q4", "q5", "q6", "q7", "q10"];

/// Questions answered with any number of options.
pub const MULTI_CHOICE: &[&str] = &["q8", "q9"];

/// Questions answered in free text.
pub const OPEN_QUESTIONS: &[&str] = &["q11"];

/// Words reported per open question.
const TOP_WORDS: usize = 10;

/// Question wording for report headings.
#[must_use]
pub fn question_title(key: &str) -> &str {
    match key {
        "q1" => "1. 您目前主要任教的学段是？",
        "q2" => "2. 您任教的主要学科专业领域是？",
        "q3" => "3. 您使用本助教智能体的频率是？",
        "q4" => "4. 总体而言，您对本助教智能体的满意度如何？",
        "q5" => "5. 您认为智能体生成的大纲/讲义内容质量如何？",
        "q6" => "6. 您认为智能体生成的PPT内容与美观度如何？",
        "q7" => "7. 智能体回复您需求的速度如何？",
        "q8" => "8. 您最常使用本智能体的哪些功能？",
        "q9" => "9. 您希望未来智能体增加哪些功能？",
        "q10" => "10. 您有多大可能将本助教智能体推荐给您的同事或朋友？",
        "q11" => "11. 您认为我们还有什么需要改进地方？请提出您宝贵的建议。",
        other => other,
    }
}

// ============================================================================
// Records
// ============================================================================

/// One survey submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyRecord {
    /// Submission time, `YYYY-MM-DD HH:MM:SS` in UTC.
    #[serde(default)]
    pub timestamp: String,

    /// Answers keyed by question.
    #[serde(flatten)]
    pub answers: Map<String, Value>,
}

impl SurveyRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(answers: Map<String, Value>) -> Self {
        Self {
            timestamp: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            answers,
        }
    }

    /// Answer to a question, if present and not empty.
    #[must_use]
    pub fn answer(&self, key: &str) -> Option<&Value> {
        self.answers.get(key).filter(|v| !is_empty_answer(v))
    }
}

fn is_empty_answer(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn answer_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Append-only survey results file.
#[derive(Debug, Clone)]
pub struct SurveyStore {
    path: PathBuf,
}

impl SurveyStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the results file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a timestamped submission and returns the new record count.
    ///
    /// A missing file is created. A file that is not a valid record array is
    /// replaced, keeping only the new record. The file is written to a
    /// temporary sibling and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ExportError::Io`] if the file cannot be written.
    pub fn append(&self, answers: Map<String, Value>) -> Result<usize> {
        let mut records = self.load()?;
        records.push(SurveyRecord::new(answers));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&records)?)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::info!(path = %self.path.display(), records = records.len(), "Saved survey response");
        Ok(records.len())
    }

    /// Loads all submissions.
    ///
    /// A missing file yields no records; so does a malformed one, with a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ExportError::Io`] if the file exists but cannot be read.
    pub fn load(&self) -> Result<Vec<SurveyRecord>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&contents) {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Survey results file is malformed; treating as empty"
                );
                Ok(Vec::new())
            }
        }
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Count and share of one answer option.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionCount {
    /// Option text.
    pub option: String,
    /// Number of times chosen.
    pub count: usize,
    /// Share in percent, one decimal place.
    pub percent: f64,
}

/// Tally of one choice question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoiceTally {
    /// Question key.
    pub key: String,
    /// Options in first-seen order.
    pub options: Vec<OptionCount>,
}

/// Responses to one open question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenTally {
    /// Question key.
    pub key: String,
    /// Non-empty responses in submission order.
    pub responses: Vec<String>,
    /// Most frequent words with their counts.
    pub top_words: Vec<(String, usize)>,
}

/// Tallies over all survey submissions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveySummary {
    /// Number of submissions.
    pub total: usize,
    /// Single-choice questions; percentages are of the answers given.
    pub single_choice: Vec<ChoiceTally>,
    /// Multi-choice questions; percentages are of all submissions.
    pub multi_choice: Vec<ChoiceTally>,
    /// Open questions.
    pub open: Vec<OpenTally>,
}

impl SurveySummary {
    /// Tallies the given submissions.
    #[must_use]
    pub fn from_records(records: &[SurveyRecord]) -> Self {
        Self {
            total: records.len(),
            single_choice: SINGLE_CHOICE
                .iter()
                .map(|key| tally_single(records, key))
                .collect(),
            multi_choice: MULTI_CHOICE
                .iter()
                .map(|key| tally_multi(records, key))
                .collect(),
            open: OPEN_QUESTIONS
                .iter()
                .map(|key| tally_open(records, key))
                .collect(),
        }
    }

    /// Renders the summary as Markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        let _ = writeln!(output, "# 满意度调查统计摘要\n");
        let _ = writeln!(output, "总评价数: {}\n", self.total);

        let _ = writeln!(output, "## 单选题统计\n");
        for tally in &self.single_choice {
            write_choice_tally(&mut output, tally, "人");
        }

        let _ = writeln!(output, "## 多选题统计\n");
        for tally in &self.multi_choice {
            write_choice_tally(&mut output, tally, "次");
        }

        let _ = writeln!(output, "## 开放题回答摘要\n");
        for tally in &self.open {
            write_open_tally(&mut output, tally);
        }

        output
    }
}

fn write_choice_tally(output: &mut String, tally: &ChoiceTally, unit: &str) {
    let _ = writeln!(output, "### {}\n", question_title(&tally.key));
    if tally.options.is_empty() {
        let _ = writeln!(output, "*暂无回答。*\n");
        return;
    }
    for option in &tally.options {
        let _ = writeln!(
            output,
            "- {}: {}{unit} ({:.1}%)",
            option.option, option.count, option.percent
        );
    }
    let _ = writeln!(output);
}

fn write_open_tally(output: &mut String, tally: &OpenTally) {
    let _ = writeln!(output, "### {}\n", question_title(&tally.key));
    let _ = writeln!(output, "共收到 {} 条改进建议\n", tally.responses.len());

    if !tally.top_words.is_empty() {
        let words = tally
            .top_words
            .iter()
            .map(|(word, count)| format!("{word} ({count})"))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(output, "高频词: {words}\n");
    }

    for (index, response) in tally.responses.iter().enumerate() {
        let _ = writeln!(output, "**建议 {}:**\n\n{response}\n", index + 1);
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 * 1000.0 / total as f64).round() / 10.0
}

/// Adds one to `option`, keeping first-seen order.
fn bump(counts: &mut Vec<(String, usize)>, option: String) {
    match counts.iter_mut().find(|(o, _)| *o == option) {
        Some((_, count)) => *count += 1,
        None => counts.push((option, 1)),
    }
}

fn with_percentages(counts: Vec<(String, usize)>, total: usize) -> Vec<OptionCount> {
    counts
        .into_iter()
        .map(|(option, count)| OptionCount {
            percent: percent(count, total),
            option,
            count,
        })
        .collect()
}

fn tally_single(records: &[SurveyRecord], key: &str) -> ChoiceTally {
    let mut counts = Vec::new();
    for answer in records.iter().filter_map(|r| r.answer(key)) {
        bump(&mut counts, answer_text(answer));
    }
    let answered = counts.iter().map(|(_, c)| c).sum();
    ChoiceTally {
        key: key.to_string(),
        options: with_percentages(counts, answered),
    }
}

fn tally_multi(records: &[SurveyRecord], key: &str) -> ChoiceTally {
    let mut counts = Vec::new();
    for answer in records.iter().filter_map(|r| r.answer(key)) {
        match answer {
            Value::Array(items) => {
                for item in items.iter().filter(|v| !is_empty_answer(v)) {
                    bump(&mut counts, answer_text(item));
                }
            }
            single => bump(&mut counts, answer_text(single)),
        }
    }
    ChoiceTally {
        key: key.to_string(),
        options: with_percentages(counts, records.len()),
    }
}

fn tally_open(records: &[SurveyRecord], key: &str) -> OpenTally {
    let responses: Vec<String> = records
        .iter()
        .filter_map(|r| r.answer(key))
        .map(answer_text)
        .collect();
    let top_words = word_frequencies(&responses, TOP_WORDS);
    OpenTally {
        key: key.to_string(),
        responses,
        top_words,
    }
}

/// Most frequent words across responses, ties in first-seen order.
///
/// Words are runs of letters and digits, lowercased; single characters are
/// ignored.
fn word_frequencies(responses: &[String], limit: usize) -> Vec<(String, usize)> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for word in responses
        .iter()
        .flat_map(|r| r.split(|c: char| !c.is_alphanumeric()))
        .filter(|w| w.chars().count() > 1)
        .map(str::to_lowercase)
    {
        let count = counts.entry(word.clone()).or_insert(0);
        if *count == 0 {
            order.push(word);
        }
        *count += 1;
    }

    let mut ranked: Vec<(String, usize)> = order
        .into_iter()
        .map(|word| {
            let count = counts.get(&word).copied().unwrap_or_default();
            (word, count)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(limit);
    ranked
}
