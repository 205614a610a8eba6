//! Condensing policy documents into prompt-sized requirement text.

/// Default character budget for extracted requirements.
pub const DEFAULT_MAX_CHARS: usize = 1000;

/// Lines kept from a policy document.
const MAX_LINES: usize = 10;

const REQUIREMENT_KEYWORDS: &[&str] = &[
    "要求", "目标", "标准", "考试", "大纲", "政策", "规定", "掌握", "理解", "应用",
    "require", "objective", "standard", "exam", "syllabus", "policy", "regulation", "must",
];

/// Picks the lines of `text` most likely to state requirements.
///
/// Non-blank lines containing a requirement keyword come first, in document
/// order, followed by the remaining lines. At most ten lines are kept and
/// the result is cut to `max_chars` characters, with `...` marking a cut.
#[must_use]
pub fn extract_key_requirements(text: &str, max_chars: usize) -> String {
    let (important, other): (Vec<&str>, Vec<&str>) = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .partition(|line| {
            let lower = line.to_lowercase();
            REQUIREMENT_KEYWORDS.iter().any(|k| lower.contains(k))
        });

    let selected = important
        .into_iter()
        .chain(other)
        .take(MAX_LINES)
        .collect::<Vec<_>>()
        .join("\n");

    if selected.chars().count() > max_chars {
        let head: String = selected.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        selected
    }
}
