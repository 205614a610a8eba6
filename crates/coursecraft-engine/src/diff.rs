//! Line-level change marking between two lecture revisions.

use serde::Serialize;

/// A line of the new revision and whether it differs from the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkedLine {
    /// Line text.
    pub text: String,
    /// `true` if the line is new or modified.
    pub changed: bool,
}

/// Marks the lines of `new` that differ from `old`.
///
/// Walks both revisions in step: equal lines advance both cursors, a
/// differing new line is marked and only the new cursor advances. New lines
/// left over at the end are marked. An empty `old` marks nothing, since there
/// is no earlier revision to compare with.
#[must_use]
pub fn mark_changes(old: &str, new: &str) -> Vec<MarkedLine> {
    let new_lines: Vec<&str> = new.split('\n').collect();
    if old.is_empty() {
        return new_lines
            .into_iter()
            .map(|text| MarkedLine {
                text: text.to_string(),
                changed: false,
            })
            .collect();
    }

    let old_lines: Vec<&str> = old.split('\n').collect();
    let mut i = 0;
    new_lines
        .into_iter()
        .map(|line| {
            let same = old_lines.get(i).is_some_and(|old_line| *old_line == line);
            if same {
                i += 1;
            }
            MarkedLine {
                text: line.to_string(),
                changed: !same,
            }
        })
        .collect()
}

/// Number of changed lines.
#[must_use]
pub fn changed_count(lines: &[MarkedLine]) -> usize {
    lines.iter().filter(|l| l.changed).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(lines: &[MarkedLine]) -> Vec<bool> {
        lines.iter().map(|l| l.changed).collect()
    }

    #[test]
    fn test_identical_text_has_no_changes() {
        let lines = mark_changes("a\nb\nc", "a\nb\nc");
        assert_eq!(flags(&lines), vec![false, false, false]);
        assert_eq!(changed_count(&lines), 0);
    }

    #[test]
    fn test_inserted_line_is_marked() {
        let lines = mark_changes("a\nb", "a\nx\nb");
        assert_eq!(flags(&lines), vec![false, true, false]);
    }

    #[test]
    fn test_appended_lines_are_marked() {
        let lines = mark_changes("a", "a\n\n---\nfeedback");
        assert_eq!(flags(&lines), vec![false, true, true, true]);
        assert_eq!(changed_count(&lines), 3);
    }

    #[test]
    fn test_replaced_line_marks_rest_until_resync() {
        // "b" never reappears, so everything after it is marked.
        let lines = mark_changes("a\nb\nc", "a\nB\nc");
        assert_eq!(flags(&lines), vec![false, true, true]);
    }

    #[test]
    fn test_empty_old_marks_nothing() {
        let lines = mark_changes("", "a\nb");
        assert_eq!(flags(&lines), vec![false, false]);
    }
}
