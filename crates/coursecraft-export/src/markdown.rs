//! Markdown export of a whole course.
//!
//! [`MarkdownExporter`] turns a [`CoursePackage`] into a single document:
//!
//! - A summary table with stage, hours and objectives
//! - The chapter plan
//! - Every generated lecture, headings nested under the chapter name
//! - Recommended resources grouped by category
//!
//! Headings and labels follow the package language.

use chrono::Utc;
use coursecraft_engine::{Language, ResourceCategory, ResourceItem};
use std::fmt::Write;

use crate::CoursePackage;

/// Levels lecture headings are pushed down by, so `#` lands under `###`.
const LECTURE_HEADING_SHIFT: usize = 2;

/// Headings and labels in one language.
struct Labels {
    summary: &'static str,
    item: &'static str,
    value: &'static str,
    stage: &'static str,
    total_hours: &'static str,
    allocated_hours: &'static str,
    chapter_count: &'static str,
    objectives: &'static str,
    chapters: &'static str,
    number: &'static str,
    chapter: &'static str,
    hours: &'static str,
    key_points: &'static str,
    lectures: &'static str,
    no_lectures: &'static str,
    resources: &'static str,
    no_resources: &'static str,
    link: &'static str,
    generated_at: &'static str,
}

static LABELS_ZH: Labels = Labels {
    summary: "课程概况",
    item: "项目",
    value: "内容",
    stage: "教育阶段",
    total_hours: "总学时",
    allocated_hours: "已分配学时",
    chapter_count: "章节数",
    objectives: "教学目标",
    chapters: "章节安排",
    number: "序号",
    chapter: "章节",
    hours: "学时",
    key_points: "重点内容",
    lectures: "讲义",
    no_lectures: "*暂无讲义。*",
    resources: "教学资源",
    no_resources: "*暂无推荐。*",
    link: "链接",
    generated_at: "由 CourseCraft 生成于",
};

static LABELS_EN: Labels = Labels {
    summary: "Course Summary",
    item: "Item",
    value: "Value",
    stage: "Education Stage",
    total_hours: "Total Hours",
    allocated_hours: "Hours Allocated",
    chapter_count: "Chapters",
    objectives: "Objectives",
    chapters: "Chapter Plan",
    number: "#",
    chapter: "Chapter",
    hours: "Hours",
    key_points: "Key Points",
    lectures: "Lectures",
    no_lectures: "*No lectures generated.*",
    resources: "Teaching Resources",
    no_resources: "*No recommendations.*",
    link: "link",
    generated_at: "Generated by CourseCraft at",
};

fn labels(language: Language) -> &'static Labels {
    match language {
        Language::Chinese => &LABELS_ZH,
        Language::English => &LABELS_EN,
    }
}

/// Generates a Markdown document from a [`CoursePackage`].
pub struct MarkdownExporter<'a> {
    package: &'a CoursePackage,
    labels: &'static Labels,
}

impl<'a> MarkdownExporter<'a> {
    /// Creates an exporter for the given package.
    #[must_use]
    pub fn new(package: &'a CoursePackage) -> Self {
        Self {
            package,
            labels: labels(package.language),
        }
    }

    /// Generates the complete document, ending with a timestamped footer.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_chapters(&mut output);
        self.write_lectures(&mut output);
        self.write_resources(&mut output);
        self.write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(output, "# {}\n", self.package.outline.course_name.trim());
    }

    fn write_summary(&self, output: &mut String) {
        let l = self.labels;
        let outline = &self.package.outline;

        let _ = writeln!(output, "## {}\n", l.summary);
        let _ = writeln!(output, "| {} | {} |", l.item, l.value);
        let _ = writeln!(output, "|------|------|");
        let _ = writeln!(
            output,
            "| {} | {} |",
            l.stage,
            outline.education_stage.label(self.package.language)
        );
        let _ = writeln!(output, "| {} | {} |", l.total_hours, outline.total_hours);
        let _ = writeln!(
            output,
            "| {} | {} |",
            l.allocated_hours,
            outline.hours_allocated()
        );
        let _ = writeln!(output, "| {} | {} |", l.chapter_count, outline.chapters.len());
        if !outline.objectives.trim().is_empty() {
            let _ = writeln!(
                output,
                "| {} | {} |",
                l.objectives,
                escape_table_cell(outline.objectives.trim())
            );
        }
        let _ = writeln!(output);
    }

    fn write_chapters(&self, output: &mut String) {
        let l = self.labels;

        let _ = writeln!(output, "## {}\n", l.chapters);
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} |",
            l.number, l.chapter, l.hours, l.key_points
        );
        let _ = writeln!(output, "|------|------|------|----------|");

        for (index, chapter) in self.package.outline.chapters.iter().enumerate() {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} |",
                index + 1,
                escape_table_cell(&chapter.name),
                chapter.hours,
                escape_table_cell(&chapter.key_points)
            );
        }

        let _ = writeln!(output);
    }

    fn write_lectures(&self, output: &mut String) {
        let _ = writeln!(output, "## {}\n", self.labels.lectures);

        if self.package.lectures.is_empty() {
            let _ = writeln!(output, "{}\n", self.labels.no_lectures);
            return;
        }

        for (chapter, lecture) in &self.package.lectures {
            let _ = writeln!(output, "### {}\n", chapter.name);
            let _ = writeln!(
                output,
                "{}\n",
                demote_headings(lecture.as_str().trim(), LECTURE_HEADING_SHIFT)
            );
        }
    }

    fn write_resources(&self, output: &mut String) {
        let _ = writeln!(output, "## {}\n", self.labels.resources);

        for category in ResourceCategory::ALL {
            let heading = match self.package.language {
                Language::Chinese => category.key_zh(),
                Language::English => category.title(),
            };
            let _ = writeln!(output, "### {heading}\n");

            let items = self.package.resources.get(category);
            if items.is_empty() {
                let _ = writeln!(output, "{}\n", self.labels.no_resources);
                continue;
            }

            for item in items {
                self.write_resource_item(output, item);
            }
            let _ = writeln!(output);
        }
    }

    fn write_resource_item(&self, output: &mut String, item: &ResourceItem) {
        let title = item.title().unwrap_or_else(|| "-".to_string());
        match item.link() {
            Some(link) => {
                let _ = writeln!(output, "- **{title}** ([{}]({link}))", self.labels.link);
            }
            None => {
                let _ = writeln!(output, "- **{title}**");
            }
        }
        for (label, value) in item.details() {
            let _ = writeln!(output, "  - {label}: {value}");
        }
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---");
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let _ = writeln!(output, "*{} {timestamp}*", self.labels.generated_at);
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Escapes a value for use inside a table cell.
fn escape_table_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', "<br>")
}

/// Pushes ATX headings down by `levels`, capped at `######`.
///
/// Lines inside fenced code blocks are left alone.
fn demote_headings(text: &str, levels: usize) -> String {
    let mut in_fence = false;
    text.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                return line.to_string();
            }
            let hashes = line.chars().take_while(|c| *c == '#').count();
            let is_heading = !in_fence
                && (1..=6).contains(&hashes)
                && line[hashes..].starts_with(' ');
            if is_heading {
                let depth = (hashes + levels).min(6);
                format!("{}{}", "#".repeat(depth), &line[hashes..])
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
