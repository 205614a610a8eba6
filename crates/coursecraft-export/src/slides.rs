//! Slide planning from lecture Markdown.
//!
//! A lecture is cut into slides the way a presenter would page through it:
//! the first line becomes the title slide, each heading from `#` to `####`
//! starts a new slide, and long runs of text spill onto continuation slides.
//! [`SlideDeck::to_marp`] renders the plan as a Marp deck.

use std::fmt::Write;
use std::path::Path;

use coursecraft_engine::Language;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::Result;

/// Estimated lines at which a slide is full.
pub const MAX_LINES_PER_SLIDE: usize = 12;

/// Characters that fit on one rendered line.
const CHARS_PER_LINE: usize = 50;

static SLIDE_BREAK: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^#{1,4} ").unwrap()
});

static HEADING_MARKER: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^#+\s*").unwrap()
});

static LIST_MARKER: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[*-]\s*").unwrap()
});

static BOLD: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\*\*(.*?)\*\*").unwrap()
});

static INLINE_CODE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"`(.*?)`").unwrap()
});

/// One slide: a title and its body lines, Markdown markers removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slide {
    /// Slide title.
    pub title: String,
    /// Body lines.
    pub lines: Vec<String>,
}

/// An ordered slide plan for one lecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlideDeck {
    /// Slides in presentation order.
    pub slides: Vec<Slide>,
}

impl SlideDeck {
    /// Plans slides for a lecture.
    ///
    /// Blank lines never count towards a slide's size. Empty input yields a
    /// single placeholder slide.
    #[must_use]
    pub fn from_markdown(text: &str, language: Language) -> Self {
        let mut planner = Planner::new(language);
        let mut lines = text.lines().map(str::trim).skip_while(|l| l.is_empty());

        if let Some(first) = lines.next() {
            planner.open(clean_title(first));
        }

        for line in lines.filter(|l| !l.is_empty()) {
            if SLIDE_BREAK.is_match(line) {
                planner.open(clean_title(line));
            } else {
                planner.push(line);
            }
        }

        planner.finish()
    }

    /// Number of slides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slides.len()
    }

    /// Returns `true` if the deck has no slides.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    /// Slide titles in order.
    #[must_use]
    pub fn titles(&self) -> Vec<&str> {
        self.slides.iter().map(|s| s.title.as_str()).collect()
    }

    /// Renders the deck as Marp Markdown.
    ///
    /// The first slide title is a level-one heading, the rest level two.
    #[must_use]
    pub fn to_marp(&self) -> String {
        let mut output = String::from("---\nmarp: true\npaginate: true\n---\n");

        for (index, slide) in self.slides.iter().enumerate() {
            if index > 0 {
                output.push_str("\n---\n");
            }
            let level = if index == 0 { "#" } else { "##" };
            let _ = writeln!(output, "\n{level} {}", slide.title);
            for line in &slide.lines {
                let _ = writeln!(output, "\n{line}");
            }
        }

        output
    }

    /// Writes the Marp rendering to a file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ExportError::Io`] if the file cannot be written.
    pub fn write_marp(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_marp())?;
        tracing::debug!(path = %path.display(), slides = self.len(), "Wrote slide deck");
        Ok(())
    }
}

/// Accumulates lines into the slide currently being filled.
struct Planner {
    language: Language,
    slides: Vec<Slide>,
    current: Option<Slide>,
    line_count: usize,
}

impl Planner {
    const fn new(language: Language) -> Self {
        Self {
            language,
            slides: Vec::new(),
            current: None,
            line_count: 0,
        }
    }

    fn open(&mut self, title: String) {
        self.close();
        self.current = Some(Slide {
            title,
            lines: Vec::new(),
        });
        self.line_count = 0;
    }

    fn close(&mut self) {
        if let Some(slide) = self.current.take() {
            self.slides.push(slide);
        }
    }

    fn push(&mut self, raw: &str) {
        let estimate = estimated_lines(raw);
        self.line_count += estimate;

        if self.line_count >= MAX_LINES_PER_SLIDE {
            let title = match self.language {
                Language::Chinese => "（续）",
                Language::English => "Continued",
            };
            self.open(title.to_string());
            self.line_count = estimate;
        }

        let cleaned = clean_content(raw);
        if cleaned.is_empty() {
            return;
        }
        if let Some(slide) = self.current.as_mut() {
            slide.lines.push(cleaned);
        }
    }

    fn finish(mut self) -> SlideDeck {
        self.close();
        if self.slides.is_empty() {
            let (title, line) = match self.language {
                Language::Chinese => ("演示文稿", "暂无内容。"),
                Language::English => ("Presentation", "No content available."),
            };
            self.slides.push(Slide {
                title: title.to_string(),
                lines: vec![line.to_string()],
            });
        }
        SlideDeck {
            slides: self.slides,
        }
    }
}

/// Rendered lines a source line is expected to take.
fn estimated_lines(line: &str) -> usize {
    (line.chars().count() / CHARS_PER_LINE).max(1)
}

fn clean_title(text: &str) -> String {
    let text = HEADING_MARKER.replace(text, "");
    BOLD.replace_all(&text, "$1").trim().to_string()
}

fn clean_content(text: &str) -> String {
    let text = LIST_MARKER.replace(text, "");
    let text = BOLD.replace_all(&text, "$1");
    INLINE_CODE.replace_all(&text, "$1").trim().to_string()
}
