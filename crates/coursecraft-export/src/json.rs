//! JSON export of a course package.
//!
//! [`JsonExporter`] serializes a [`CoursePackage`] as compact single-line JSON
//! or pretty-printed for reading.
//!
//! # Example
//!
//! ```rust
//! use coursecraft_engine::{Chapter, CourseOutline, EducationStage, ResourceSet};
//! use coursecraft_export::{json::JsonExporter, CoursePackage};
//!
//! let outline = CourseOutline {
//!     course_name: "Statistics".to_string(),
//!     education_stage: EducationStage::University,
//!     objectives: String::new(),
//!     total_hours: 2,
//!     chapters: vec![Chapter::new("Sampling", 2, "")],
//! };
//! let package = CoursePackage::new(outline, ResourceSet::default());
//!
//! let json = JsonExporter::new(&package).generate_pretty().unwrap();
//! assert!(json.contains("\"course_name\": \"Statistics\""));
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{CoursePackage, ExportError, Result};

/// JSON exporter for a [`CoursePackage`].
pub struct JsonExporter<'a> {
    package: &'a CoursePackage,
}

impl<'a> JsonExporter<'a> {
    /// Creates an exporter for the given package.
    #[must_use]
    pub const fn new(package: &'a CoursePackage) -> Self {
        Self { package }
    }

    /// Generates compact JSON (single line, no extra whitespace).
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Serialization`] if serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.package).map_err(ExportError::from)
    }

    /// Generates pretty-printed JSON with two-space indentation.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Serialization`] if serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.package).map_err(ExportError::from)
    }

    /// Writes the JSON to a file, creating or overwriting it.
    ///
    /// Parent directories must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Serialization`] if serialization fails and
    /// [`ExportError::Io`] if the file cannot be written.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;

        tracing::debug!(path = %path.display(), bytes = json.len(), "Wrote JSON export");
        Ok(())
    }
}
