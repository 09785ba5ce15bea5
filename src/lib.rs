//! # dg
//!
//! An AI-assisted grader for student discussion submissions.
//!
//! Discussions (question + rubric) and graded submissions live as plain
//! JSON/Markdown files under a storage directory; grading is a single
//! outbound request to an AI provider selected by a small factory. The
//! whole tool is single-user, single-process: identifier assignment and
//! file writes assume exclusive access to the storage directory, and
//! concurrent processes against the same directory are unsupported.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// The multi-provider AI client abstraction and factory
pub mod ai;
/// JSON-in/JSON-out adapter for Canvas SpeedGrader
pub mod canvas;
/// Configuration file and environment resolution
pub mod config;
/// Discussions and their file-backed store
pub mod discussion;
/// Error taxonomy shared across the crate
pub mod error;
/// The grading flow from prompt to persisted result
pub mod grader;
/// Grading criteria and prompt construction
pub mod grading;
/// Multi-strategy parsing of provider replies
pub mod parse;
/// Statistics and synthesized reports
pub mod report;
/// Submissions, grading results, and their file-backed store
pub mod submission;
/// Utility functions for convenience
pub mod util;

use std::str::FromStr;

/// Output format accepted by the CLI's `--format` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable report text.
    Text,
    /// Pretty-printed JSON.
    Json,
    /// Comma-separated values with a header row.
    Csv,
    /// Boxed terminal table.
    Table,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "table" => Ok(OutputFormat::Table),
            other => Err(format!(
                "unknown format `{other}`, expected text, json, csv, or table"
            )),
        }
    }
}
