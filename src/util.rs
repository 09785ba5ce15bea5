//! Utility functions for convenience.

use std::path::Path;

use crate::error::Result;

/// Reads a file as text, tolerating non-UTF-8 byte sequences.
///
/// Submission files come from students and are occasionally saved with a
/// stray encoding; invalid sequences are replaced rather than rejected.
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

/// Counts words the same way everywhere: whitespace-separated tokens.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Collapses runs of whitespace and lowercases, for duplicate detection of
/// question text.
pub fn normalize_question(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Quotes a field for CSV output when it contains a delimiter, quote, or
/// newline.
pub fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
