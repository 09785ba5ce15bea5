//! JSON-in/JSON-out adapter for Canvas SpeedGrader integration.
//!
//! Reads one submission document from stdin, grades it through the
//! standard flow (creating or updating the discussion as needed), and
//! writes the grading result to stdout. Every failure is reported as the
//! adapter's JSON error envelope rather than a propagated error, so the
//! external caller always receives well-formed output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::GraderConfig,
    discussion::DiscussionUpdate,
    error::{GraderError, Result},
    grader::SubmissionGrader,
    submission::GradedSubmission,
};

/// Point total assumed when the caller omits one.
const DEFAULT_POINTS: u32 = 8;
/// Word-count minimum assumed when the caller omits one.
const DEFAULT_MIN_WORDS: usize = 100;

/// Discussion block of the input document.
#[derive(Debug, Default, Deserialize)]
pub struct CanvasDiscussion {
    /// Question text. Canvas sometimes sends `message` instead.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Alternate field name for the question text.
    #[serde(default)]
    pub message: Option<String>,
    /// Total points for the discussion.
    #[serde(default)]
    pub points_possible: Option<u32>,
    /// Minimum word count.
    #[serde(default)]
    pub min_words: Option<usize>,
    /// Optional title; derived from the prompt when absent.
    #[serde(default)]
    pub title: Option<String>,
    /// Existing discussion id to update, when the caller tracks one.
    #[serde(default)]
    pub id: Option<u32>,
}

/// Student block of the input document.
#[derive(Debug, Default, Deserialize)]
pub struct CanvasStudent {
    /// Student's full name, used for the personalised greeting.
    #[serde(default)]
    pub name: Option<String>,
}

/// Submission block of the input document.
#[derive(Debug, Default, Deserialize)]
pub struct CanvasSubmission {
    /// The submission text to grade.
    #[serde(default)]
    pub message: Option<String>,
    /// Caller-reported word count; ignored, we always recount.
    #[serde(default)]
    pub word_count: Option<usize>,
}

/// Full input document.
#[derive(Debug, Deserialize)]
pub struct CanvasInput {
    /// Discussion the submission belongs to.
    pub discussion: CanvasDiscussion,
    /// Student metadata.
    #[serde(default)]
    pub student: Option<CanvasStudent>,
    /// The submission itself.
    pub submission: CanvasSubmission,
}

/// Output document on success.
#[derive(Debug, Serialize)]
pub struct CanvasOutput {
    /// Whole-number grade as a string, the shape SpeedGrader expects.
    pub grade: String,
    /// Personalised feedback comment.
    pub comment: String,
    /// Same grade as a number.
    pub points: u32,
    /// Recounted submission word count.
    pub word_count: usize,
    /// Whether the minimum word count was met.
    pub meets_word_count: bool,
    /// Per-part coverage flags, when tracked.
    pub addressed_questions: std::collections::BTreeMap<String, bool>,
    /// Improvement suggestions from the grading reply.
    pub improvement_suggestions: Vec<String>,
    /// Discussion the submission was stored under.
    pub discussion_id: u32,
    /// Assigned submission id, when the grade was persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<u32>,
}

/// The adapter's error envelope; the external contract on any failure.
pub fn error_envelope(error: &str) -> Value {
    serde_json::json!({
        "error": error,
        "grade": "0",
        "comment": format!("Grading error: {error}. Please contact the instructor."),
        "points": 0,
        "word_count": 0,
        "meets_word_count": false,
    })
}

/// Parses and validates the input document.
pub fn parse_input(input: &str) -> Result<CanvasInput> {
    if input.trim().is_empty() {
        return Err(GraderError::Validation(
            "no input data received on stdin".to_string(),
        ));
    }

    // Probe for the required top-level blocks first so the error names the
    // missing field the way the contract documents it.
    let value: Value = serde_json::from_str(input)
        .map_err(|e| GraderError::Validation(format!("invalid JSON input: {e}")))?;
    for field in ["discussion", "submission"] {
        if value.get(field).is_none() {
            return Err(GraderError::Validation(format!(
                "missing required field: {field}"
            )));
        }
    }

    let parsed: CanvasInput = serde_json::from_value(value)
        .map_err(|e| GraderError::Validation(format!("invalid JSON input: {e}")))?;

    match parsed.submission.message.as_deref() {
        Some(message) if !message.trim().is_empty() => Ok(parsed),
        _ => Err(GraderError::Validation(
            "submission message cannot be empty".to_string(),
        )),
    }
}

/// Resolves the discussion a Canvas submission belongs to: explicit id
/// updates in place, otherwise duplicate detection by normalized question
/// text decides between reuse and creation.
fn resolve_discussion(grader: &SubmissionGrader, data: &CanvasDiscussion) -> Result<u32> {
    let prompt = data
        .prompt
        .clone()
        .or_else(|| data.message.clone())
        .unwrap_or_default();
    let points = data.points_possible.unwrap_or(DEFAULT_POINTS);
    let min_words = data.min_words.unwrap_or(DEFAULT_MIN_WORDS);
    let title = data
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| default_title(&prompt));

    if let Some(id) = data.id {
        let update = DiscussionUpdate {
            title: Some(title.clone()),
            points: Some(points),
            min_words: Some(min_words),
            question_content: Some(prompt.clone()),
        };
        match grader.discussions().update(id, update) {
            Ok(_) => return Ok(id),
            Err(GraderError::DiscussionNotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }

    grader
        .discussions()
        .find_or_create(&prompt, points, min_words, &title)
}

/// First 50 characters of the prompt, with an ellipsis when truncated.
fn default_title(prompt: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return "Canvas Discussion".to_string();
    }
    let title: String = trimmed.chars().take(50).collect();
    if trimmed.chars().count() > 50 {
        format!("{}...", title.trim_end())
    } else {
        title
    }
}

/// Builds the personalised comment: greeting, feedback, suggestions, and
/// a word-count note when the submission fell short.
fn format_comment(graded: &GradedSubmission, student_name: &str, min_words: usize) -> String {
    let first_name = student_name
        .split_whitespace()
        .next()
        .unwrap_or("Student");

    let mut parts = vec![format!("Hi {first_name},"), graded.feedback.clone()];

    if !graded.improvement_suggestions.is_empty() {
        let mut block = String::from("\nSuggestions for improvement:");
        for suggestion in &graded.improvement_suggestions {
            block.push_str(&format!("\n• {suggestion}"));
        }
        parts.push(block);
    }

    if !graded.meets_word_count {
        parts.push(format!(
            "\nNote: This submission has {} words but should have at least {min_words} words.",
            graded.word_count
        ));
    }

    parts.join("\n")
}

/// Runs the full adapter flow for one input document.
pub async fn run(input: &str, config: &GraderConfig) -> Result<CanvasOutput> {
    let parsed = parse_input(input)?;

    let grader = SubmissionGrader::new(config)?;
    run_with_grader(parsed, &grader).await
}

/// Adapter flow with an injected grader; tests use this with a stub
/// provider behind it.
pub async fn run_with_grader(
    parsed: CanvasInput,
    grader: &SubmissionGrader,
) -> Result<CanvasOutput> {
    let discussion_id = resolve_discussion(grader, &parsed.discussion)?;
    let min_words = grader.discussions().get(discussion_id)?.min_words;

    let message = parsed.submission.message.unwrap_or_default();
    let student_name = parsed
        .student
        .and_then(|s| s.name)
        .unwrap_or_default();

    let graded = grader
        .grade_text(
            discussion_id,
            message,
            (!student_name.is_empty()).then(|| student_name.clone()),
            true,
        )
        .await?;

    let score = graded.score as u32;
    Ok(CanvasOutput {
        grade: score.to_string(),
        comment: format_comment(&graded, &student_name, min_words),
        points: score,
        word_count: graded.word_count,
        meets_word_count: graded.meets_word_count,
        addressed_questions: graded.addressed_questions.clone(),
        improvement_suggestions: graded.improvement_suggestions.clone(),
        discussion_id,
        submission_id: graded.submission_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_submission_block_is_a_validation_error() {
        let err = parse_input(r#"{"discussion": {"prompt": "q"}}"#).unwrap_err();
        assert!(matches!(err, GraderError::Validation(ref m) if m.contains("submission")));
    }

    #[test]
    fn empty_submission_message_is_a_validation_error() {
        let input = r#"{"discussion": {"prompt": "q"}, "submission": {"message": "   "}}"#;
        let err = parse_input(input).unwrap_err();
        assert!(matches!(err, GraderError::Validation(ref m) if m.contains("empty")));
    }

    #[test]
    fn error_envelope_matches_the_contract() {
        let envelope = error_envelope("boom");
        assert_eq!(envelope["grade"], "0");
        assert_eq!(envelope["points"], 0);
        assert_eq!(envelope["word_count"], 0);
        assert_eq!(envelope["meets_word_count"], false);
        assert_eq!(envelope["error"], "boom");
    }

    #[test]
    fn default_title_truncates_long_prompts() {
        let prompt = "word ".repeat(30);
        let title = default_title(&prompt);
        assert!(title.ends_with("..."));
        assert!(title.chars().count() <= 53);

        assert_eq!(default_title("Short prompt"), "Short prompt");
        assert_eq!(default_title("  "), "Canvas Discussion");
    }

    #[test]
    fn comment_greets_by_first_name_and_notes_short_submissions() {
        let graded = GradedSubmission {
            score: 5.0,
            feedback: "Decent work.".to_string(),
            improvement_suggestions: vec!["Add sources".to_string()],
            addressed_questions: Default::default(),
            word_count: 80,
            meets_word_count: false,
            submission_id: None,
            created_at: chrono::Utc::now(),
        };
        let comment = format_comment(&graded, "Ada Lovelace", 100);
        assert!(comment.starts_with("Hi Ada,"));
        assert!(comment.contains("• Add sources"));
        assert!(comment.contains("80 words but should have at least 100 words"));
    }
}
