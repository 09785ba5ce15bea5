//! Submissions, grading results, and the file-backed store that pairs them.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use glob::glob;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{GraderError, Result},
    util::{count_words, read_text},
};

/// A student's text response to a discussion question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// Parent discussion identifier.
    pub discussion_id: u32,
    /// Raw submission text.
    pub submission_text: String,
    /// Question the submission answers, populated when the discussion is
    /// loaded.
    #[serde(default)]
    pub question_text: String,
    /// Student name, when the caller knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    /// When the submission was received.
    pub submitted_at: DateTime<Utc>,
    /// Derived word count, recomputed whenever the text is set.
    pub word_count: usize,
    /// Identifier within the discussion, assigned at save time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
}

impl Submission {
    /// Builds a submission from raw text, computing its word count.
    pub fn new(discussion_id: u32, submission_text: String, question_text: String) -> Self {
        let word_count = count_words(&submission_text);
        Self {
            discussion_id,
            submission_text,
            question_text,
            student_name: None,
            submitted_at: Utc::now(),
            word_count,
            id: None,
        }
    }

    /// Builds a submission by reading `path`.
    pub fn from_file(discussion_id: u32, path: &Path, question_text: String) -> Result<Self> {
        let text = read_text(path)?;
        Ok(Self::new(discussion_id, text, question_text))
    }
}

/// The AI-produced evaluation of a submission.
///
/// Produced once per grading call; a later grading call appends a new
/// record rather than mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradedSubmission {
    /// Awarded score, clamped into `[0, total_points]`.
    pub score: f64,
    /// Feedback addressed to the student. Never empty: falls back to the
    /// provider's raw reply when structured parsing partially failed.
    pub feedback: String,
    /// Concrete suggestions extracted from the reply.
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
    /// Per-part coverage flags; populated only for multi-part questions.
    #[serde(default)]
    pub addressed_questions: BTreeMap<String, bool>,
    /// Word count derived from the submission text itself, never taken
    /// from model output.
    pub word_count: usize,
    /// Whether `word_count` meets the discussion's minimum.
    pub meets_word_count: bool,
    /// Identifier assigned when the grade was persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<u32>,
    /// When the grade was produced.
    pub created_at: DateTime<Utc>,
}

/// On-disk shape of one graded submission file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSubmission {
    /// Identifier within the discussion.
    pub submission_id: u32,
    /// Parent discussion identifier.
    pub discussion_id: u32,
    /// The submission as received.
    pub submission: Submission,
    /// The grading result attached to it.
    pub grading: GradedSubmission,
    /// When this record was written.
    pub created_at: DateTime<Utc>,
}

/// File-backed repository of submissions, scoped under their discussion
/// directory. Requires the parent discussion to exist before any write.
pub struct SubmissionStore {
    /// Same root directory the [`crate::discussion::DiscussionStore`] uses.
    base_dir: PathBuf,
}

impl SubmissionStore {
    /// Opens a store rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Directory holding the submissions of discussion `discussion_id`.
    fn submissions_dir(&self, discussion_id: u32) -> PathBuf {
        self.base_dir
            .join(format!("discussion_{discussion_id}"))
            .join("submissions")
    }

    /// Persists a submission with its grading result and returns the
    /// assigned submission identifier.
    pub fn save(
        &self,
        discussion_id: u32,
        submission: &Submission,
        grading: &GradedSubmission,
    ) -> Result<u32> {
        // Parent existence check comes first; a submission never creates
        // its own discussion directory.
        let discussion_dir = self.base_dir.join(format!("discussion_{discussion_id}"));
        if !discussion_dir.exists() {
            return Err(GraderError::DiscussionNotFound(discussion_id));
        }

        let dir = self.submissions_dir(discussion_id);
        std::fs::create_dir_all(&dir)?;

        let submission_id = self.next_id(discussion_id)?;
        let mut submission = submission.clone();
        submission.id = Some(submission_id);
        let mut grading = grading.clone();
        grading.submission_id = Some(submission_id);

        let record = StoredSubmission {
            submission_id,
            discussion_id,
            submission,
            grading,
            created_at: Utc::now(),
        };

        std::fs::write(
            dir.join(format!("submission_{submission_id}.json")),
            serde_json::to_string_pretty(&record)?,
        )?;

        debug!(discussion_id, submission_id, "saved graded submission");
        Ok(submission_id)
    }

    /// Loads one stored submission.
    pub fn get(&self, discussion_id: u32, submission_id: u32) -> Result<StoredSubmission> {
        let path = self
            .submissions_dir(discussion_id)
            .join(format!("submission_{submission_id}.json"));
        let text = std::fs::read_to_string(path).map_err(|_| GraderError::SubmissionNotFound {
            discussion: discussion_id,
            submission: submission_id,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Lists every stored submission of a discussion, ordered by submission
    /// identifier ascending. Unreadable files are skipped.
    pub fn list(&self, discussion_id: u32) -> Result<Vec<StoredSubmission>> {
        let dir = self.submissions_dir(discussion_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for id in self.scan_ids(discussion_id)? {
            match self.get(discussion_id, id) {
                Ok(record) => records.push(record),
                Err(_) => continue,
            }
        }
        records.sort_by_key(|r| r.submission_id);
        Ok(records)
    }

    /// Identifiers of every submission file under a discussion.
    fn scan_ids(&self, discussion_id: u32) -> Result<Vec<u32>> {
        let pattern = self.submissions_dir(discussion_id).join("submission_*.json");
        let pattern = pattern.to_string_lossy();
        let mut ids = Vec::new();
        for entry in glob(&pattern).map_err(|e| GraderError::Validation(e.to_string()))? {
            let Ok(path) = entry else { continue };
            if let Some(id) = path
                .file_stem()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("submission_"))
                .and_then(|n| n.parse::<u32>().ok())
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Next submission identifier within a discussion: max existing plus
    /// one, 1 when empty.
    fn next_id(&self, discussion_id: u32) -> Result<u32> {
        Ok(self
            .scan_ids(discussion_id)?
            .into_iter()
            .max()
            .map_or(1, |max| max + 1))
    }
}
