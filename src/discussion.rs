//! Discussions and the file-backed store that persists them.
//!
//! One directory per discussion (`discussion_{id}`) holding `metadata.json`,
//! the question file, and a `submissions` subdirectory. Identifier
//! assignment scans existing directories and takes the next integer;
//! single-writer, single-process operation is assumed throughout.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use glob::glob;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{GraderError, Result},
    util::normalize_question,
};

/// Name of the per-discussion metadata file.
const METADATA_FILE: &str = "metadata.json";

/// An instructor-defined question with point value and word-count
/// requirement; the unit submissions are graded against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discussion {
    /// Unique, immutable identifier.
    pub id: u32,
    /// Short human-readable title.
    pub title: String,
    /// Total points available.
    pub points: u32,
    /// Minimum word count required of submissions.
    pub min_words: usize,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every successful update.
    pub updated_at: DateTime<Utc>,
    /// Name of the question file inside the discussion directory.
    pub question_file: String,
    /// Question text; loaded from the question file, not serialized into
    /// metadata.
    #[serde(skip)]
    pub question_content: String,
}

/// Fields that `update` may change. Unset fields retain their prior value.
#[derive(Debug, Clone, Default)]
pub struct DiscussionUpdate {
    /// New title, if any.
    pub title: Option<String>,
    /// New point total, if any.
    pub points: Option<u32>,
    /// New minimum word count, if any.
    pub min_words: Option<usize>,
    /// Replacement question text, if any.
    pub question_content: Option<String>,
}

impl DiscussionUpdate {
    /// True when the update carries no changes at all.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.points.is_none()
            && self.min_words.is_none()
            && self.question_content.is_none()
    }
}

/// File-backed repository of discussions.
pub struct DiscussionStore {
    /// Root directory holding one `discussion_{id}` directory per record.
    base_dir: PathBuf,
}

impl DiscussionStore {
    /// Opens (and creates if needed) a store rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Root directory of the store.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory that holds (or would hold) discussion `id`.
    pub fn discussion_dir(&self, id: u32) -> PathBuf {
        self.base_dir.join(format!("discussion_{id}"))
    }

    /// Directory that holds the submissions of discussion `id`.
    pub fn submissions_dir(&self, id: u32) -> PathBuf {
        self.discussion_dir(id).join("submissions")
    }

    /// Creates a new discussion and returns its assigned identifier.
    pub fn create(
        &self,
        title: &str,
        points: u32,
        min_words: usize,
        question_content: Option<&str>,
    ) -> Result<u32> {
        let id = self.next_id()?;
        let dir = self.discussion_dir(id);
        std::fs::create_dir_all(dir.join("submissions"))?;

        let now = Utc::now();
        let discussion = Discussion {
            id,
            title: title.to_string(),
            points,
            min_words,
            created_at: now,
            updated_at: now,
            question_file: "question.md".to_string(),
            question_content: String::new(),
        };

        std::fs::write(
            dir.join(METADATA_FILE),
            serde_json::to_string_pretty(&discussion)?,
        )?;
        // Always materialise the question file, empty when no text was given.
        std::fs::write(
            dir.join(&discussion.question_file),
            question_content.unwrap_or_default(),
        )?;

        debug!(id, title, "created discussion");
        Ok(id)
    }

    /// Loads a discussion, including its question text.
    pub fn get(&self, id: u32) -> Result<Discussion> {
        let dir = self.discussion_dir(id);
        if !dir.exists() {
            return Err(GraderError::DiscussionNotFound(id));
        }

        let metadata = std::fs::read_to_string(dir.join(METADATA_FILE))
            .map_err(|_| GraderError::DiscussionNotFound(id))?;
        let mut discussion: Discussion = serde_json::from_str(&metadata)?;

        let question_path = dir.join(&discussion.question_file);
        if question_path.exists() {
            discussion.question_content = crate::util::read_text(&question_path)?;
        }

        Ok(discussion)
    }

    /// Lists all discussions, ordered by identifier ascending. Directories
    /// with missing or malformed metadata are skipped.
    pub fn list(&self) -> Result<Vec<Discussion>> {
        let mut discussions = Vec::new();
        for id in self.scan_ids()? {
            match self.read_metadata(id) {
                Ok(d) => discussions.push(d),
                Err(_) => continue,
            }
        }
        discussions.sort_by_key(|d| d.id);
        Ok(discussions)
    }

    /// Applies the provided fields to an existing discussion. `updated_at`
    /// is refreshed on any successful update, question-only edits included.
    pub fn update(&self, id: u32, update: DiscussionUpdate) -> Result<Discussion> {
        let dir = self.discussion_dir(id);
        let mut discussion = self.get(id)?;

        if update.is_empty() {
            return Ok(discussion);
        }

        if let Some(title) = update.title {
            discussion.title = title;
        }
        if let Some(points) = update.points {
            discussion.points = points;
        }
        if let Some(min_words) = update.min_words {
            discussion.min_words = min_words;
        }
        discussion.updated_at = Utc::now();

        std::fs::write(
            dir.join(METADATA_FILE),
            serde_json::to_string_pretty(&discussion)?,
        )?;

        if let Some(question) = update.question_content {
            std::fs::write(dir.join(&discussion.question_file), &question)?;
        }

        self.get(id)
    }

    /// Returns the id of an existing discussion whose question text matches
    /// `question` under whitespace-collapsed, case-insensitive comparison,
    /// creating a new discussion otherwise.
    pub fn find_or_create(
        &self,
        question: &str,
        points: u32,
        min_words: usize,
        title: &str,
    ) -> Result<u32> {
        let wanted = normalize_question(question);
        for summary in self.list()? {
            let Ok(existing) = self.get(summary.id) else {
                continue;
            };
            if normalize_question(&existing.question_content) == wanted {
                return Ok(existing.id);
            }
        }
        self.create(title, points, min_words, Some(question))
    }

    /// Reads metadata only, leaving the question text unloaded.
    fn read_metadata(&self, id: u32) -> Result<Discussion> {
        let path = self.discussion_dir(id).join(METADATA_FILE);
        let metadata =
            std::fs::read_to_string(path).map_err(|_| GraderError::DiscussionNotFound(id))?;
        Ok(serde_json::from_str(&metadata)?)
    }

    /// Identifiers of every discussion directory currently on disk.
    fn scan_ids(&self) -> Result<Vec<u32>> {
        let pattern = self.base_dir.join("discussion_*");
        let pattern = pattern.to_string_lossy();
        let mut ids = Vec::new();
        for entry in glob(&pattern).map_err(|e| GraderError::Validation(e.to_string()))? {
            let Ok(path) = entry else { continue };
            if !path.is_dir() {
                continue;
            }
            if let Some(id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("discussion_"))
                .and_then(|n| n.parse::<u32>().ok())
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Next unused identifier: max existing plus one, 1 when empty.
    fn next_id(&self) -> Result<u32> {
        Ok(self.scan_ids()?.into_iter().max().map_or(1, |max| max + 1))
    }
}
