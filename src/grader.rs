//! Ties the grading flow together: load discussion, build prompts, call
//! the provider, parse the reply, persist the result.
//!
//! Grading is strictly sequential; one call runs to completion before the
//! next begins. The provider's network call is the only suspension point.

use std::{
    io::{BufRead, Write},
    path::Path,
};

use colored::Colorize;
use tracing::info;

use crate::{
    ai::{Provider, create_provider},
    config::GraderConfig,
    discussion::{Discussion, DiscussionStore},
    error::Result,
    grading::{GradingCriteria, build_prompts},
    parse::parse_response,
    submission::{GradedSubmission, Submission, SubmissionStore},
    util::csv_escape,
};

/// Grades submissions against stored discussions and persists the results.
pub struct SubmissionGrader {
    /// Discussion metadata and question text.
    discussions: DiscussionStore,
    /// Graded submission records.
    submissions: SubmissionStore,
    /// Backend selected by the provider factory.
    provider: Box<dyn Provider>,
}

impl SubmissionGrader {
    /// Builds a grader from resolved configuration, selecting the provider
    /// through the factory. Fails before any network call when no usable
    /// credential exists.
    pub fn new(config: &GraderConfig) -> Result<Self> {
        let provider = create_provider(&config.ai)?;
        Self::with_provider(config, provider)
    }

    /// Builds a grader around an explicit provider. Tests use this to
    /// substitute a canned backend.
    pub fn with_provider(config: &GraderConfig, provider: Box<dyn Provider>) -> Result<Self> {
        Ok(Self {
            discussions: DiscussionStore::new(&config.base_dir)?,
            submissions: SubmissionStore::new(&config.base_dir),
            provider,
        })
    }

    /// The discussion repository this grader reads from.
    pub fn discussions(&self) -> &DiscussionStore {
        &self.discussions
    }

    /// The submission repository this grader writes to.
    pub fn submissions(&self) -> &SubmissionStore {
        &self.submissions
    }

    /// Grades a submission file against a discussion.
    pub async fn grade_file(
        &self,
        discussion_id: u32,
        path: &Path,
        save: bool,
    ) -> Result<GradedSubmission> {
        let discussion = self.discussions.get(discussion_id)?;
        let submission =
            Submission::from_file(discussion_id, path, discussion.question_content.clone())?;
        self.grade(&discussion, submission, save).await
    }

    /// Grades submission text directly (batch and adapter entry point).
    pub async fn grade_text(
        &self,
        discussion_id: u32,
        submission_text: String,
        student_name: Option<String>,
        save: bool,
    ) -> Result<GradedSubmission> {
        let discussion = self.discussions.get(discussion_id)?;
        let mut submission = Submission::new(
            discussion_id,
            submission_text,
            discussion.question_content.clone(),
        );
        submission.student_name = student_name;
        self.grade(&discussion, submission, save).await
    }

    /// Shared grading flow: prompts, provider call, parse, clamp, persist.
    async fn grade(
        &self,
        discussion: &Discussion,
        submission: Submission,
        save: bool,
    ) -> Result<GradedSubmission> {
        let criteria = GradingCriteria::from_discussion(discussion);
        let (system_prompt, user_prompt) = build_prompts(&submission, &criteria);

        let raw = self.provider.grade(&system_prompt, &user_prompt).await?;
        let mut graded = parse_response(&raw, &criteria, submission.word_count)?;

        if save {
            let id = self.submissions.save(discussion.id, &submission, &graded)?;
            graded.submission_id = Some(id);
        }

        info!(
            discussion = discussion.id,
            score = graded.score,
            provider = self.provider.name(),
            "graded submission"
        );
        Ok(graded)
    }

    /// Grades every `.txt`/`.md` file in a directory, strictly one at a
    /// time, pausing for Enter between items unless `pause` is off.
    /// Returns the number of submissions graded.
    pub async fn grade_directory(
        &self,
        discussion_id: u32,
        dir: &Path,
        save: bool,
        pause: bool,
    ) -> Result<usize> {
        let discussion = self.discussions.get(discussion_id)?;

        let mut files: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("txt") | Some("md")
                )
            })
            .collect();
        files.sort();

        let total = files.len();
        for (index, path) in files.iter().enumerate() {
            let graded = self.grade_file(discussion_id, path, save).await?;
            let label = path.display().to_string();
            println!(
                "{}",
                render_report(&graded, Some(&label), discussion.points)
            );

            if pause && index + 1 < total {
                print!("Press Enter to grade the next submission ({} of {total} done)... ", index + 1);
                std::io::stdout().flush()?;
                let mut line = String::new();
                std::io::stdin().lock().read_line(&mut line)?;
            }
        }

        Ok(total)
    }
}

/// Renders the human-readable grading report.
pub fn render_report(graded: &GradedSubmission, label: Option<&str>, total_points: u32) -> String {
    let mut lines = Vec::new();

    if let Some(label) = label {
        lines.push(format!("GRADING REPORT FOR: {label}"));
        lines.push("=".repeat(50));
        lines.push(String::new());
    }

    lines.push(format!(
        "{} {}/{}",
        "GRADE:".bold(),
        graded.score,
        total_points
    ));
    lines.push(String::new());
    lines.push(format!("WORD COUNT: {} words", graded.word_count));
    if !graded.meets_word_count {
        lines.push(
            "WARNING: Below minimum word count"
                .yellow()
                .to_string(),
        );
    }

    if !graded.addressed_questions.is_empty() {
        lines.push(String::new());
        lines.push("QUESTIONS ADDRESSED:".to_string());
        for (label, addressed) in &graded.addressed_questions {
            let mark = if *addressed { "✓" } else { "✗" };
            let display = label.replace('_', " ");
            lines.push(format!("- {display}: {mark}"));
        }
    }

    lines.push(String::new());
    lines.push("FEEDBACK:".to_string());
    lines.push(graded.feedback.clone());

    if !graded.improvement_suggestions.is_empty() {
        lines.push(String::new());
        lines.push("SUGGESTIONS FOR IMPROVEMENT:".to_string());
        for suggestion in &graded.improvement_suggestions {
            lines.push(format!("- {suggestion}"));
        }
    }

    if label.is_some() {
        lines.push("=".repeat(50));
    }

    lines.join("\n")
}

/// One-line CSV rendering of a grading result, with header.
pub fn render_grade_csv(graded: &GradedSubmission, label: &str, total_points: u32) -> String {
    let header = "file,score,out_of,word_count,meets_word_count,feedback";
    let row = [
        csv_escape(label),
        graded.score.to_string(),
        total_points.to_string(),
        graded.word_count.to_string(),
        graded.meets_word_count.to_string(),
        csv_escape(&graded.feedback),
    ]
    .join(",");
    format!("{header}\n{row}")
}
