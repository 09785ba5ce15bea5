//! End-to-end grading flow against a canned provider.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use dg::{
    ai::Provider,
    config::{AIProviderConfig, GraderConfig, ProviderKind},
    error::{GraderError, Result},
    grader::SubmissionGrader,
};
use tempfile::TempDir;

/// Provider that replies with a fixed string, no network involved.
#[derive(Debug)]
struct StubProvider {
    reply: String,
}

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn grade(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
        assert!(!user_prompt.is_empty());
        Ok(self.reply.clone())
    }
}

fn test_config(base_dir: &Path) -> GraderConfig {
    GraderConfig {
        ai: AIProviderConfig {
            provider: ProviderKind::Anthropic,
            model: "test-model".to_string(),
            api_key: Some("test-key".to_string()),
            base_url: None,
            temperature: 0.0,
            max_tokens: 1024,
            timeout: Duration::from_secs(5),
        },
        base_dir: base_dir.to_path_buf(),
    }
}

fn grader_with_reply(dir: &TempDir, reply: &str) -> SubmissionGrader {
    SubmissionGrader::with_provider(
        &test_config(dir.path()),
        Box::new(StubProvider {
            reply: reply.to_string(),
        }),
    )
    .expect("build grader")
}

#[tokio::test]
async fn multi_part_question_end_to_end() {
    let dir = TempDir::new().unwrap();
    let reply = r#"{
        "score": 7,
        "feedback": "Strong coverage of both sides.",
        "improvement_suggestions": ["Quantify the tradeoffs"],
        "addressed_questions": {"benefits": true, "challenges": true},
        "word_count": 150
    }"#;
    let grader = grader_with_reply(&dir, reply);

    let did = grader
        .discussions()
        .create(
            "AI tooling",
            8,
            100,
            Some("Discuss benefits and challenges of X"),
        )
        .unwrap();

    let text = "word ".repeat(150);
    let graded = grader.grade_text(did, text, None, true).await.unwrap();

    assert!(graded.meets_word_count);
    assert_eq!(graded.word_count, 150);
    assert!((0.0..=8.0).contains(&graded.score));
    assert_eq!(graded.addressed_questions.get("benefits"), Some(&true));
    assert_eq!(graded.addressed_questions.get("challenges"), Some(&true));

    // The grade was persisted under the discussion.
    let sid = graded.submission_id.expect("assigned id");
    let stored = grader.submissions().get(did, sid).unwrap();
    assert_eq!(stored.grading.score, graded.score);
    assert_eq!(stored.submission.word_count, 150);
}

#[tokio::test]
async fn adversarial_scores_clamp_to_the_point_total() {
    let dir = TempDir::new().unwrap();
    let grader = grader_with_reply(&dir, r#"{"score": 999, "feedback": "sure"}"#);

    let did = grader
        .discussions()
        .create("t", 8, 10, Some("a question"))
        .unwrap();
    let graded = grader
        .grade_text(did, "some words here".to_string(), None, false)
        .await
        .unwrap();

    assert_eq!(graded.score, 8.0);
}

#[tokio::test]
async fn prose_reply_with_score_pattern_still_grades() {
    let dir = TempDir::new().unwrap();
    let grader = grader_with_reply(
        &dir,
        "Overall a solid effort. I would award 6 out of 8 for this response.",
    );

    let did = grader.discussions().create("t", 8, 10, Some("q")).unwrap();
    let graded = grader
        .grade_text(did, "short submission text".to_string(), None, false)
        .await
        .unwrap();

    assert_eq!(graded.score, 6.0);
    assert!(!graded.feedback.is_empty());
}

#[tokio::test]
async fn uncooperative_reply_surfaces_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let grader = grader_with_reply(&dir, "I cannot evaluate this submission.");

    let did = grader.discussions().create("t", 8, 10, Some("q")).unwrap();
    let err = grader
        .grade_text(did, "text".to_string(), None, false)
        .await
        .unwrap_err();

    assert!(matches!(err, GraderError::ResponseParse(_)));
}

#[tokio::test]
async fn grading_a_missing_discussion_fails_before_the_provider_call() {
    let dir = TempDir::new().unwrap();
    let grader = grader_with_reply(&dir, r#"{"score": 5, "feedback": "x"}"#);

    let err = grader
        .grade_text(404, "text".to_string(), None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, GraderError::DiscussionNotFound(404)));
}

#[tokio::test]
async fn no_save_leaves_the_store_empty() {
    let dir = TempDir::new().unwrap();
    let grader = grader_with_reply(&dir, r#"{"score": 5, "feedback": "x"}"#);

    let did = grader.discussions().create("t", 8, 10, Some("q")).unwrap();
    let graded = grader
        .grade_text(did, "text".to_string(), None, false)
        .await
        .unwrap();

    assert_eq!(graded.submission_id, None);
    assert!(grader.submissions().list(did).unwrap().is_empty());
}

#[tokio::test]
async fn word_count_comes_from_the_submission_not_the_model() {
    let dir = TempDir::new().unwrap();
    // Model claims a wildly wrong word count; it must be ignored.
    let grader = grader_with_reply(
        &dir,
        r#"{"score": 8, "feedback": "x", "word_count": 99999}"#,
    );

    let did = grader.discussions().create("t", 8, 100, Some("q")).unwrap();
    let graded = grader
        .grade_text(did, "only five words right here".to_string(), None, false)
        .await
        .unwrap();

    assert_eq!(graded.word_count, 5);
    assert!(!graded.meets_word_count);
}
