//! Adapter contract tests: JSON in, JSON out, error envelope on failure.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use dg::{
    ai::Provider,
    canvas::{self, error_envelope},
    config::{AIProviderConfig, GraderConfig, ProviderKind},
    error::Result,
    grader::SubmissionGrader,
};
use tempfile::TempDir;

#[derive(Debug)]
struct StubProvider {
    reply: String,
}

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn grade(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
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

fn canvas_input(words: usize) -> String {
    let message = "word ".repeat(words);
    serde_json::json!({
        "discussion": {
            "prompt": "Discuss benefits and challenges of X",
            "points_possible": 8,
            "min_words": 100,
            "title": "Benefits and challenges"
        },
        "student": {"name": "Grace Hopper"},
        "submission": {"message": message}
    })
    .to_string()
}

#[tokio::test]
async fn full_adapter_flow_produces_the_contract_output() {
    let dir = TempDir::new().unwrap();
    let reply = r#"{
        "score": 7,
        "feedback": "Both sides are well covered.",
        "improvement_suggestions": ["Add a concrete case study"],
        "addressed_questions": {"benefits": true, "challenges": false}
    }"#;
    let grader = grader_with_reply(&dir, reply);

    let parsed = canvas::parse_input(&canvas_input(150)).unwrap();
    let output = canvas::run_with_grader(parsed, &grader).await.unwrap();

    assert_eq!(output.grade, "7");
    assert_eq!(output.points, 7);
    assert_eq!(output.word_count, 150);
    assert!(output.meets_word_count);
    assert!(output.comment.starts_with("Hi Grace,"));
    assert!(output.comment.contains("• Add a concrete case study"));
    assert_eq!(output.addressed_questions.get("benefits"), Some(&true));
    assert_eq!(output.addressed_questions.get("challenges"), Some(&false));
    assert!(output.submission_id.is_some());

    // The submission landed in the standard storage layout.
    let records = grader.submissions().list(output.discussion_id).unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn repeated_submissions_reuse_the_same_discussion() {
    let dir = TempDir::new().unwrap();
    let reply = r#"{"score": 6, "feedback": "ok"}"#;
    let grader = grader_with_reply(&dir, reply);

    let first = canvas::run_with_grader(canvas::parse_input(&canvas_input(120)).unwrap(), &grader)
        .await
        .unwrap();
    let second = canvas::run_with_grader(canvas::parse_input(&canvas_input(130)).unwrap(), &grader)
        .await
        .unwrap();

    assert_eq!(first.discussion_id, second.discussion_id);
    assert_eq!(grader.discussions().list().unwrap().len(), 1);
    assert_eq!(
        grader.submissions().list(first.discussion_id).unwrap().len(),
        2
    );
}

#[tokio::test]
async fn short_submission_gets_the_word_count_note() {
    let dir = TempDir::new().unwrap();
    let reply = r#"{"score": 4, "feedback": "Thin answer."}"#;
    let grader = grader_with_reply(&dir, reply);

    let parsed = canvas::parse_input(&canvas_input(60)).unwrap();
    let output = canvas::run_with_grader(parsed, &grader).await.unwrap();

    assert!(!output.meets_word_count);
    assert!(output
        .comment
        .contains("60 words but should have at least 100 words"));
}

#[test]
fn missing_submission_message_yields_the_error_envelope() {
    let input = r#"{"discussion": {"prompt": "q"}, "submission": {}}"#;
    let err = canvas::parse_input(input).unwrap_err();

    let envelope = error_envelope(&err.to_string());
    assert_eq!(envelope["grade"], "0");
    assert_eq!(envelope["points"], 0);
    assert_eq!(envelope["word_count"], 0);
    assert_eq!(envelope["meets_word_count"], false);
    assert!(
        envelope["error"]
            .as_str()
            .is_some_and(|e| !e.is_empty())
    );
}

#[test]
fn missing_discussion_block_is_rejected_by_name() {
    let err = canvas::parse_input(r#"{"submission": {"message": "text"}}"#).unwrap_err();
    assert!(err.to_string().contains("discussion"));
}
