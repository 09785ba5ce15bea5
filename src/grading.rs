//! Grading criteria and the prompt builder.
//!
//! Prompt construction is a pure function of the submission and criteria;
//! no side effects, no network access.

use std::collections::BTreeMap;

use itertools::Itertools;
use typed_builder::TypedBuilder;

use crate::{discussion::Discussion, submission::Submission};

/// Instructor persona sent as the system prompt on every grading call.
pub const SYSTEM_PROMPT: &str = "You are an expert instructor grading computer science \
     discussions. Write feedback and grading reasoning directly to the student in a clear, \
     professional tone. Be concise but constructive. Grade fairly and provide specific feedback \
     without being overly verbose. Avoid using phrases like 'the student' and prefer to use \
     'you' instead. The feedback should be constructive and actionable, helping the student \
     understand how to improve.";

/// Keywords whose presence marks the "benefits" side of a multi-part
/// question.
pub const BENEFIT_KEYWORDS: &[&str] = &["benefit", "advantage"];

/// Keywords whose presence marks the "challenges" side of a multi-part
/// question.
pub const CHALLENGE_KEYWORDS: &[&str] = &["challenge", "disadvantage", "problem", "limitation"];

/// Question keywords that flag a software-engineering discussion, which
/// gets an extra emphasis line in the prompt.
const SOFTWARE_ENG_KEYWORDS: &[&str] = &[
    "software engineering",
    "software development",
    "coding practices",
    "programming paradigm",
];

/// Rubric handed to the model for one grading call.
///
/// Constructed fresh per call from [`Discussion`] data; never persisted.
#[derive(Debug, Clone, TypedBuilder)]
pub struct GradingCriteria {
    /// Bullet list of evaluation criteria embedded in the prompt.
    #[builder(default = default_criteria_list())]
    pub criteria_list: Vec<String>,
    /// Total points available.
    #[builder(default = 12)]
    pub total_points: u32,
    /// Minimum word count required of the submission.
    #[builder(default = 300)]
    pub min_words: usize,
    /// Tracked sub-question labels (label -> description). Empty disables
    /// per-part coverage reporting.
    #[builder(default)]
    pub question_keys: BTreeMap<String, String>,
}

/// Default evaluation criteria when a discussion specifies none.
fn default_criteria_list() -> Vec<String> {
    [
        "Understanding of the topic",
        "Clarity of explanation",
        "Use of specific examples",
        "Depth of analysis",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl GradingCriteria {
    /// Builds criteria from a discussion, detecting multi-part questions
    /// from its question text.
    pub fn from_discussion(discussion: &Discussion) -> Self {
        Self::builder()
            .total_points(discussion.points)
            .min_words(discussion.min_words)
            .question_keys(detect_question_keys(&discussion.question_content))
            .build()
    }
}

/// Detects a multi-part question: when the question mentions both a
/// benefits-type and a challenges-type keyword (case-insensitive substring
/// match), grading tracks the two labels `benefits` and `challenges`.
/// Anything richer is supplied by the caller through
/// [`GradingCriteria::question_keys`].
pub fn detect_question_keys(question: &str) -> BTreeMap<String, String> {
    let lowered = question.to_lowercase();
    let has = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));

    let mut keys = BTreeMap::new();
    if has(BENEFIT_KEYWORDS) && has(CHALLENGE_KEYWORDS) {
        keys.insert(
            "benefits".to_string(),
            "Benefits or advantages discussed".to_string(),
        );
        keys.insert(
            "challenges".to_string(),
            "Challenges or limitations discussed".to_string(),
        );
    }
    keys
}

/// Assembles the `(system_prompt, user_prompt)` pair for one grading call.
///
/// The point total, minimum word count, and precomputed word count are
/// embedded verbatim so the model can reference them in its output.
pub fn build_prompts(submission: &Submission, criteria: &GradingCriteria) -> (String, String) {
    let criteria_str = criteria
        .criteria_list
        .iter()
        .map(|c| format!("- {c}"))
        .join("\n");

    let addressed_block = if criteria.question_keys.is_empty() {
        String::new()
    } else {
        let entries = criteria
            .question_keys
            .iter()
            .map(|(key, description)| format!("        \"{key}\": true/false, // {description}"))
            .join("\n");
        format!("\n    \"addressed_questions\": {{\n{entries}\n    }},")
    };

    let lowered = submission.question_text.to_lowercase();
    let software_eng_note = if SOFTWARE_ENG_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        "Please pay special attention to the student's understanding of software engineering \
         concepts and their ability to apply these concepts to practical scenarios.\n\n"
    } else {
        ""
    };

    let user_prompt = format!(
        "Grade this student's discussion response:\n\n\
         Question:\n{question}\n\n\
         Student Submission:\n{text}\n\n\
         Please grade this submission out of {points} points.\n\
         Evaluate based on these criteria:\n{criteria_str}\n\n\
         The submission should be at least {min_words} words. Current word count: {word_count} \
         words.\n\
         Consider this in your grading.\n\n\
         {software_eng_note}\
         IMPORTANT GRADING REQUIREMENT: If you deduct any points (giving less than {points} \
         points), you MUST clearly justify the deduction in your feedback. Explain specifically \
         what was missing, insufficient, or incorrect that led to the point reduction. Be \
         constructive and specific about what the student needs to improve.\n\n\
         SCORING REQUIREMENT: Use only WHOLE NUMBER scores (e.g., 5, 6, 7, 8) - no decimal \
         points allowed (e.g., NOT 5.0, 6.5, 7.2).\n\n\
         Provide your response in JSON format like this:\n\
         {{\n\
         \x20   \"score\": [whole number score out of {points}],\n\
         \x20   \"feedback\": \"[1-2 paragraph summary of strengths and weaknesses, with clear \
         justification for any point deductions]\",\n\
         \x20   \"improvement_suggestions\": [\n\
         \x20       \"specific suggestion 1\",\n\
         \x20       \"specific suggestion 2\",\n\
         \x20       \"specific suggestion 3\"\n\
         \x20   ],{addressed_block}\n\
         \x20   \"word_count\": {word_count}\n\
         }}\n\n\
         ONLY return the JSON, no other text.",
        question = submission.question_text,
        text = submission.submission_text,
        points = criteria.total_points,
        min_words = criteria.min_words,
        word_count = submission.word_count,
    );

    (SYSTEM_PROMPT.to_string(), user_prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(question: &str, text: &str) -> Submission {
        Submission::new(1, text.to_string(), question.to_string())
    }

    #[test]
    fn detects_benefits_and_challenges_pairs() {
        let keys = detect_question_keys("Discuss the benefits and challenges of microservices.");
        assert!(keys.contains_key("benefits"));
        assert!(keys.contains_key("challenges"));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn detection_is_case_insensitive_and_accepts_synonyms() {
        let keys =
            detect_question_keys("What are the ADVANTAGES and limitations of static typing?");
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn one_sided_questions_are_not_multi_part() {
        assert!(detect_question_keys("Explain the benefits of unit testing.").is_empty());
        assert!(detect_question_keys("What problems does caching cause?").is_empty());
        assert!(detect_question_keys("Describe how a B-tree works.").is_empty());
    }

    #[test]
    fn prompt_embeds_points_min_words_and_word_count() {
        let criteria = GradingCriteria::builder()
            .total_points(8)
            .min_words(100)
            .build();
        let sub = submission("Explain ownership in Rust.", "a short answer");
        let (system, user) = build_prompts(&sub, &criteria);

        assert_eq!(system, SYSTEM_PROMPT);
        assert!(user.contains("out of 8 points"));
        assert!(user.contains("at least 100 words"));
        assert!(user.contains("Current word count: 3 words"));
        assert!(!user.contains("addressed_questions"));
    }

    #[test]
    fn multi_part_prompt_requests_coverage_labels() {
        let sub = submission("Discuss benefits and challenges of X", "some text here");
        let criteria = GradingCriteria::builder()
            .total_points(8)
            .min_words(100)
            .question_keys(detect_question_keys(&sub.question_text))
            .build();
        let (_, user) = build_prompts(&sub, &criteria);

        assert!(user.contains("\"addressed_questions\""));
        assert!(user.contains("\"benefits\": true/false"));
        assert!(user.contains("\"challenges\": true/false"));
    }

    #[test]
    fn prompt_is_deterministic() {
        let criteria = GradingCriteria::builder().build();
        let sub = submission("q", "text");
        assert_eq!(build_prompts(&sub, &criteria), build_prompts(&sub, &criteria));
    }
}
