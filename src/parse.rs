//! Multi-strategy parsing of provider replies into [`GradedSubmission`]s.
//!
//! Strategies run in order of strictness, each a pure attempt: whole-text
//! JSON, first balanced JSON object embedded anywhere in the text, then
//! heuristic extraction of a score-like integer. The caller only sees
//! [`GraderError::ResponseParse`] when all three produced no usable score.

use std::{collections::BTreeMap, sync::OnceLock};

use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::{
    error::{GraderError, Result},
    grading::GradingCriteria,
    submission::GradedSubmission,
};

/// Fields recovered from a structured (JSON) reply. Any of them may be
/// missing; a missing score sends us to the heuristic strategy.
#[derive(Debug, Default)]
struct ParsedFields {
    /// Score, when the reply carried one.
    score: Option<f64>,
    /// Feedback text, when present.
    feedback: Option<String>,
    /// Improvement suggestions, possibly empty.
    suggestions: Vec<String>,
    /// Raw per-part coverage claims from the reply.
    addressed: BTreeMap<String, bool>,
}

/// Parses a provider reply against the criteria it was graded under.
///
/// `word_count` is the count derived from the submission text itself; the
/// model's self-reported count is never consulted, so a confused or
/// adversarial reply cannot misreport word-count compliance. The score is
/// clamped into `[0, total_points]` rather than rejected.
pub fn parse_response(
    raw: &str,
    criteria: &GradingCriteria,
    word_count: usize,
) -> Result<GradedSubmission> {
    let structured = strict_json(raw)
        .or_else(|| embedded_json(raw))
        .map(|value| fields_from_value(&value));

    let (score, fields) = match structured {
        Some(fields) if fields.score.is_some() => {
            let score = fields.score.unwrap_or_default();
            (score, fields)
        }
        other => {
            // Structured parsing gave no score; fall back to a score-like
            // pattern anywhere in the raw text. Feedback from a partial
            // structured parse is kept, per-part data is not.
            debug!("structured parse yielded no score, trying heuristic extraction");
            let score = heuristic_score(raw).ok_or_else(|| {
                GraderError::ResponseParse(
                    "no JSON object and no score-like pattern in the model reply".to_string(),
                )
            })?;
            let feedback = other.and_then(|f| f.feedback);
            (
                score,
                ParsedFields {
                    score: Some(score),
                    feedback,
                    ..ParsedFields::default()
                },
            )
        }
    };

    let total = f64::from(criteria.total_points);
    let score = score.clamp(0.0, total);

    // Coverage flags are only meaningful for multi-part questions; keep the
    // tracked labels and default anything the model omitted to false.
    let addressed_questions: BTreeMap<String, bool> = criteria
        .question_keys
        .keys()
        .map(|key| (key.clone(), fields.addressed.get(key).copied().unwrap_or(false)))
        .collect();

    let feedback = match fields.feedback {
        Some(f) if !f.trim().is_empty() => f,
        _ => raw.trim().to_string(),
    };

    Ok(GradedSubmission {
        score,
        feedback,
        improvement_suggestions: fields.suggestions,
        addressed_questions,
        word_count,
        meets_word_count: word_count >= criteria.min_words,
        submission_id: None,
        created_at: Utc::now(),
    })
}

/// Strategy 1: the whole trimmed reply is a single JSON object.
fn strict_json(raw: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(raw.trim()).ok()?;
    value.is_object().then_some(value)
}

/// Strategy 2: first balanced `{..}` object embedded anywhere in the text,
/// found by a string- and escape-aware brace scan. Handles replies wrapped
/// in markdown code fences or prose.
fn embedded_json(raw: &str) -> Option<Value> {
    let candidate = first_json_object(raw)?;
    let value: Value = serde_json::from_str(candidate).ok()?;
    value.is_object().then_some(value)
}

/// Returns the first balanced JSON object substring, if any.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in text.as_bytes().iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Pulls the known fields out of a parsed JSON object.
fn fields_from_value(value: &Value) -> ParsedFields {
    let score = value.get("score").and_then(score_as_f64);

    let feedback = value
        .get("feedback")
        .and_then(Value::as_str)
        .map(str::to_string);

    let suggestions = value
        .get("improvement_suggestions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let addressed = value
        .get("addressed_questions")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_bool().map(|b| (k.clone(), b)))
                .collect()
        })
        .unwrap_or_default();

    ParsedFields {
        score,
        feedback,
        suggestions,
        addressed,
    }
}

/// Accepts a numeric score or a numeric string ("7").
fn score_as_f64(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// `"score": 7` fragments surviving in otherwise-broken JSON.
fn score_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""score"\s*:\s*"?(\d+(?:\.\d+)?)"?"#).expect("score key pattern")
    })
}

/// `7/8` or `7 out of 8` anywhere in prose.
fn score_out_of_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(?:/|out\s+of)\s*\d+(?:\.\d+)?\b")
            .expect("score out-of pattern")
    })
}

/// `score ... 7` with a short gap, the loosest accepted shape.
fn score_near_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)score\D{0,10}(\d+(?:\.\d+)?)").expect("score near pattern"))
}

/// Strategy 3: first integer matching a score-like pattern in the raw text.
fn heuristic_score(raw: &str) -> Option<f64> {
    for re in [score_key_re(), score_out_of_re(), score_near_re()] {
        if let Some(caps) = re.captures(raw)
            && let Some(m) = caps.get(1)
            && let Ok(score) = m.as_str().parse::<f64>()
        {
            return Some(score);
        }
    }
    None
}
