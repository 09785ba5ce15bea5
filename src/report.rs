//! Statistics and synthesized reports over a discussion's graded
//! submissions.

use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tabled::{Table, Tabled, settings::Style};
use tracing::warn;

use crate::{
    ai::Provider,
    discussion::DiscussionStore,
    error::{GraderError, Result},
    submission::{StoredSubmission, SubmissionStore},
    util::csv_escape,
};

/// Instructions sent ahead of the submissions being synthesized.
const SYNTHESIS_PROMPT: &str = "You are synthesizing student responses to create a comprehensive \
     instructor response. Extract key insights, identify common themes, and highlight unique \
     perspectives.";

/// Aggregate statistics for a set of graded submissions.
#[derive(Debug, Clone, Serialize)]
pub struct ReportStats {
    /// Number of submissions included.
    pub total_submissions: usize,
    /// Mean score.
    pub avg_score: f64,
    /// Lowest score.
    pub min_score: f64,
    /// Highest score.
    pub max_score: f64,
    /// Mean word count.
    pub avg_word_count: usize,
}

impl ReportStats {
    /// Computes statistics over the given records. All zeroes when empty.
    pub fn compute(records: &[StoredSubmission]) -> Self {
        if records.is_empty() {
            return Self {
                total_submissions: 0,
                avg_score: 0.0,
                min_score: 0.0,
                max_score: 0.0,
                avg_word_count: 0,
            };
        }

        let scores: Vec<f64> = records.iter().map(|r| r.grading.score).collect();
        let words: usize = records.iter().map(|r| r.grading.word_count).sum();

        Self {
            total_submissions: records.len(),
            avg_score: scores.iter().sum::<f64>() / scores.len() as f64,
            min_score: scores.iter().copied().fold(f64::INFINITY, f64::min),
            max_score: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            avg_word_count: words / records.len(),
        }
    }
}

/// Score-range filter applied before synthesis.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreFilter {
    /// Keep submissions scoring at least this.
    pub min_score: Option<f64>,
    /// Keep submissions scoring at most this.
    pub max_score: Option<f64>,
}

impl ScoreFilter {
    /// Whether a record passes the filter.
    fn accepts(&self, record: &StoredSubmission) -> bool {
        self.min_score.is_none_or(|min| record.grading.score >= min)
            && self.max_score.is_none_or(|max| record.grading.score <= max)
    }
}

/// AI-synthesized overview of the filtered submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Synthesis {
    /// Comprehensive summary of all responses.
    summary: String,
    /// Common themes across responses.
    #[serde(default)]
    key_themes: Vec<String>,
    /// Perspectives that stood out.
    #[serde(default)]
    unique_insights: Vec<String>,
}

/// A synthesized report for one discussion.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesizedReport {
    /// Discussion the report covers.
    pub discussion_id: u32,
    /// Summary text.
    pub summary: String,
    /// Common themes.
    pub key_themes: Vec<String>,
    /// Standout perspectives.
    pub unique_insights: Vec<String>,
    /// Aggregate statistics of the included submissions.
    pub statistics: ReportStats,
    /// Submission ids included after filtering.
    pub included_submissions: Vec<u32>,
}

/// Builds statistics and synthesized reports for stored discussions.
pub struct ReportGenerator<'a> {
    /// Discussion metadata source.
    discussions: &'a DiscussionStore,
    /// Graded submission source.
    submissions: &'a SubmissionStore,
}

impl<'a> ReportGenerator<'a> {
    /// Creates a generator over the given stores.
    pub fn new(discussions: &'a DiscussionStore, submissions: &'a SubmissionStore) -> Self {
        Self {
            discussions,
            submissions,
        }
    }

    /// Statistics for every stored submission of a discussion.
    pub fn stats(&self, discussion_id: u32) -> Result<ReportStats> {
        self.discussions.get(discussion_id)?;
        let records = self.submissions.list(discussion_id)?;
        Ok(ReportStats::compute(&records))
    }

    /// Generates a synthesized report. The synthesis prompt goes through
    /// the same provider abstraction as grading; on any provider or parse
    /// failure the report degrades to a deterministic stats-only summary
    /// instead of erroring.
    pub async fn generate(
        &self,
        discussion_id: u32,
        filter: ScoreFilter,
        provider: &dyn Provider,
    ) -> Result<SynthesizedReport> {
        let discussion = self.discussions.get(discussion_id)?;
        let records = self.submissions.list(discussion_id)?;
        if records.is_empty() {
            return Err(GraderError::Validation(format!(
                "no submissions found for discussion {discussion_id}"
            )));
        }

        let filtered: Vec<StoredSubmission> =
            records.into_iter().filter(|r| filter.accepts(r)).collect();
        if filtered.is_empty() {
            return Err(GraderError::Validation(
                "no submissions match the specified filters".to_string(),
            ));
        }

        let statistics = ReportStats::compute(&filtered);

        let digest = filtered
            .iter()
            .enumerate()
            .map(|(i, r)| {
                format!(
                    "Submission {} (Score: {}/{}, {} words):\nFeedback: {}",
                    i + 1,
                    r.grading.score,
                    discussion.points,
                    r.grading.word_count,
                    r.grading.feedback
                )
            })
            .join("\n\n");

        let user_prompt = format!(
            "Discussion Question: {}\n\n\
             Here are the student submissions to synthesize:\n\n{digest}\n\n\
             Please provide a synthesis in JSON format with the following structure:\n\
             {{\n\
             \x20   \"summary\": \"A comprehensive summary of all responses\",\n\
             \x20   \"key_themes\": [\"theme1\", \"theme2\", \"theme3\"],\n\
             \x20   \"unique_insights\": [\"insight1\", \"insight2\", \"insight3\"]\n\
             }}\n\n\
             Focus on:\n\
             1. Common themes and patterns across responses\n\
             2. Unique perspectives that add value\n\
             3. Quality of reasoning and evidence\n\
             4. Areas where students showed deep understanding",
            discussion.question_content
        );

        let synthesis = match provider.grade(SYNTHESIS_PROMPT, &user_prompt).await {
            Ok(raw) => parse_synthesis(&raw).unwrap_or_else(|| {
                warn!(discussion_id, "synthesis reply was not parseable, using fallback");
                fallback_synthesis(&statistics)
            }),
            Err(e) => {
                warn!(discussion_id, error = %e, "synthesis call failed, using fallback");
                fallback_synthesis(&statistics)
            }
        };

        Ok(SynthesizedReport {
            discussion_id,
            summary: synthesis.summary,
            key_themes: synthesis.key_themes,
            unique_insights: synthesis.unique_insights,
            statistics,
            included_submissions: filtered.iter().map(|r| r.submission_id).collect(),
        })
    }
}

/// Extracts the synthesis JSON, stripping code fences when present.
fn parse_synthesis(raw: &str) -> Option<Synthesis> {
    let trimmed = raw.trim();
    if let Ok(s) = serde_json::from_str::<Synthesis>(trimmed) {
        return Some(s);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    serde_json::from_str(&trimmed[start..=end]).ok()
}

/// Deterministic stand-in when the provider cannot synthesize.
fn fallback_synthesis(stats: &ReportStats) -> Synthesis {
    Synthesis {
        summary: format!(
            "Synthesis of {} submissions. Average score: {:.1}",
            stats.total_submissions, stats.avg_score
        ),
        key_themes: Vec::new(),
        unique_insights: Vec::new(),
    }
}

/// Row shape for the stats table.
#[derive(Tabled)]
struct StatsRow {
    /// Statistic name.
    #[tabled(rename = "Statistic")]
    name: &'static str,
    /// Rendered value.
    #[tabled(rename = "Value")]
    value: String,
}

/// Renders statistics as a two-column table.
pub fn render_stats_table(stats: &ReportStats) -> String {
    let rows = vec![
        StatsRow {
            name: "Submissions",
            value: stats.total_submissions.to_string(),
        },
        StatsRow {
            name: "Average score",
            value: format!("{:.2}", stats.avg_score),
        },
        StatsRow {
            name: "Min score",
            value: format!("{:.2}", stats.min_score),
        },
        StatsRow {
            name: "Max score",
            value: format!("{:.2}", stats.max_score),
        },
        StatsRow {
            name: "Average word count",
            value: stats.avg_word_count.to_string(),
        },
    ];
    Table::new(rows).with(Style::modern()).to_string()
}

/// Renders a synthesized report in the requested format.
pub fn render_synthesized(report: &SynthesizedReport, format: crate::OutputFormat) -> Result<String> {
    use crate::OutputFormat;

    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
        OutputFormat::Csv => {
            let mut out = String::from("discussion_id,submissions,avg_score,min_score,max_score,avg_word_count,summary\n");
            out.push_str(
                &[
                    report.discussion_id.to_string(),
                    report.statistics.total_submissions.to_string(),
                    format!("{:.2}", report.statistics.avg_score),
                    format!("{:.2}", report.statistics.min_score),
                    format!("{:.2}", report.statistics.max_score),
                    report.statistics.avg_word_count.to_string(),
                    csv_escape(&report.summary),
                ]
                .join(","),
            );
            out
        }
        OutputFormat::Table => render_stats_table(&report.statistics),
        OutputFormat::Text => {
            let mut lines = vec![
                format!("SYNTHESIZED REPORT - Discussion {}", report.discussion_id),
                "=".repeat(50),
                String::new(),
                "SUMMARY:".to_string(),
                report.summary.clone(),
            ];
            if !report.key_themes.is_empty() {
                lines.push(String::new());
                lines.push("KEY THEMES:".to_string());
                lines.extend(report.key_themes.iter().map(|t| format!("- {t}")));
            }
            if !report.unique_insights.is_empty() {
                lines.push(String::new());
                lines.push("UNIQUE INSIGHTS:".to_string());
                lines.extend(report.unique_insights.iter().map(|i| format!("- {i}")));
            }
            lines.push(String::new());
            lines.push(format!(
                "STATISTICS: {} submissions, avg {:.2}, min {:.2}, max {:.2}, avg words {}",
                report.statistics.total_submissions,
                report.statistics.avg_score,
                report.statistics.min_score,
                report.statistics.max_score,
                report.statistics.avg_word_count
            ));
            lines.join("\n")
        }
    })
}

/// Renders a report and writes it to `path`, creating parent directories.
pub fn export_report(
    report: &SynthesizedReport,
    format: crate::OutputFormat,
    path: &Path,
) -> Result<()> {
    let content = render_synthesized(report, format)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_over_empty_set_are_zero() {
        let stats = ReportStats::compute(&[]);
        assert_eq!(stats.total_submissions, 0);
        assert_eq!(stats.avg_score, 0.0);
    }

    #[test]
    fn synthesis_json_with_code_fence_parses() {
        let raw = "```json\n{\"summary\": \"s\", \"key_themes\": [\"a\"], \"unique_insights\": []}\n```";
        let parsed = parse_synthesis(raw).unwrap();
        assert_eq!(parsed.summary, "s");
        assert_eq!(parsed.key_themes, vec!["a"]);
    }

    #[test]
    fn unparseable_synthesis_falls_back_to_stats_summary() {
        assert!(parse_synthesis("no json here").is_none());
        let stats = ReportStats {
            total_submissions: 3,
            avg_score: 6.5,
            min_score: 5.0,
            max_score: 8.0,
            avg_word_count: 120,
        };
        let fallback = fallback_synthesis(&stats);
        assert!(fallback.summary.contains("3 submissions"));
        assert!(fallback.summary.contains("6.5"));
    }
}
