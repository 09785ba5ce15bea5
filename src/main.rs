//! Command-line entry point: a thin noun-verb dispatcher over the
//! library's discussion, submission, and report operations.

use std::{io::Read, path::PathBuf};

use anyhow::{Context, Result};
use bpaf::*;
use dg::{
    OutputFormat,
    ai::create_provider,
    canvas,
    config::GraderConfig,
    discussion::{Discussion, DiscussionStore, DiscussionUpdate},
    grader::{SubmissionGrader, render_grade_csv, render_report},
    report::{ReportGenerator, ScoreFilter, export_report, render_stats_table, render_synthesized},
    submission::{StoredSubmission, SubmissionStore},
    util::{csv_escape, read_text},
};
use dotenvy::dotenv;
use tabled::{Table, Tabled, settings::Style};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Discussion management subcommands.
#[derive(Debug, Clone)]
enum DiscussionCmd {
    /// Create a new discussion
    Create {
        /// Discussion title
        title: String,
        /// Total points
        points: u32,
        /// Minimum word count
        min_words: usize,
        /// File containing the question text
        question_file: Option<PathBuf>,
        /// Output format
        format: OutputFormat,
    },
    /// List all discussions
    List {
        /// Output format
        format: OutputFormat,
    },
    /// Show one discussion
    Show {
        /// Discussion identifier
        id: u32,
        /// Output format
        format: OutputFormat,
    },
    /// Update an existing discussion
    Update {
        /// Discussion identifier
        id: u32,
        /// New title
        title: Option<String>,
        /// New point total
        points: Option<u32>,
        /// New minimum word count
        min_words: Option<usize>,
        /// File containing the new question text
        question_file: Option<PathBuf>,
        /// Output format
        format: OutputFormat,
    },
}

/// Submission grading subcommands.
#[derive(Debug, Clone)]
enum SubmissionCmd {
    /// Grade a single submission file
    Grade {
        /// Parent discussion identifier
        discussion_id: u32,
        /// Path to the submission file
        file: PathBuf,
        /// Skip persisting the graded submission
        no_save: bool,
        /// Output format
        format: OutputFormat,
    },
    /// List all submissions of a discussion
    List {
        /// Parent discussion identifier
        discussion_id: u32,
        /// Output format
        format: OutputFormat,
    },
    /// Show one stored submission
    Show {
        /// Parent discussion identifier
        discussion_id: u32,
        /// Submission identifier
        submission_id: u32,
        /// Output format
        format: OutputFormat,
    },
    /// Grade every submission file in a directory, one at a time
    Batch {
        /// Parent discussion identifier
        discussion_id: u32,
        /// Directory of .txt/.md submission files
        dir: PathBuf,
        /// Skip persisting the graded submissions
        no_save: bool,
        /// Do not pause for Enter between submissions
        no_pause: bool,
    },
}

/// Reporting subcommands.
#[derive(Debug, Clone)]
enum ReportCmd {
    /// Generate a synthesized report
    Generate {
        /// Discussion identifier
        discussion_id: u32,
        /// Minimum score to include
        min_score: Option<f64>,
        /// Maximum score to include
        max_score: Option<f64>,
        /// Output format
        format: OutputFormat,
    },
    /// Export a synthesized report to a file
    Export {
        /// Discussion identifier
        discussion_id: u32,
        /// Output file path
        output: PathBuf,
        /// Minimum score to include
        min_score: Option<f64>,
        /// Maximum score to include
        max_score: Option<f64>,
        /// Export format
        format: OutputFormat,
    },
    /// Show statistics for a discussion
    Stats {
        /// Discussion identifier
        discussion_id: u32,
    },
    /// List discussions available for reporting
    List,
}

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Discussion management
    Discussion(DiscussionCmd),
    /// Submission grading
    Submission(SubmissionCmd),
    /// Report generation
    Report(ReportCmd),
    /// Canvas SpeedGrader stdin/stdout adapter
    Canvas,
}

/// Parses the `--format` flag with the given default.
fn format_flag(default: OutputFormat) -> impl Parser<OutputFormat> {
    long("format")
        .short('f')
        .help("Output format: text, json, csv, table")
        .argument::<OutputFormat>("FORMAT")
        .fallback(default)
}

/// Parses a discussion identifier positional.
fn discussion_id_arg() -> impl Parser<u32> {
    positional::<u32>("DISCUSSION_ID").help("Discussion identifier")
}

/// Parses the optional `--min-score` filter.
fn min_score_arg() -> impl Parser<Option<f64>> {
    long("min-score")
        .short('s')
        .help("Minimum score threshold for inclusion")
        .argument::<f64>("SCORE")
        .optional()
}

/// Parses the optional `--max-score` filter.
fn max_score_arg() -> impl Parser<Option<f64>> {
    long("max-score")
        .short('m')
        .help("Maximum score threshold for inclusion")
        .argument::<f64>("SCORE")
        .optional()
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    // discussion ---------------------------------------------------------
    let create = {
        let title = positional::<String>("TITLE").help("Discussion title");
        let points = long("points")
            .short('p')
            .help("Total points for the discussion")
            .argument::<u32>("POINTS")
            .fallback(12);
        let min_words = long("min-words")
            .short('w')
            .help("Minimum word count for submissions")
            .argument::<usize>("WORDS")
            .fallback(300);
        let question_file = long("question-file")
            .short('q')
            .help("File containing the discussion question")
            .argument::<PathBuf>("FILE")
            .optional();
        let format = format_flag(OutputFormat::Text);
        construct!(DiscussionCmd::Create {
            title,
            points,
            min_words,
            question_file,
            format,
        })
        .to_options()
        .command("create")
        .help("Create a new discussion")
    };

    let list = {
        let format = format_flag(OutputFormat::Table);
        construct!(DiscussionCmd::List { format })
            .to_options()
            .command("list")
            .help("List all discussions")
    };

    let show = {
        let id = positional::<u32>("ID").help("Discussion identifier");
        let format = format_flag(OutputFormat::Text);
        construct!(DiscussionCmd::Show { id, format })
            .to_options()
            .command("show")
            .help("Show details for a specific discussion")
    };

    let update = {
        let id = positional::<u32>("ID").help("Discussion identifier");
        let title = long("title")
            .short('t')
            .help("New title for the discussion")
            .argument::<String>("TITLE")
            .optional();
        let points = long("points")
            .short('p')
            .help("New point value for the discussion")
            .argument::<u32>("POINTS")
            .optional();
        let min_words = long("min-words")
            .short('w')
            .help("New minimum word count for submissions")
            .argument::<usize>("WORDS")
            .optional();
        let question_file = long("question-file")
            .short('q')
            .help("File containing the new discussion question")
            .argument::<PathBuf>("FILE")
            .optional();
        let format = format_flag(OutputFormat::Text);
        construct!(DiscussionCmd::Update {
            id,
            title,
            points,
            min_words,
            question_file,
            format,
        })
        .to_options()
        .command("update")
        .help("Update an existing discussion")
    };

    let discussion = construct!([create, list, show, update])
        .to_options()
        .command("discussion")
        .help("Manage discussion questions and settings")
        .map(Cmd::Discussion);

    // submission ---------------------------------------------------------
    let grade = {
        let discussion_id = discussion_id_arg();
        let file = positional::<PathBuf>("FILE").help("Path to the submission file");
        let no_save = long("no-save")
            .help("Do not save the graded submission")
            .switch();
        let format = format_flag(OutputFormat::Text);
        construct!(SubmissionCmd::Grade {
            discussion_id,
            file,
            no_save,
            format,
        })
        .to_options()
        .command("grade")
        .help("Grade a single submission file")
    };

    let sub_list = {
        let discussion_id = discussion_id_arg();
        let format = format_flag(OutputFormat::Table);
        construct!(SubmissionCmd::List {
            discussion_id,
            format,
        })
        .to_options()
        .command("list")
        .help("List all submissions for a discussion")
    };

    let sub_show = {
        let discussion_id = discussion_id_arg();
        let submission_id = positional::<u32>("SUBMISSION_ID").help("Submission identifier");
        let format = format_flag(OutputFormat::Text);
        construct!(SubmissionCmd::Show {
            discussion_id,
            submission_id,
            format,
        })
        .to_options()
        .command("show")
        .help("Show details for a specific submission")
    };

    let batch = {
        let discussion_id = discussion_id_arg();
        let dir = positional::<PathBuf>("DIR").help("Directory of submission files");
        let no_save = long("no-save")
            .help("Do not save the graded submissions")
            .switch();
        let no_pause = long("no-pause")
            .help("Do not pause for Enter between submissions")
            .switch();
        construct!(SubmissionCmd::Batch {
            discussion_id,
            dir,
            no_save,
            no_pause,
        })
        .to_options()
        .command("batch")
        .help("Grade submissions in sequential batch mode")
    };

    let submission = construct!([grade, sub_list, sub_show, batch])
        .to_options()
        .command("submission")
        .help("Grade and manage student submissions")
        .map(Cmd::Submission);

    // report -------------------------------------------------------------
    let generate = {
        let discussion_id = discussion_id_arg();
        let min_score = min_score_arg();
        let max_score = max_score_arg();
        let format = format_flag(OutputFormat::Text);
        construct!(ReportCmd::Generate {
            discussion_id,
            min_score,
            max_score,
            format,
        })
        .to_options()
        .command("generate")
        .help("Generate a synthesized report from submissions")
    };

    let export = {
        let discussion_id = discussion_id_arg();
        let output = positional::<PathBuf>("OUTPUT").help("Output file path");
        let min_score = min_score_arg();
        let max_score = max_score_arg();
        let format = format_flag(OutputFormat::Text);
        construct!(ReportCmd::Export {
            discussion_id,
            output,
            min_score,
            max_score,
            format,
        })
        .to_options()
        .command("export")
        .help("Export a synthesized report to a file")
    };

    let stats = {
        let discussion_id = discussion_id_arg();
        construct!(ReportCmd::Stats { discussion_id })
            .to_options()
            .command("stats")
            .help("Show statistics for a discussion")
    };

    let report_list = pure(ReportCmd::List)
        .to_options()
        .command("list")
        .help("List discussions available for reporting");

    let report = construct!([generate, export, stats, report_list])
        .to_options()
        .command("report")
        .help("Generate reports and synthesized content")
        .map(Cmd::Report);

    let canvas_cmd = pure(Cmd::Canvas)
        .to_options()
        .command("canvas")
        .help("Grade one submission from stdin in Canvas SpeedGrader JSON");

    let cmd = construct!([discussion, submission, report, canvas_cmd]);

    cmd.to_options()
        .descr("AI-assisted grading for student discussions")
        .run()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let filter_layer = LevelFilter::from_level(Level::INFO);
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    let cmd = options();
    let config = GraderConfig::load().context("Failed to load configuration")?;

    match cmd {
        Cmd::Discussion(cmd) => run_discussion(cmd, &config),
        Cmd::Submission(cmd) => run_submission(cmd, &config).await,
        Cmd::Report(cmd) => run_report(cmd, &config).await,
        Cmd::Canvas => run_canvas(&config).await,
    }
}

/// Row shape for `discussion list` tables.
#[derive(Tabled)]
struct DiscussionRow {
    #[tabled(rename = "ID")]
    id: u32,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Points")]
    points: u32,
    #[tabled(rename = "Min Words")]
    min_words: usize,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&Discussion> for DiscussionRow {
    fn from(d: &Discussion) -> Self {
        Self {
            id: d.id,
            title: d.title.clone(),
            points: d.points,
            min_words: d.min_words,
            created: d.created_at.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Row shape for `submission list` tables.
#[derive(Tabled)]
struct SubmissionRow {
    #[tabled(rename = "ID")]
    id: u32,
    #[tabled(rename = "Score")]
    score: f64,
    #[tabled(rename = "Words")]
    words: usize,
    #[tabled(rename = "Meets Min")]
    meets: bool,
    #[tabled(rename = "Graded At")]
    graded_at: String,
}

impl From<&StoredSubmission> for SubmissionRow {
    fn from(r: &StoredSubmission) -> Self {
        Self {
            id: r.submission_id,
            score: r.grading.score,
            words: r.grading.word_count,
            meets: r.grading.meets_word_count,
            graded_at: r.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// Row shape for `report list` tables.
#[derive(Tabled)]
struct ReportListRow {
    #[tabled(rename = "ID")]
    id: u32,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Submissions")]
    submissions: usize,
}

/// Discussion rendered as JSON including its question text, which the
/// metadata serialization intentionally leaves out.
fn discussion_json(d: &Discussion) -> serde_json::Value {
    serde_json::json!({
        "id": d.id,
        "title": d.title,
        "points": d.points,
        "min_words": d.min_words,
        "created_at": d.created_at,
        "updated_at": d.updated_at,
        "question_content": d.question_content,
    })
}

/// Multi-line text rendering of one discussion.
fn discussion_text(d: &Discussion) -> String {
    format!(
        "Discussion {}: {}\nPoints: {}\nMinimum words: {}\nCreated: {}\nUpdated: {}\n\nQuestion:\n{}",
        d.id,
        d.title,
        d.points,
        d.min_words,
        d.created_at.to_rfc3339(),
        d.updated_at.to_rfc3339(),
        d.question_content
    )
}

/// CSV rendering of a list of discussions.
fn discussions_csv(discussions: &[Discussion]) -> String {
    let mut out = String::from("id,title,points,min_words,created_at\n");
    for d in discussions {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            d.id,
            csv_escape(&d.title),
            d.points,
            d.min_words,
            d.created_at.to_rfc3339()
        ));
    }
    out
}

/// Handles the `discussion` noun.
fn run_discussion(cmd: DiscussionCmd, config: &GraderConfig) -> Result<()> {
    let store = DiscussionStore::new(&config.base_dir)?;

    match cmd {
        DiscussionCmd::Create {
            title,
            points,
            min_words,
            question_file,
            format,
        } => {
            let question = match &question_file {
                Some(path) => Some(read_text(path).context("Failed to read question file")?),
                None => None,
            };
            let id = store.create(&title, points, min_words, question.as_deref())?;
            let discussion = store.get(id)?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&discussion_json(&discussion))?)
                }
                OutputFormat::Csv => print!("{}", discussions_csv(&[discussion])),
                _ => println!("Discussion created with ID: {id}"),
            }
        }
        DiscussionCmd::List { format } => {
            let discussions = store.list()?;
            match format {
                OutputFormat::Json => {
                    let values: Vec<_> = discussions.iter().map(discussion_json).collect();
                    println!("{}", serde_json::to_string_pretty(&values)?);
                }
                OutputFormat::Csv => print!("{}", discussions_csv(&discussions)),
                _ => {
                    let rows: Vec<DiscussionRow> =
                        discussions.iter().map(DiscussionRow::from).collect();
                    println!("{}", Table::new(rows).with(Style::modern()));
                }
            }
        }
        DiscussionCmd::Show { id, format } => {
            let discussion = store.get(id)?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&discussion_json(&discussion))?)
                }
                OutputFormat::Csv => print!("{}", discussions_csv(&[discussion])),
                _ => println!("{}", discussion_text(&discussion)),
            }
        }
        DiscussionCmd::Update {
            id,
            title,
            points,
            min_words,
            question_file,
            format,
        } => {
            let question_content = match &question_file {
                Some(path) => Some(read_text(path).context("Failed to read question file")?),
                None => None,
            };
            let updated = store.update(
                id,
                DiscussionUpdate {
                    title,
                    points,
                    min_words,
                    question_content,
                },
            )?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&discussion_json(&updated))?)
                }
                OutputFormat::Csv => print!("{}", discussions_csv(&[updated])),
                _ => println!("Discussion {id} updated.\n\n{}", discussion_text(&updated)),
            }
        }
    }

    Ok(())
}

/// Handles the `submission` noun.
async fn run_submission(cmd: SubmissionCmd, config: &GraderConfig) -> Result<()> {
    match cmd {
        SubmissionCmd::Grade {
            discussion_id,
            file,
            no_save,
            format,
        } => {
            let grader = SubmissionGrader::new(config)?;
            let points = grader.discussions().get(discussion_id)?.points;
            let graded = grader.grade_file(discussion_id, &file, !no_save).await?;
            let label = file.display().to_string();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&graded)?),
                OutputFormat::Csv => println!("{}", render_grade_csv(&graded, &label, points)),
                _ => println!("{}", render_report(&graded, Some(&label), points)),
            }
        }
        SubmissionCmd::List {
            discussion_id,
            format,
        } => {
            let discussions = DiscussionStore::new(&config.base_dir)?;
            discussions.get(discussion_id)?;
            let records = SubmissionStore::new(&config.base_dir).list(discussion_id)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                OutputFormat::Csv => {
                    let mut out =
                        String::from("submission_id,score,word_count,meets_word_count,created_at\n");
                    for r in &records {
                        out.push_str(&format!(
                            "{},{},{},{},{}\n",
                            r.submission_id,
                            r.grading.score,
                            r.grading.word_count,
                            r.grading.meets_word_count,
                            r.created_at.to_rfc3339()
                        ));
                    }
                    print!("{out}");
                }
                _ => {
                    let rows: Vec<SubmissionRow> = records.iter().map(SubmissionRow::from).collect();
                    println!("{}", Table::new(rows).with(Style::modern()));
                }
            }
        }
        SubmissionCmd::Show {
            discussion_id,
            submission_id,
            format,
        } => {
            let discussions = DiscussionStore::new(&config.base_dir)?;
            let points = discussions.get(discussion_id)?.points;
            let record = SubmissionStore::new(&config.base_dir).get(discussion_id, submission_id)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
                OutputFormat::Csv => {
                    let label = format!("submission_{submission_id}");
                    println!("{}", render_grade_csv(&record.grading, &label, points));
                }
                _ => {
                    let label = format!("submission_{submission_id}");
                    println!("{}", render_report(&record.grading, Some(&label), points));
                }
            }
        }
        SubmissionCmd::Batch {
            discussion_id,
            dir,
            no_save,
            no_pause,
        } => {
            let grader = SubmissionGrader::new(config)?;
            let graded = grader
                .grade_directory(discussion_id, &dir, !no_save, !no_pause)
                .await?;
            println!("Graded {graded} submissions.");
        }
    }

    Ok(())
}

/// Handles the `report` noun.
async fn run_report(cmd: ReportCmd, config: &GraderConfig) -> Result<()> {
    let discussions = DiscussionStore::new(&config.base_dir)?;
    let submissions = SubmissionStore::new(&config.base_dir);
    let generator = ReportGenerator::new(&discussions, &submissions);

    match cmd {
        ReportCmd::Stats { discussion_id } => {
            let discussion = discussions.get(discussion_id)?;
            let stats = generator.stats(discussion_id)?;
            println!("Statistics for discussion {}: {}", discussion.id, discussion.title);
            println!("{}", render_stats_table(&stats));
        }
        ReportCmd::List => {
            let mut rows = Vec::new();
            for d in discussions.list()? {
                let count = submissions.list(d.id)?.len();
                rows.push(ReportListRow {
                    id: d.id,
                    title: d.title,
                    submissions: count,
                });
            }
            println!("{}", Table::new(rows).with(Style::modern()));
        }
        ReportCmd::Generate {
            discussion_id,
            min_score,
            max_score,
            format,
        } => {
            let provider = create_provider(&config.ai)?;
            let filter = ScoreFilter {
                min_score,
                max_score,
            };
            let report = generator
                .generate(discussion_id, filter, provider.as_ref())
                .await?;
            println!("{}", render_synthesized(&report, format)?);
        }
        ReportCmd::Export {
            discussion_id,
            output,
            min_score,
            max_score,
            format,
        } => {
            let provider = create_provider(&config.ai)?;
            let filter = ScoreFilter {
                min_score,
                max_score,
            };
            let report = generator
                .generate(discussion_id, filter, provider.as_ref())
                .await?;
            export_report(&report, format, &output)?;
            println!("Report exported to {}", output.display());
        }
    }

    Ok(())
}

/// Handles the `canvas` adapter: JSON on stdin, JSON on stdout, error
/// envelope plus exit code 1 on any failure.
async fn run_canvas(config: &GraderConfig) -> Result<()> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input).ok();

    match canvas::run(&input, config).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&canvas::error_envelope(&e.to_string()))?
            );
            std::process::exit(1);
        }
    }
}
