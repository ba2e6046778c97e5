//! CLI binary for edgequake-pdf2quiz.
//!
//! A thin shim over the library crate: flags map onto `AssistantConfig`,
//! results are printed as JSON on stdout, logs and progress go to stderr.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pdf2quiz::{
    extract_document_with_progress, inspect, write_json_atomic, AssistantConfig, ExamAssistant,
    ExtractedQuestion, ExtractionOutput, ExtractionProgressCallback, GenerationRequest, KeyRotator,
    ProgressCallback, PromptVersion, QuestionType, TopicContext,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    page_started: Mutex<Option<Instant>>,
    questions: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_extraction_start` tells us the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
            questions: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Reading {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut t) = self.page_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, question_count: usize) {
        self.questions.fetch_add(question_count, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<14}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{question_count:>3} questions")),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        let questions = self.questions.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} questions from {} pages",
                green("✔"),
                bold(&questions.to_string()),
                success_count
            );
        } else {
            eprintln!(
                "{} {} questions from {}/{} pages  ({} failed)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&questions.to_string()),
                success_count,
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract every question from a paper
  pdf2quiz extract paper.pdf -o questions.json

  # Extract from a URL, attaching page images to questions with figures
  pdf2quiz extract https://example.com/jee-2023.pdf --attach-images

  # Generate five MCQs for a topic, grounded in notes
  pdf2quiz generate --topic-id kin-01 --topic-name Kinematics \
      --exam "JEE Main" --course Physics --type MCQ --count 5 --notes kinematics.md

  # Solve and validate extracted questions
  pdf2quiz solve questions.json --notes kinematics.md
  pdf2quiz validate questions.json

  # Structural check and PDF metadata (no API key needed)
  pdf2quiz check questions.json
  pdf2quiz inspect paper.pdf

ENVIRONMENT VARIABLES:
  GEMINI_API_KEYS   Comma-separated API keys, rotated per request
  GEMINI_API_KEY    Single API key (used when GEMINI_API_KEYS is unset)
  GEMINI_MODEL      Model ID (default: gemini-2.0-flash)
  GEMINI_BASE_URL   API host override
  PDFIUM_LIB_PATH   Path to libpdfium (file or directory); else the system library
  RUST_LOG          Log filter, e.g. edgequake_pdf2quiz=debug
"#;

/// Extract, generate, solve and validate exam questions with Gemini.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2quiz",
    version,
    about = "Extract, generate and validate exam questions from PDFs with Gemini vision models",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Gemini model ID.
    #[arg(long, global = true, env = "GEMINI_MODEL")]
    model: Option<String>,

    /// API host override.
    #[arg(long, global = true, env = "GEMINI_BASE_URL")]
    base_url: Option<String>,

    /// API keys, comma-separated. Rotated per request.
    #[arg(long, global = true, env = "GEMINI_API_KEYS", value_delimiter = ',', hide_env_values = true)]
    api_keys: Vec<String>,

    /// Prompt template generation.
    #[arg(long, global = true, env = "PDF2QUIZ_PROMPT_VERSION", value_enum, default_value = "advanced")]
    prompt_version: PromptVersionArg,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, global = true, env = "PDF2QUIZ_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2QUIZ_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2QUIZ_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract every question from a PDF file or URL.
    Extract(ExtractArgs),
    /// Generate new questions for a topic.
    Generate(GenerateArgs),
    /// Write answers and solutions for a questions file.
    Solve {
        /// JSON file of questions (array, or `extract` output).
        questions: PathBuf,
        /// Topic notes to base solutions on.
        #[arg(long)]
        notes: Option<PathBuf>,
    },
    /// Ask the model whether each question's answer is wrong.
    Validate {
        /// JSON file of questions (array, or `extract` output).
        questions: PathBuf,
    },
    /// Local structural check, no API calls.
    Check {
        /// JSON file of questions (array, or `extract` output).
        questions: PathBuf,
    },
    /// Print PDF metadata, no API calls.
    Inspect {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,
    },
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write JSON here instead of stdout.
    #[arg(short, long, env = "PDF2QUIZ_OUTPUT")]
    output: Option<PathBuf>,

    /// Attach the page image to questions that reference a figure.
    #[arg(long, env = "PDF2QUIZ_ATTACH_IMAGES")]
    attach_images: bool,

    /// Render scale relative to 72 DPI (0.5–4.0).
    #[arg(long, env = "PDF2QUIZ_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2QUIZ_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Print questions only, not per-page results and stats.
    #[arg(long)]
    questions_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2QUIZ_NO_PROGRESS")]
    no_progress: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2QUIZ_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[arg(long)]
    topic_id: String,
    #[arg(long)]
    topic_name: String,
    #[arg(long)]
    topic_description: Option<String>,
    #[arg(long)]
    exam: String,
    #[arg(long)]
    course: String,
    /// MCQ, MSQ, NAT or Subjective.
    #[arg(long = "type", default_value = "MCQ")]
    question_type: String,
    #[arg(long, default_value_t = 5)]
    count: usize,
    /// Reference questions (JSON) to imitate.
    #[arg(long)]
    prior: Option<PathBuf>,
    /// Text of questions already in the bank, to avoid duplicates.
    #[arg(long)]
    existing: Option<PathBuf>,
    /// Statements generated recently, one per line.
    #[arg(long)]
    recent: Option<PathBuf>,
    /// Topic notes to ground generation.
    #[arg(long)]
    notes: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PromptVersionArg {
    Basic,
    Advanced,
}

impl From<PromptVersionArg> for PromptVersion {
    fn from(v: PromptVersionArg) -> Self {
        match v {
            PromptVersionArg::Basic => PromptVersion::Basic,
            PromptVersionArg::Advanced => PromptVersion::Advanced,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs during extraction.
    let show_progress = matches!(&cli.command, Command::Extract(a) if !a.no_progress)
        && !cli.global.quiet;
    let filter = if cli.global.verbose {
        "debug"
    } else if cli.global.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Inspect { ref input } => {
            let config = build_config(&cli.global, None)?;
            let info = inspect(input, &config)
                .await
                .context("Failed to inspect PDF")?;
            print_json(&info)
        }
        Command::Check { ref questions } => {
            let questions = read_questions(questions).await?;
            let checks: Vec<_> = questions
                .iter()
                .enumerate()
                .map(|(i, q)| {
                    serde_json::json!({
                        "index": i,
                        "question_number": q.question_number,
                        "check": edgequake_pdf2quiz::validate_question_structure(q),
                    })
                })
                .collect();
            print_json(&checks)
        }
        Command::Extract(ref args) => run_extract(&cli.global, args, show_progress).await,
        Command::Generate(ref args) => run_generate(&cli.global, args).await,
        Command::Solve {
            ref questions,
            ref notes,
        } => {
            let assistant = build_assistant(&cli.global, None)?;
            let questions = read_questions(questions).await?;
            let notes = read_optional(notes.as_deref()).await?;
            let solutions = assistant
                .generate_solutions(&questions, notes.as_deref())
                .await
                .context("Solution generation failed")?;
            print_json(&solutions)
        }
        Command::Validate { ref questions } => {
            let assistant = build_assistant(&cli.global, None)?;
            let questions = read_questions(questions).await?;
            let mut verdicts = Vec::with_capacity(questions.len());
            for (i, q) in questions.iter().enumerate() {
                let verdict = assistant
                    .validate_question(q)
                    .await
                    .with_context(|| format!("Validation failed for question {}", i + 1))?;
                if !cli.global.quiet && verdict.is_wrong {
                    eprintln!("{} question {}: {}", red("✗"), i + 1, verdict.reason);
                }
                verdicts.push(serde_json::json!({
                    "index": i,
                    "question_number": q.question_number,
                    "verdict": verdict,
                }));
            }
            print_json(&verdicts)
        }
    }
}

async fn run_extract(global: &GlobalArgs, args: &ExtractArgs, show_progress: bool) -> Result<()> {
    let assistant = build_assistant(global, Some(args))?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let output = extract_document_with_progress(&args.input, &assistant, progress_cb)
        .await
        .context("Extraction failed")?;

    if let Some(ref path) = args.output {
        write_output(path, &output, args.questions_only).await?;
        if !global.quiet {
            eprintln!(
                "{}  {} questions  {}/{} pages  {}ms  →  {}",
                if output.stats.failed_pages == 0 { green("✔") } else { cyan("⚠") },
                output.stats.total_questions,
                output.stats.processed_pages,
                output.stats.total_pages,
                output.stats.total_duration_ms,
                bold(&path.display().to_string()),
            );
        }
    } else if args.questions_only {
        print_json(&output.questions)?;
    } else {
        print_json(&output)?;
    }

    if !global.quiet && !show_progress && output.stats.failed_pages > 0 {
        eprintln!("  {} pages failed", output.stats.failed_pages);
    }
    Ok(())
}

async fn run_generate(global: &GlobalArgs, args: &GenerateArgs) -> Result<()> {
    let assistant = build_assistant(global, None)?;

    let question_type = QuestionType::from(args.question_type.as_str());
    if !question_type.is_known() {
        let kinds = QuestionType::all();
        let known: Vec<&str> = kinds.iter().map(QuestionType::as_str).collect();
        anyhow::bail!(
            "Unknown question type '{}': expected one of {}",
            args.question_type,
            known.join(", ")
        );
    }

    let prior_questions = match args.prior {
        Some(ref path) => read_questions(path).await?,
        None => Vec::new(),
    };
    let recent_questions = read_optional(args.recent.as_deref())
        .await?
        .map(|s| {
            s.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let request = GenerationRequest {
        topic: TopicContext {
            id: args.topic_id.clone(),
            name: args.topic_name.clone(),
            description: args.topic_description.clone(),
        },
        exam_name: args.exam.clone(),
        course_name: args.course.clone(),
        question_type,
        prior_questions,
        existing_context: read_optional(args.existing.as_deref()).await?.unwrap_or_default(),
        recent_questions,
        count: args.count,
        topic_notes: read_optional(args.notes.as_deref()).await?,
    };

    let questions = assistant
        .generate_questions(&request)
        .await
        .context("Question generation failed")?;
    print_json(&questions)
}

/// Map CLI args to `AssistantConfig`.
fn build_config(global: &GlobalArgs, extract: Option<&ExtractArgs>) -> Result<AssistantConfig> {
    let mut builder = AssistantConfig::builder()
        .request_timeout_secs(global.api_timeout)
        .prompt_version(global.prompt_version.into());
    if let Some(ref model) = global.model {
        builder = builder.model(model);
    }
    if let Some(ref url) = global.base_url {
        builder = builder.base_url(url);
    }
    if let Some(args) = extract {
        builder = builder
            .render_scale(args.scale)
            .attach_page_images(args.attach_images)
            .download_timeout_secs(args.download_timeout);
        if let Some(ref pwd) = args.password {
            builder = builder.password(pwd);
        }
    }
    builder.build().context("Invalid configuration")
}

fn build_assistant(global: &GlobalArgs, extract: Option<&ExtractArgs>) -> Result<ExamAssistant> {
    let config = build_config(global, extract)?;
    let keys = if global.api_keys.iter().any(|k| !k.trim().is_empty()) {
        KeyRotator::new(&global.api_keys)
    } else {
        KeyRotator::from_env()
    };
    if keys.is_empty() {
        anyhow::bail!("No API keys configured: set GEMINI_API_KEYS or GEMINI_API_KEY, or pass --api-keys");
    }
    ExamAssistant::new(config, Arc::new(keys)).context("Failed to create Gemini client")
}

/// A questions file: a bare array, or the output of `extract`.
#[derive(Deserialize)]
#[serde(untagged)]
enum QuestionsFile {
    List(Vec<ExtractedQuestion>),
    Extraction(ExtractionOutput),
}

async fn read_questions(path: &Path) -> Result<Vec<ExtractedQuestion>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file: QuestionsFile = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a questions file", path.display()))?;
    Ok(match file {
        QuestionsFile::List(v) => v,
        QuestionsFile::Extraction(out) => out.questions,
    })
}

async fn read_optional(path: Option<&Path>) -> Result<Option<String>> {
    match path {
        Some(p) => tokio::fs::read_to_string(p)
            .await
            .map(Some)
            .with_context(|| format!("Failed to read {}", p.display())),
        None => Ok(None),
    }
}

async fn write_output(path: &Path, output: &ExtractionOutput, questions_only: bool) -> Result<()> {
    let written = if questions_only {
        write_json_atomic(path, &output.questions).await
    } else {
        write_json_atomic(path, output).await
    };
    written.with_context(|| format!("Failed to write {}", path.display()))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}

