//! # edgequake-pdf2quiz
//!
//! Turn exam-paper PDFs into structured question records with Gemini vision
//! models, then generate, solve and check questions with the same API.
//!
//! ## Why images?
//!
//! Question papers are dense with formulae, option grids, figures and
//! two-column layouts that text extractors scramble. Each page is rasterised
//! to a PNG and read by a vision model, which returns JSON that this crate
//! locates, decodes and normalises.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    resolve local file or download from URL
//!  ├─ 2. Render   rasterise pages via pdfium (spawn_blocking)
//!  ├─ 3. Encode   PNG → data URL
//!  ├─ 4. Gemini   one request per page, key rotation + 2s/4s/8s backoff
//!  ├─ 5. Parse    balanced-bracket JSON span → ExtractedQuestion
//!  └─ 6. Output   continuations merged, per-page results + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2quiz::{extract_document, AssistantConfig, ExamAssistant, KeyRotator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // GEMINI_API_KEYS="key1,key2" or GEMINI_API_KEY="key"
//!     let keys = Arc::new(KeyRotator::from_env());
//!     let assistant = ExamAssistant::new(AssistantConfig::default(), keys)?;
//!
//!     let output = extract_document("paper.pdf", &assistant).await?;
//!     for q in &output.questions {
//!         let check = assistant.validate_question_structure(q);
//!         println!("[{}] {} ({})", q.question_type, q.question_statement, check.reason);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2quiz` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! edgequake-pdf2quiz = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assistant;
pub mod config;
pub mod error;
pub mod extract;
pub mod keys;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod question;
pub mod stream;
pub mod validate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assistant::{ExamAssistant, PageReply};
pub use config::{AssistantConfig, AssistantConfigBuilder, PromptVersion, RenderConfig, TaskTuning};
pub use error::{PageError, QuizError};
pub use extract::{
    extract_document, extract_document_from_bytes, extract_document_sync,
    extract_document_with_progress, extract_images, extract_to_file, inspect, merge_continuations,
    write_json_atomic,
};
pub use keys::KeyRotator;
pub use output::{DocumentInfo, ExtractionOutput, ExtractionStats, PageExtraction, PageImage};
pub use pipeline::gemini::{DelayFn, HttpReply, Transport};
pub use pipeline::render::{render_page_images, render_page_images_from_bytes};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use question::{
    ExtractedQuestion, GeneratedSolution, GenerationRequest, PageMemory, QuestionType,
    StructureCheck, TopicContext, ValidationVerdict,
};
pub use stream::{extract_stream, stream_pages, PageStream};
pub use validate::validate_question_structure;
