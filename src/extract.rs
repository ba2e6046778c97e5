//! Whole-document extraction: every page of an exam PDF to question records.
//!
//! Pages are read strictly in order. Each prompt carries the tail of the
//! previous page's reply and the page memory built so far, which is how the
//! model recognises a question that runs across a page break. That
//! dependency rules out concurrent page requests.
//!
//! Use [`crate::stream::extract_stream`] to receive pages as they finish.

use crate::assistant::ExamAssistant;
use crate::config::AssistantConfig;
use crate::error::{PageError, QuizError};
use crate::output::{DocumentInfo, ExtractionOutput, ExtractionStats, PageExtraction, PageImage};
use crate::pipeline::{input, render};
use crate::progress::ProgressCallback;
use crate::question::{ExtractedQuestion, PageMemory};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extract every question from a PDF file or URL.
///
/// Returns `Ok` even when some pages failed; see `stats.failed_pages` and
/// each page's `error`.
///
/// # Errors
/// Fatal only: no keys configured, unreadable input, not a PDF, no page
/// could be rendered.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2quiz::{extract_document, AssistantConfig, ExamAssistant, KeyRotator};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let keys = Arc::new(KeyRotator::from_env());
/// let assistant = ExamAssistant::new(AssistantConfig::default(), keys)?;
/// let output = extract_document("paper.pdf", &assistant).await?;
/// println!("{} questions", output.questions.len());
/// # Ok(())
/// # }
/// ```
pub async fn extract_document(
    input_str: impl AsRef<str>,
    assistant: &ExamAssistant,
) -> Result<ExtractionOutput, QuizError> {
    extract_document_with_progress(input_str, assistant, None).await
}

/// [`extract_document`] with per-page progress events.
pub async fn extract_document_with_progress(
    input_str: impl AsRef<str>,
    assistant: &ExamAssistant,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionOutput, QuizError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting extraction: {}", input_str);
    ensure_keys(assistant)?;

    let config = assistant.config();
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let pdf_path = resolved.path().to_path_buf();

    let info =
        render::read_document_info(&pdf_path, config.render.password.as_deref()).await?;
    info!("PDF has {} pages", info.page_count);

    let render_start = Instant::now();
    let images = render::render_page_images(&pdf_path, &config.render).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!("Rendered {} pages in {}ms", images.len(), render_duration_ms);

    let skipped = missing_pages(&images, info.page_count);
    Ok(run_pages(assistant, images, skipped, info, progress, render_duration_ms, total_start).await)
}

/// Extract questions from pages that are already rendered.
///
/// `images` must be in page order. Nothing is rendered or downloaded, so
/// `info` carries only the page count.
pub async fn extract_images(
    images: Vec<PageImage>,
    assistant: &ExamAssistant,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionOutput, QuizError> {
    ensure_keys(assistant)?;
    let info = DocumentInfo {
        page_count: images.len(),
        ..Default::default()
    };
    Ok(run_pages(assistant, images, Vec::new(), info, progress, 0, Instant::now()).await)
}

/// Extract every question from PDF bytes held in memory.
pub async fn extract_document_from_bytes(
    bytes: Vec<u8>,
    assistant: &ExamAssistant,
) -> Result<ExtractionOutput, QuizError> {
    let total_start = Instant::now();
    ensure_keys(assistant)?;
    let config = assistant.config();

    let info =
        render::read_document_info_from_bytes(bytes.clone(), config.render.password.as_deref())
            .await?;

    let render_start = Instant::now();
    let images = render::render_page_images_from_bytes(bytes, &config.render).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    let skipped = missing_pages(&images, info.page_count);
    Ok(run_pages(assistant, images, skipped, info, None, render_duration_ms, total_start).await)
}

/// Extract and write the full output as pretty JSON to `output_path`.
///
/// Writes to a sibling temp file first and renames it into place.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    assistant: &ExamAssistant,
) -> Result<ExtractionStats, QuizError> {
    let output = extract_document(input_str, assistant).await?;
    write_json_atomic(output_path.as_ref(), &output).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`extract_document`] on a private runtime.
pub fn extract_document_sync(
    input_str: impl AsRef<str>,
    assistant: &ExamAssistant,
) -> Result<ExtractionOutput, QuizError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| QuizError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_document(input_str, assistant))
}

/// Page count and metadata without rendering. Needs no API key.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &AssistantConfig,
) -> Result<DocumentInfo, QuizError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    render::read_document_info(resolved.path(), config.render.password.as_deref()).await
}

/// Join questions split across a page break.
///
/// A record flagged `continues_on_next` absorbs the following record when
/// that record is the first one on the next page and is flagged
/// `continues_from_previous`. Statements are concatenated; options are
/// appended. Returns the merged list and the number of merges.
pub fn merge_continuations(questions: Vec<ExtractedQuestion>) -> (Vec<ExtractedQuestion>, usize) {
    let mut merged: Vec<ExtractedQuestion> = Vec::with_capacity(questions.len());
    let mut count = 0;

    for q in questions {
        let joins = q.continues_from_previous()
            && merged.last().is_some_and(|prev| {
                prev.continues_on_next()
                    && matches!(
                        (prev.page_number, q.page_number),
                        (Some(a), Some(b)) if b == a + 1
                    )
            });

        if joins {
            if let Some(prev) = merged.last_mut() {
                join_into(prev, q);
                count += 1;
                continue;
            }
        }
        merged.push(q);
    }

    (merged, count)
}

fn join_into(head: &mut ExtractedQuestion, tail: ExtractedQuestion) {
    let tail_statement = tail.question_statement.trim();
    if !tail_statement.is_empty() {
        head.question_statement = format!("{} {}", head.question_statement.trim_end(), tail_statement);
    }

    if let Some(more) = tail.options.filter(|o| !o.is_empty()) {
        head.options.get_or_insert_with(Vec::new).extend(more);
    }

    if !head.question_type.is_known() && tail.question_type.is_known() {
        head.question_type = tail.question_type;
    }

    if tail.has_image == Some(true) {
        head.has_image = Some(true);
    }
    head.image_description = match (head.image_description.take(), tail.image_description) {
        (Some(a), Some(b)) => Some(format!("{a} {b}")),
        (a, b) => a.or(b),
    };
    if head.source_image.is_none() {
        head.source_image = tail.source_image;
    }
    if head.question_number.is_none() {
        head.question_number = tail.question_number;
    }
    head.continues_on_next = tail.continues_on_next;
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn ensure_keys(assistant: &ExamAssistant) -> Result<(), QuizError> {
    if assistant.keys().is_empty() {
        return Err(QuizError::NoKeysConfigured);
    }
    Ok(())
}

/// Prior-page context and page memory carried from one page to the next.
#[derive(Debug, Default)]
pub(crate) struct PageWalker {
    prior_reply: Option<String>,
    memory: PageMemory,
    attach_images: bool,
}

impl PageWalker {
    pub(crate) fn new(attach_images: bool) -> Self {
        Self {
            attach_images,
            ..Default::default()
        }
    }

    pub(crate) fn into_memory(self) -> PageMemory {
        self.memory
    }

    /// Extract one page. Failures are recorded on the result, not returned.
    pub(crate) async fn step(&mut self, assistant: &ExamAssistant, page: &PageImage) -> PageExtraction {
        let start = Instant::now();
        let result = assistant
            .extract_page(
                &page.data_url,
                page.page_number,
                self.prior_reply.as_deref(),
                Some(&mut self.memory),
            )
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(reply) => {
                let questions = if self.attach_images {
                    reply
                        .questions
                        .into_iter()
                        .map(|q| {
                            if q.has_image() {
                                q.with_source_image(page.data_url.clone())
                            } else {
                                q
                            }
                        })
                        .collect()
                } else {
                    reply.questions
                };
                self.prior_reply = Some(reply.raw.clone());
                PageExtraction {
                    page_number: page.page_number,
                    questions,
                    raw_reply: reply.raw,
                    duration_ms,
                    error: None,
                }
            }
            Err(e) => {
                warn!("Page {} failed: {}", page.page_number, e);
                // The next page's "previous page" is now unknown.
                self.prior_reply = None;
                PageExtraction {
                    page_number: page.page_number,
                    questions: Vec::new(),
                    raw_reply: String::new(),
                    duration_ms,
                    error: Some(PageError::ExtractionFailed {
                        page: page.page_number,
                        detail: e.to_string(),
                    }),
                }
            }
        }
    }
}

/// Record pages the renderer skipped as `RenderFailed`.
pub(crate) fn missing_pages(images: &[PageImage], page_count: usize) -> Vec<PageExtraction> {
    (1..=page_count as u32)
        .filter(|n| !images.iter().any(|img| img.page_number == *n))
        .map(|n| PageExtraction {
            page_number: n,
            questions: Vec::new(),
            raw_reply: String::new(),
            duration_ms: 0,
            error: Some(PageError::RenderFailed {
                page: n,
                detail: "page could not be rasterised".to_string(),
            }),
        })
        .collect()
}

/// Drive the sequential per-page loop and assemble the output.
async fn run_pages(
    assistant: &ExamAssistant,
    images: Vec<PageImage>,
    skipped: Vec<PageExtraction>,
    info: DocumentInfo,
    progress: Option<ProgressCallback>,
    render_duration_ms: u64,
    total_start: Instant,
) -> ExtractionOutput {
    let total = images.len();
    if let Some(ref cb) = progress {
        cb.on_extraction_start(total);
    }

    let llm_start = Instant::now();
    let mut walker = PageWalker::new(assistant.config().attach_page_images);
    let mut pages = Vec::with_capacity(info.page_count.max(total));

    for (i, image) in images.iter().enumerate() {
        if let Some(ref cb) = progress {
            cb.on_page_start(i + 1, total);
        }
        let page = walker.step(assistant, image).await;
        if let Some(ref cb) = progress {
            match &page.error {
                None => cb.on_page_complete(i + 1, total, page.questions.len()),
                Some(e) => cb.on_page_error(i + 1, total, &e.to_string()),
            }
        }
        pages.push(page);
    }
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    pages.extend(skipped);
    pages.sort_by_key(|p| p.page_number);

    let all: Vec<ExtractedQuestion> = pages.iter().flat_map(|p| p.questions.clone()).collect();
    let (questions, merged_continuations) = merge_continuations(all);
    if merged_continuations > 0 {
        debug!("Merged {} continued question(s)", merged_continuations);
    }

    let failed = pages.iter().filter(|p| p.error.is_some()).count();
    let processed = pages.len() - failed;
    let stats = ExtractionStats {
        total_pages: pages.len(),
        processed_pages: processed,
        failed_pages: failed,
        total_questions: questions.len(),
        merged_continuations,
        render_duration_ms,
        llm_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Extraction complete: {} questions from {}/{} pages, {}ms total",
        stats.total_questions, processed, stats.total_pages, stats.total_duration_ms
    );
    if let Some(ref cb) = progress {
        cb.on_extraction_complete(total, processed);
    }

    ExtractionOutput {
        questions,
        pages,
        info,
        stats,
        memory: walker.into_memory(),
    }
}

/// Write `value` as pretty JSON through a sibling `.json.tmp` file and a
/// rename, creating parent directories as needed.
pub async fn write_json_atomic<T>(path: &Path, value: &T) -> Result<(), QuizError>
where
    T: Serialize + ?Sized,
{
    let write_failed = |source: std::io::Error| QuizError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| QuizError::Internal(format!("Failed to serialise output: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::QuestionType;

    fn on_page(q: ExtractedQuestion, page: u32) -> ExtractedQuestion {
        q.with_page_number(page)
    }

    #[test]
    fn continuation_is_merged_across_adjacent_pages() {
        let mut head = on_page(ExtractedQuestion::new("A block slides down", QuestionType::Mcq), 1);
        head.continues_on_next = Some(true);
        let mut tail = on_page(ExtractedQuestion::new("an incline. Find a.", QuestionType::Mcq), 2)
            .with_options(["1", "2", "3", "4"]);
        tail.continues_from_previous = Some(true);
        let next = on_page(ExtractedQuestion::new("Q2", QuestionType::Nat), 2);

        let (merged, count) = merge_continuations(vec![head, tail, next]);
        assert_eq!(count, 1);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].question_statement, "A block slides down an incline. Find a.");
        assert_eq!(merged[0].option_list().len(), 4);
        assert_eq!(merged[0].page_number, Some(1));
        assert!(!merged[0].continues_on_next());
    }

    #[test]
    fn continuation_requires_both_flags_and_adjacency() {
        let mut head = on_page(ExtractedQuestion::new("first", QuestionType::Nat), 1);
        head.continues_on_next = Some(true);
        let mut far = on_page(ExtractedQuestion::new("rest", QuestionType::Nat), 3);
        far.continues_from_previous = Some(true);
        let (merged, count) = merge_continuations(vec![head.clone(), far]);
        assert_eq!((merged.len(), count), (2, 0));

        let plain = on_page(ExtractedQuestion::new("unflagged", QuestionType::Nat), 2);
        let (merged, count) = merge_continuations(vec![head, plain]);
        assert_eq!((merged.len(), count), (2, 0));
    }

    #[test]
    fn continuation_does_not_join_records_on_the_same_page() {
        let mut a = on_page(ExtractedQuestion::new("a", QuestionType::Nat), 4);
        a.continues_on_next = Some(true);
        let mut b = on_page(ExtractedQuestion::new("b", QuestionType::Nat), 4);
        b.continues_from_previous = Some(true);
        let (merged, count) = merge_continuations(vec![a, b]);
        assert_eq!((merged.len(), count), (2, 0));
    }

    #[test]
    fn missing_pages_become_render_failures() {
        let images = vec![PageImage {
            page_number: 2,
            data_url: "data:image/png;base64,AA==".into(),
            width: 1,
            height: 1,
        }];
        let gaps = missing_pages(&images, 3);
        let numbers: Vec<u32> = gaps.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, [1, 3]);
        assert!(matches!(gaps[0].error, Some(PageError::RenderFailed { page: 1, .. })));
    }

    #[tokio::test]
    async fn json_output_is_written_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");
        let output = ExtractionOutput {
            questions: vec![ExtractedQuestion::new("q", QuestionType::Nat)],
            pages: Vec::new(),
            info: DocumentInfo::default(),
            stats: ExtractionStats::default(),
            memory: PageMemory::new(),
        };
        write_json_atomic(&path, &output).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"question_statement\": \"q\""));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn bare_question_list_is_written_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.json");
        let questions = vec![
            ExtractedQuestion::new("a", QuestionType::Nat),
            ExtractedQuestion::new("b", QuestionType::Subjective),
        ];
        write_json_atomic(&path, &questions).await.unwrap();

        let back: Vec<ExtractedQuestion> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, questions);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
