//! Streaming extraction: emit each page's questions as soon as it is read.
//!
//! Rendering happens up front, before the stream is returned, so fatal input
//! errors still surface as `Err` from [`extract_stream`]. After that the
//! stream yields one item per page of the document, in page order; pages
//! the renderer skipped come through as [`PageError::RenderFailed`]. Pages are read
//! one at a time for the same reason as [`crate::extract`]: each prompt
//! depends on the previous page's reply.
//!
//! Continuations are not merged here; pass the collected records through
//! [`crate::extract::merge_continuations`] if needed.

use crate::assistant::ExamAssistant;
use crate::error::{PageError, QuizError};
use crate::extract::{missing_pages, PageWalker};
use crate::output::{PageExtraction, PageImage};
use crate::pipeline::{input, render};
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-page results.
pub type PageStream = Pin<Box<dyn Stream<Item = Result<PageExtraction, PageError>> + Send>>;

/// Extract questions from a PDF file or URL, page by page.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2quiz::{extract_stream, ExamAssistant};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let assistant = ExamAssistant::from_env()?;
/// let mut pages = extract_stream("paper.pdf", &assistant).await?;
/// while let Some(page) = pages.next().await {
///     match page {
///         Ok(p) => println!("Page {}: {} questions", p.page_number, p.questions.len()),
///         Err(e) => eprintln!("{e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract_stream(
    input_str: impl AsRef<str>,
    assistant: &ExamAssistant,
) -> Result<PageStream, QuizError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming extraction: {}", input_str);
    if assistant.keys().is_empty() {
        return Err(QuizError::NoKeysConfigured);
    }

    let config = assistant.config();
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let info =
        render::read_document_info(resolved.path(), config.render.password.as_deref()).await?;
    let images = render::render_page_images(resolved.path(), &config.render).await?;
    let gaps = missing_pages(&images, info.page_count);

    Ok(stream_with_gaps(assistant.clone(), images, gaps))
}

/// Stream extraction over already-rendered pages.
///
/// Useful when pages come from somewhere other than pdfium, such as a
/// browser canvas export.
pub fn stream_pages(assistant: ExamAssistant, images: Vec<PageImage>) -> PageStream {
    stream_with_gaps(assistant, images, Vec::new())
}

/// Merge rendered pages and placeholder entries for skipped pages, both in
/// page order, into one stream.
fn stream_with_gaps(
    assistant: ExamAssistant,
    images: Vec<PageImage>,
    gaps: Vec<PageExtraction>,
) -> PageStream {
    let walker = PageWalker::new(assistant.config().attach_page_images);
    let state = (
        assistant,
        images.into_iter().peekable(),
        VecDeque::from(gaps),
        walker,
    );

    let s = stream::unfold(state, |(assistant, mut images, mut gaps, mut walker)| async move {
        let gap_next = match (gaps.front(), images.peek()) {
            (Some(gap), Some(image)) => gap.page_number < image.page_number,
            (Some(_), None) => true,
            (None, _) => false,
        };

        let page = if gap_next {
            gaps.pop_front()?
        } else {
            let image = images.next()?;
            walker.step(&assistant, &image).await
        };
        Some((into_item(page), (assistant, images, gaps, walker)))
    });

    s.boxed()
}

fn into_item(page: PageExtraction) -> Result<PageExtraction, PageError> {
    match page.error.clone() {
        None => Ok(page),
        Some(e) => Err(e),
    }
}
