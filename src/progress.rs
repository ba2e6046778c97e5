//! Progress-callback trait for per-page extraction events.
//!
//! Pass an [`Arc<dyn ExtractionProgressCallback>`] to
//! [`crate::extract::extract_document_with_progress`] to receive events as
//! each page is rendered and read. Callers forward them wherever they like:
//! a terminal progress bar, a channel, a job record.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2quiz::ExtractionProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct QuestionCounter {
//!     found: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for QuestionCounter {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, question_count: usize) {
//!         let so_far = self.found.fetch_add(question_count, Ordering::SeqCst) + question_count;
//!         eprintln!("Page {}/{}: {} questions so far", page_num, total_pages, so_far);
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by document extraction as it processes each page.
///
/// All methods default to no-ops so implementors override only what they
/// need. Pages are processed in order, one at a time, but the trait is
/// `Send + Sync` so the same callback can be shared across documents.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after rendering, before the first page is sent.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the request for a page is sent.
    ///
    /// `page_num` is 1-indexed.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page's reply has been parsed.
    ///
    /// `question_count` may be zero: a page of instructions is not a failure.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, question_count: usize) {
        let _ = (page_num, total_pages, question_count);
    }

    /// Called when a page's request failed after retries.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after all pages have been attempted.
    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// Callback that ignores every event.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Shared callback handle.
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
