//! Error types for the edgequake-pdf2quiz library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`QuizError`]: **fatal** for the call that produced it: no keys
//!   configured, the API rejected the request, the reply could not be turned
//!   into the records the caller asked for, or the PDF could not be opened.
//!
//! * [`PageError`]: **non-fatal**: one page of a document failed to render
//!   or extract while the rest of the document is fine. Stored inside
//!   [`crate::extract::PageExtraction`] so a single bad page does not lose
//!   the whole exam paper.
//!
//! Two failure modes are *not* error values: a reply to an
//! extraction request that contains no decodable JSON yields an empty list,
//! and an undecodable validation reply yields a "treat as correct" verdict
//! flagged as degraded. Both are logged at `warn`.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2quiz library.
#[derive(Debug, Error)]
pub enum QuizError {
    // ── Credential errors ─────────────────────────────────────────────────
    /// The key rotator holds no credentials.
    #[error("No Gemini API keys configured.\nSet GEMINI_API_KEYS (comma-separated) or call set_api_keys().")]
    NoKeysConfigured,

    // ── API errors ────────────────────────────────────────────────────────
    /// Non-retryable HTTP failure, or retries exhausted on a retryable one.
    #[error("Gemini API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The provider's safety filter blocked the prompt or the answer.
    #[error("Content blocked by provider: {reason}")]
    ContentBlocked { reason: String },

    /// The response envelope did not have the expected shape.
    #[error("Malformed API response: {0}")]
    MalformedResponse(String),

    /// The request never produced an HTTP status (DNS, connect, timeout…).
    #[error("HTTP transport error: {0}")]
    Http(String),

    // ── Reply parsing errors ──────────────────────────────────────────────
    /// Generated-question reply had no decodable JSON array.
    #[error("Could not parse generated questions: {0}")]
    GenerationParse(String),

    /// Solution reply had no decodable JSON.
    #[error("Could not parse generated solutions: {0}")]
    SolutionParse(String),

    /// A generated question lacks a required field.
    #[error("Generated question #{index} is incomplete: missing {field}")]
    IncompleteQuestion { index: usize, field: &'static str },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The document opened but has no pages to process.
    #[error("PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QuizError {
    /// True for API failures the invoker retries: HTTP 429 and 5xx.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QuizError::ApiError { status, .. } if is_retryable_status(*status))
    }
}

/// HTTP statuses worth another attempt with the next key.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}

/// A non-fatal error for a single page of a document.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation or encoding failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: u32, detail: String },

    /// The extraction call failed (API error, blocked content, no keys…).
    #[error("Page {page}: extraction failed: {detail}")]
    ExtractionFailed { page: u32, detail: String },
}

impl PageError {
    /// 1-indexed page number the error belongs to.
    pub fn page(&self) -> u32 {
        match self {
            PageError::RenderFailed { page, .. } | PageError::ExtractionFailed { page, .. } => *page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_carries_status_and_message() {
        let e = QuizError::ApiError {
            status: 403,
            message: "API key not valid".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("403"), "got: {msg}");
        assert!(msg.contains("API key not valid"));
    }

    #[test]
    fn empty_document_names_the_file() {
        let e = QuizError::EmptyDocument { path: PathBuf::from("blank.pdf") };
        assert_eq!(e.to_string(), "PDF 'blank.pdf' has no pages");
        assert!(!e.is_retryable());
    }

    #[test]
    fn retryable_classification() {
        let rate = QuizError::ApiError { status: 429, message: String::new() };
        let server = QuizError::ApiError { status: 503, message: String::new() };
        let client = QuizError::ApiError { status: 400, message: String::new() };
        assert!(rate.is_retryable());
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(!QuizError::NoKeysConfigured.is_retryable());
    }

    #[test]
    fn incomplete_question_display() {
        let e = QuizError::IncompleteQuestion { index: 2, field: "answer" };
        assert!(e.to_string().contains("#2"));
        assert!(e.to_string().contains("answer"));
    }

    #[test]
    fn page_error_reports_page() {
        let e = PageError::ExtractionFailed { page: 7, detail: "boom".into() };
        assert_eq!(e.page(), 7);
        assert!(e.to_string().contains("Page 7"));
    }
}
