//! Result types for PDF rendering and whole-document extraction.

use crate::error::PageError;
use crate::question::{ExtractedQuestion, PageMemory};
use serde::{Deserialize, Serialize};

/// One rendered page, ready to send to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageImage {
    /// 1-indexed page number.
    pub page_number: u32,
    /// `data:image/png;base64,…`
    pub data_url: String,
    pub width: u32,
    pub height: u32,
}

/// Document properties read without rendering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Outcome of extracting one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageExtraction {
    /// 1-indexed page number.
    pub page_number: u32,
    pub questions: Vec<ExtractedQuestion>,
    /// Raw model reply; empty when the page failed.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub raw_reply: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<PageError>,
}

/// Aggregate counters for a document extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    pub total_questions: usize,
    pub merged_continuations: usize,
    pub render_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything produced by [`crate::extract::extract_document`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// All questions in page order, continuations merged.
    pub questions: Vec<ExtractedQuestion>,
    pub pages: Vec<PageExtraction>,
    pub info: DocumentInfo,
    pub stats: ExtractionStats,
    /// Page memory accumulated over the run.
    pub memory: PageMemory,
}
