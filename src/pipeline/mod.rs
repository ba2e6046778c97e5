//! Pipeline stages for turning exam pages into question records.
//!
//! Each submodule implements one step and is tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ gemini ──▶ sanitize ──▶ parse
//! (URL/path) (pdfium)  (data URL)  (HTTP)    (cleanup)    (JSON → records)
//! ```
//!
//! 1. [`input`]: canonicalise the user-supplied path or URL to a local file
//! 2. [`render`]: rasterise every page on the blocking pool
//! 3. [`encode`]: PNG data-URLs, and splitting them for the request body
//! 4. [`gemini`]: the only stage with network I/O; key rotation and backoff
//! 5. [`sanitize`]: strip fences and invisible characters from replies
//! 6. [`parse`]: locate the JSON value in a reply and map it to records

pub mod encode;
pub mod gemini;
pub mod input;
pub mod parse;
pub mod render;
pub mod sanitize;
