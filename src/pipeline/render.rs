//! PDF rasterisation: render every page to a PNG data-URL via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is
//! synchronous and CPU-bound. `tokio::task::spawn_blocking` moves rendering
//! and PNG encoding onto the blocking pool so the async workers that drive
//! HTTP calls never stall.
//!
//! ## Scale, then cap
//!
//! Pages are rendered at a fixed scale factor (2.0 by default) so text size
//! is consistent across a paper. A pixel cap on each dimension protects
//! against oversized pages (A3 answer sheets, posters).
//!
//! ## Binding pdfium
//!
//! `PDFIUM_LIB_PATH` may name the library file or the directory holding it;
//! otherwise the system library is used.

use crate::config::RenderConfig;
use crate::error::QuizError;
use crate::output::{DocumentInfo, PageImage};
use crate::pipeline::encode::encode_page;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where the PDF bytes come from.
enum PdfSource {
    File(PathBuf),
    Memory(Vec<u8>),
}

impl PdfSource {
    /// Path used in error messages.
    fn label(&self) -> PathBuf {
        match self {
            PdfSource::File(p) => p.clone(),
            PdfSource::Memory(_) => PathBuf::from("<memory>"),
        }
    }
}

/// Render every page of the PDF at `pdf_path`, in page order.
pub async fn render_page_images(
    pdf_path: &Path,
    config: &RenderConfig,
) -> Result<Vec<PageImage>, QuizError> {
    let source = PdfSource::File(pdf_path.to_path_buf());
    let config = config.clone();
    tokio::task::spawn_blocking(move || render_blocking(source, &config))
        .await
        .map_err(|e| QuizError::Internal(format!("Render task panicked: {}", e)))?
}

/// Render every page of an in-memory PDF, in page order.
pub async fn render_page_images_from_bytes(
    bytes: Vec<u8>,
    config: &RenderConfig,
) -> Result<Vec<PageImage>, QuizError> {
    ensure_pdf_bytes(&bytes)?;
    let source = PdfSource::Memory(bytes);
    let config = config.clone();
    tokio::task::spawn_blocking(move || render_blocking(source, &config))
        .await
        .map_err(|e| QuizError::Internal(format!("Render task panicked: {}", e)))?
}

/// Read document properties without rendering.
pub async fn read_document_info(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentInfo, QuizError> {
    let source = PdfSource::File(pdf_path.to_path_buf());
    let pwd = password.map(|s| s.to_string());
    tokio::task::spawn_blocking(move || info_blocking(source, pwd.as_deref()))
        .await
        .map_err(|e| QuizError::Internal(format!("Metadata task panicked: {}", e)))?
}

/// Read document properties of an in-memory PDF.
pub async fn read_document_info_from_bytes(
    bytes: Vec<u8>,
    password: Option<&str>,
) -> Result<DocumentInfo, QuizError> {
    ensure_pdf_bytes(&bytes)?;
    let source = PdfSource::Memory(bytes);
    let pwd = password.map(|s| s.to_string());
    tokio::task::spawn_blocking(move || info_blocking(source, pwd.as_deref()))
        .await
        .map_err(|e| QuizError::Internal(format!("Metadata task panicked: {}", e)))?
}

fn ensure_pdf_bytes(bytes: &[u8]) -> Result<(), QuizError> {
    if bytes.len() >= 4 && &bytes[..4] == b"%PDF" {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(QuizError::NotAPdf {
        path: PathBuf::from("<memory>"),
        magic,
    })
}

/// Bind to the pdfium library.
pub fn bind_pdfium() -> Result<Pdfium, QuizError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(p) if !p.trim().is_empty() => {
            let path = PathBuf::from(p.trim());
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            Pdfium::bind_to_library(&lib)
        }
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| QuizError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    source: PdfSource,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, QuizError> {
    let label = source.label();
    let loaded = match source {
        PdfSource::File(path) => pdfium.load_pdf_from_file(&path, password),
        PdfSource::Memory(bytes) => pdfium.load_pdf_from_byte_vec(bytes, password),
    };

    loaded.map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                QuizError::WrongPassword { path: label }
            } else {
                QuizError::PasswordRequired { path: label }
            }
        } else {
            QuizError::CorruptPdf {
                path: label,
                detail: err_str,
            }
        }
    })
}

/// Blocking implementation of page rendering.
fn render_blocking(source: PdfSource, config: &RenderConfig) -> Result<Vec<PageImage>, QuizError> {
    let pdfium = bind_pdfium()?;
    let path = source.label();
    let document = open_document(&pdfium, source, config.password.as_deref())?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);
    if total_pages == 0 {
        return Err(QuizError::EmptyDocument { path });
    }

    let cap = config.max_rendered_pixels as i32;
    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(config.scale)
        .set_maximum_width(cap)
        .set_maximum_height(cap);

    // A page that fails to rasterise is skipped; callers detect the gap by
    // page number. Only a document with no renderable page is an error.
    let mut results = Vec::with_capacity(total_pages);
    let mut first_failure = None;
    for idx in 0..total_pages {
        match render_one(pages, idx, &render_config) {
            Ok(image) => results.push(image),
            Err(e) => {
                warn!("Skipping page {}: {}", idx + 1, e);
                first_failure.get_or_insert(e);
            }
        }
    }

    match (results.is_empty(), first_failure) {
        (true, Some(e)) => Err(e),
        _ => Ok(results),
    }
}

fn render_one(
    pages: &PdfPages<'_>,
    idx: usize,
    render_config: &PdfRenderConfig,
) -> Result<PageImage, QuizError> {
    let failed = |detail: String| QuizError::RasterisationFailed {
        page: idx + 1,
        detail,
    };

    let page = pages
        .get(idx as u16)
        .map_err(|e| failed(format!("{:?}", e)))?;
    let bitmap = page
        .render_with_config(render_config)
        .map_err(|e| failed(format!("{:?}", e)))?;

    let image = bitmap.as_image();
    let data_url =
        encode_page(&image).map_err(|e| failed(format!("PNG encoding failed: {}", e)))?;
    debug!(
        "Rendered page {} → {}x{} px",
        idx + 1,
        image.width(),
        image.height()
    );

    Ok(PageImage {
        page_number: idx as u32 + 1,
        data_url,
        width: image.width(),
        height: image.height(),
    })
}

/// Blocking implementation of metadata extraction.
fn info_blocking(source: PdfSource, password: Option<&str>) -> Result<DocumentInfo, QuizError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, source, password)?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(tag)
            .map(|t| t.value().to_string())
            .filter(|v| !v.is_empty())
    };

    Ok(DocumentInfo {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bytes_without_pdf_magic_are_rejected_before_binding() {
        let err = render_page_images_from_bytes(b"GIF89a".to_vec(), &RenderConfig::default())
            .await
            .unwrap_err();
        match err {
            QuizError::NotAPdf { magic, .. } => assert_eq!(&magic, b"GIF8"),
            other => panic!("expected NotAPdf, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn short_buffer_is_not_a_pdf() {
        let err = render_page_images_from_bytes(vec![b'%'], &RenderConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QuizError::NotAPdf { .. }));
    }
}
