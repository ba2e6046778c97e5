//! Image encoding: `DynamicImage` → `data:image/png;base64,…` URL, and the
//! reverse split used when building a request.
//!
//! PNG is chosen over JPEG because it is lossless: exam pages are dense with
//! subscripts, option labels and thin diagram lines that JPEG artefacts smear.
//!
//! Page images travel through the public API as data-URLs because that is
//! what UI callers already hold (a canvas export, an `<img src>`). The request
//! body wants the mime type and the bare base64 payload separately.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;
use tracing::debug;

/// Mime type assumed for bare base64 payloads.
pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Encode a rasterised page as a PNG data-URL.
pub fn encode_page(img: &DynamicImage) -> Result<String, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(format!("data:{DEFAULT_IMAGE_MIME};base64,{b64}"))
}

static RE_DATA_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:([A-Za-z0-9.+/-]+)?(?:;[^,;]+)*;base64,").unwrap());

/// Split an image string into `(mime_type, base64_payload)`.
///
/// A leading `data:<mime>;base64,` prefix is removed and its mime type
/// returned; a bare payload is assumed to be PNG.
pub fn split_data_url(image: &str) -> (&str, &str) {
    let trimmed = image.trim();
    match RE_DATA_URL.captures(trimmed) {
        Some(caps) => {
            let prefix_len = caps.get(0).map_or(0, |m| m.end());
            let mime = caps.get(1).map_or(DEFAULT_IMAGE_MIME, |m| m.as_str());
            (mime, &trimmed[prefix_len..])
        }
        None => (DEFAULT_IMAGE_MIME, trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image_as_data_url() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let url = encode_page(&img).expect("encode should succeed");
        assert!(url.starts_with("data:image/png;base64,"));

        let (mime, payload) = split_data_url(&url);
        assert_eq!(mime, "image/png");
        let decoded = STANDARD.decode(payload).expect("valid base64");
        // PNG signature
        assert_eq!(&decoded[..4], b"\x89PNG");
    }

    #[test]
    fn split_keeps_declared_mime() {
        assert_eq!(split_data_url("data:image/webp;base64,AAAA"), ("image/webp", "AAAA"));
    }

    #[test]
    fn split_handles_extra_parameters() {
        assert_eq!(
            split_data_url("data:image/png;name=page1.png;base64,QQ=="),
            ("image/png", "QQ==")
        );
    }

    #[test]
    fn split_bare_payload_defaults_to_png() {
        assert_eq!(split_data_url(" iVBORw0KGgo= "), ("image/png", "iVBORw0KGgo="));
    }
}
