//! Image Preparer: turns any image source into an [`EncodedImage`]
//! acceptable to the generation API.
//!
//! Local files are decoded to check their pixel dimensions and downscaled
//! when the long edge exceeds the configured bound; images already within
//! bounds pass through byte-identical. Remote URLs are fetched and wrapped;
//! inline data URIs are passed through without any network traffic.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::models::image::{EncodedImage, ImageSource};

#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    #[error("failed to read image file: {0}")]
    Io(#[from] std::io::Error),

    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to fetch image: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("image fetch returned HTTP {0}")]
    FetchStatus(u16),

    #[error("inline image payload is not an image data URI")]
    UnsupportedDataUri,
}

/// Normalize an image source into an encoded payload.
pub async fn prepare(
    http: &reqwest::Client,
    source: &ImageSource,
    max_edge: u32,
) -> Result<EncodedImage, PrepareError> {
    match source {
        ImageSource::File(path) => {
            let bytes = tokio::fs::read(path).await?;
            prepare_bytes(&bytes, max_edge)
        }
        ImageSource::DataUri(uri) => {
            EncodedImage::from_data_uri(uri).ok_or(PrepareError::UnsupportedDataUri)
        }
        ImageSource::Url(url) => {
            let response = http.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(PrepareError::FetchStatus(status.as_u16()));
            }
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let bytes = response.bytes().await?;
            Ok(wrap_fetched(content_type.as_deref(), &bytes))
        }
    }
}

/// Bound-check decoded bytes and downscale if needed.
///
/// Images within the bound are re-wrapped without re-encoding, so the
/// payload bytes stay identical to the file on disk.
pub fn prepare_bytes(bytes: &[u8], max_edge: u32) -> Result<EncodedImage, PrepareError> {
    let format = image::guess_format(bytes)?;
    let decoded = image::load_from_memory(bytes)?;
    let (width, height) = decoded.dimensions();

    let Some((target_w, target_h)) = bounded_dimensions(width, height, max_edge) else {
        return Ok(EncodedImage::from_bytes(format.to_mime_type(), bytes));
    };

    tracing::debug!(
        width,
        height,
        target_w,
        target_h,
        "Downscaling image to fit the long-edge bound"
    );

    let resized = decoded.resize_exact(target_w, target_h, FilterType::Lanczos3);
    let output_format = encodable_format(format);
    let resized = match output_format {
        // JPEG has no alpha channel.
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8()),
        _ => resized,
    };

    let mut buf = Vec::new();
    resized.write_to(&mut Cursor::new(&mut buf), output_format)?;
    Ok(EncodedImage::from_bytes(output_format.to_mime_type(), &buf))
}

/// Wrap fetched bytes as a data URI, trusting the response media type when
/// it claims to be an image, sniffing the bytes otherwise, and defaulting
/// to PNG when both are ambiguous.
pub fn wrap_fetched(content_type: Option<&str>, bytes: &[u8]) -> EncodedImage {
    let media_type = match content_type {
        Some(ct) if ct.starts_with("image/") => {
            // Strip any charset/parameter suffix.
            ct.split(';').next().unwrap_or(ct).trim().to_string()
        }
        _ => image::guess_format(bytes)
            .map(|f| f.to_mime_type().to_string())
            .unwrap_or_else(|_| "image/png".to_string()),
    };
    EncodedImage::from_bytes(&media_type, bytes)
}

/// Target dimensions for a downscale, or `None` when the image already fits.
///
/// The long edge lands exactly on `max_edge`; the short edge is rounded,
/// preserving aspect ratio to within a pixel.
fn bounded_dimensions(width: u32, height: u32, max_edge: u32) -> Option<(u32, u32)> {
    if width.max(height) <= max_edge {
        return None;
    }

    let aspect = width as f64 / height as f64;
    let (w, h) = if width >= height {
        (max_edge, (max_edge as f64 / aspect).round() as u32)
    } else {
        ((max_edge as f64 * aspect).round() as u32, max_edge)
    };
    Some((w.max(1), h.max(1)))
}

/// Formats we can re-encode with the enabled codecs; anything else becomes JPEG.
fn encodable_format(input: ImageFormat) -> ImageFormat {
    match input {
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP => input,
        _ => ImageFormat::Jpeg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use image::RgbImage;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            image::Rgb([120, 40, 200]),
        ));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    fn decode_payload(encoded: &EncodedImage) -> Vec<u8> {
        let (_, payload) = encoded.as_str().split_once(";base64,").unwrap();
        base64::engine::general_purpose::STANDARD.decode(payload).unwrap()
    }

    #[test]
    fn within_bound_passes_through_byte_identical() {
        let bytes = png_bytes(10, 6);
        let encoded = prepare_bytes(&bytes, 100).unwrap();
        assert_eq!(encoded.media_type(), "image/png");
        assert_eq!(decode_payload(&encoded), bytes);
    }

    #[test]
    fn oversized_image_lands_on_the_bound() {
        let bytes = png_bytes(40, 20);
        let encoded = prepare_bytes(&bytes, 8).unwrap();
        let resized = image::load_from_memory(&decode_payload(&encoded)).unwrap();
        assert_eq!(resized.dimensions(), (8, 4));
    }

    #[test]
    fn portrait_image_bounds_the_height() {
        let bytes = png_bytes(20, 40);
        let encoded = prepare_bytes(&bytes, 8).unwrap();
        let resized = image::load_from_memory(&decode_payload(&encoded)).unwrap();
        assert_eq!(resized.dimensions(), (4, 8));
    }

    #[test]
    fn bounded_dimensions_preserve_aspect() {
        assert_eq!(bounded_dimensions(4000, 3000, 2000), Some((2000, 1500)));
        assert_eq!(bounded_dimensions(3000, 4000, 2000), Some((1500, 2000)));
        assert_eq!(bounded_dimensions(2000, 1000, 2000), None);
        assert_eq!(bounded_dimensions(10_000, 1, 2000), Some((2000, 1)));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = prepare_bytes(b"definitely not an image", 100).unwrap_err();
        assert!(matches!(err, PrepareError::Image(_)));
    }

    #[test]
    fn fetched_media_type_prefers_image_header() {
        let bytes = png_bytes(2, 2);
        let encoded = wrap_fetched(Some("image/jpeg"), &bytes);
        assert_eq!(encoded.media_type(), "image/jpeg");
    }

    #[test]
    fn fetched_media_type_sniffs_when_header_is_not_an_image() {
        let bytes = png_bytes(2, 2);
        assert_eq!(wrap_fetched(Some("text/html"), &bytes).media_type(), "image/png");
        assert_eq!(wrap_fetched(None, &bytes).media_type(), "image/png");
    }

    #[test]
    fn fetched_media_type_defaults_to_png() {
        let encoded = wrap_fetched(Some("application/octet-stream"), b"????");
        assert_eq!(encoded.media_type(), "image/png");
    }

    #[test]
    fn content_type_parameters_are_stripped() {
        let bytes = png_bytes(2, 2);
        let encoded = wrap_fetched(Some("image/webp; charset=binary"), &bytes);
        assert_eq!(encoded.media_type(), "image/webp");
    }

    #[tokio::test]
    async fn data_uri_source_passes_through() {
        let http = reqwest::Client::new();
        let uri = "data:image/png;base64,AAAA";
        let encoded = prepare(&http, &ImageSource::DataUri(uri.to_string()), 2000)
            .await
            .unwrap();
        assert_eq!(encoded.as_str(), uri);
    }

    #[tokio::test]
    async fn non_image_data_uri_is_rejected() {
        let http = reqwest::Client::new();
        let uri = "data:text/plain;base64,AAAA".to_string();
        let err = prepare(&http, &ImageSource::DataUri(uri), 2000).await.unwrap_err();
        assert!(matches!(err, PrepareError::UnsupportedDataUri));
    }
}
