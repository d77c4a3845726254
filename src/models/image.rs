use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A base64 `data:` URI carrying an image and its media type.
///
/// This is the only image representation the generation API accepts, so the
/// type guarantees the `data:image/...;base64,` prefix by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedImage(String);

impl EncodedImage {
    /// Encode raw bytes under the given media type (e.g. "image/png").
    pub fn from_bytes(media_type: &str, bytes: &[u8]) -> Self {
        let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self(format!("data:{media_type};base64,{payload}"))
    }

    /// Accept an existing data URI unchanged. Returns `None` unless the
    /// string declares an image media type.
    pub fn from_data_uri(uri: &str) -> Option<Self> {
        if is_image_data_uri(uri) {
            Some(Self(uri.to_string()))
        } else {
            None
        }
    }

    /// The declared media type, e.g. "image/jpeg".
    pub fn media_type(&self) -> &str {
        let rest = &self.0["data:".len()..];
        rest.split(&[';', ','][..]).next().unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Case-insensitive check for the `data:image/` prefix.
pub fn is_image_data_uri(s: &str) -> bool {
    let prefix = "data:image/";
    s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Where an image comes from before preparation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// A locally selected file (the shopper's photo).
    File(PathBuf),
    /// A remote asset URL (a catalog garment).
    Url(String),
    /// An already-encoded inline image; passed through untouched.
    DataUri(String),
}

impl ImageSource {
    /// Classify a garment reference string: inline data URIs skip the fetch.
    pub fn from_garment_url(url: &str) -> Self {
        if is_image_data_uri(url) {
            ImageSource::DataUri(url.to_string())
        } else {
            ImageSource::Url(url.to_string())
        }
    }
}
