use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Image file extensions accepted as reference images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "heic", "heif"];

/// A self-describing encoded image: MIME type plus base64 data.
///
/// This is the unit exchanged with the Gemini API in both directions. It
/// renders as a data URL (`data:image/png;base64,...`) and parses back from
/// one, so two payloads are equal exactly when their data URLs are equal.
///
/// # Example
///
/// ```rust
/// use gemini_batch::payload::ImagePayload;
///
/// let payload = ImagePayload::from_bytes("image/png", b"\x89PNG");
/// let url = payload.to_string();
/// assert!(url.starts_with("data:image/png;base64,"));
/// assert_eq!(url.parse::<ImagePayload>().unwrap(), payload);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImagePayload {
    mime_type: String,
    data: String,
}

impl ImagePayload {
    /// Wrap already base64-encoded data.
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Encode raw image bytes.
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(mime_type, STANDARD.encode(bytes))
    }

    /// Read an image file, detecting its MIME type from the extension and
    /// falling back to sniffing the content.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        let mime_type = mime_from_path(path)
            .or_else(|| mime_from_content(&bytes))
            .unwrap_or("image/png");
        Ok(Self::from_bytes(mime_type, &bytes))
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The base64 data without the `data:` prefix.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Decode the base64 data into raw image bytes.
    pub fn decode(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.data.as_bytes())
            .context("Image payload is not valid base64")
    }

    /// File extension matching the MIME type (`png` when unknown).
    pub fn extension(&self) -> &'static str {
        match self.mime_type.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/heic" => "heic",
            "image/heif" => "heif",
            _ => "png",
        }
    }
}

impl fmt::Display for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime_type, self.data)
    }
}

impl FromStr for ImagePayload {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("data:")
            .context("Image payload must start with `data:`")?;
        let (mime_type, data) = rest
            .split_once(";base64,")
            .context("Image payload is missing `;base64,`")?;
        if mime_type.is_empty() || data.is_empty() {
            anyhow::bail!("Image payload has an empty MIME type or body");
        }
        Ok(Self::new(mime_type, data))
    }
}

impl Serialize for ImagePayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ImagePayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Check if a file has a supported image extension.
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// MIME type for a supported image extension.
pub fn mime_from_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

fn mime_from_content(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        image::ImageFormat::Png => Some("image/png"),
        image::ImageFormat::Jpeg => Some("image/jpeg"),
        image::ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}
