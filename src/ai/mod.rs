mod gemini;

pub use gemini::GeminiService;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::payload::ImagePayload;

/// Output image shape (width:height) accepted by the image model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[default]
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "16:9")]
    Landscape16x9,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait9x16,
        AspectRatio::Landscape16x9,
    ];

    /// The wire value, e.g. `"9:16"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape16x9 => "16:9",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == s.trim())
            .ok_or_else(|| {
                format!("unsupported aspect ratio `{s}` (expected one of 1:1, 3:4, 4:3, 9:16, 16:9)")
            })
    }
}

/// Trait for image generation back-ends.
///
/// The crate ships with [`GeminiService`]. The batch runner only talks to
/// this trait, so tests can drive it with a scripted generator.
///
/// # Example
///
/// ```rust,no_run
/// use gemini_batch::ai::{AspectRatio, GeminiService, ImageGenerator};
///
/// # async fn example() -> anyhow::Result<()> {
/// let service = GeminiService::new("AIza...".into(), "gemini-2.5-flash-image".into());
/// let image = service.generate("a red fox", AspectRatio::Square, &[]).await?;
/// println!("Got {} image", image.mime_type());
/// # Ok(())
/// # }
/// ```
#[async_trait::async_trait]
pub trait ImageGenerator: Send + Sync {
    /// The display name of this service (e.g. "Gemini").
    fn name(&self) -> &str;

    /// Generate exactly one image.
    ///
    /// * `prompt` — The text prompt
    /// * `aspect_ratio` — Requested output shape
    /// * `references` — Reference images steering the generation, possibly empty
    async fn generate(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        references: &[ImagePayload],
    ) -> Result<ImagePayload>;
}

/// Pull the first inline image out of a `generateContent` response.
///
/// The REST API answers in camelCase (`inlineData`/`mimeType`) but the
/// snake_case spelling is accepted too. A missing MIME type means PNG.
/// Image data that does not decode as base64 fails the call.
pub fn extract_image(response: &serde_json::Value) -> Result<ImagePayload> {
    let parts = response["candidates"][0]["content"]["parts"]
        .as_array()
        .context("No image data found in response.")?;

    for part in parts {
        let inline = match part.get("inlineData").or_else(|| part.get("inline_data")) {
            Some(inline) => inline,
            None => continue,
        };
        let data = match inline["data"].as_str() {
            Some(data) if !data.is_empty() => data,
            _ => continue,
        };
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(|v| v.as_str())
            .unwrap_or("image/png");
        let payload = ImagePayload::new(mime_type, data);
        payload
            .decode()
            .context("Image data in response is not valid base64")?;
        return Ok(payload);
    }

    anyhow::bail!("No image data found in response.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── AspectRatio ──────────────────────────────────────────────────

    #[test]
    fn aspect_ratio_parse_all() {
        for ratio in AspectRatio::ALL {
            assert_eq!(ratio.as_str().parse::<AspectRatio>().unwrap(), ratio);
        }
    }

    #[test]
    fn aspect_ratio_rejects_unknown() {
        assert!("2:3".parse::<AspectRatio>().is_err());
        assert!("".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn aspect_ratio_default_is_portrait_9_16() {
        assert_eq!(AspectRatio::default(), AspectRatio::Portrait9x16);
    }

    #[test]
    fn aspect_ratio_serde_uses_wire_value() {
        let json = serde_json::to_string(&AspectRatio::Landscape16x9).unwrap();
        assert_eq!(json, r#""16:9""#);
        let back: AspectRatio = serde_json::from_str(r#""3:4""#).unwrap();
        assert_eq!(back, AspectRatio::Portrait3x4);
    }

    // ── extract_image ────────────────────────────────────────────────

    #[test]
    fn extract_image_camel_case() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Here you go" },
                    { "inlineData": { "mimeType": "image/jpeg", "data": "AAAA" } }
                ]}
            }]
        });
        let image = extract_image(&response).unwrap();
        assert_eq!(image.mime_type(), "image/jpeg");
        assert_eq!(image.data(), "AAAA");
    }

    #[test]
    fn extract_image_snake_case_defaults_to_png() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [ { "inline_data": { "data": "BBBB" } } ] }
            }]
        });
        let image = extract_image(&response).unwrap();
        assert_eq!(image.mime_type(), "image/png");
    }

    #[test]
    fn extract_image_text_only_fails() {
        let response = json!({
            "candidates": [{ "content": { "parts": [ { "text": "I can't draw that" } ] } }]
        });
        let err = extract_image(&response).unwrap_err();
        assert_eq!(err.to_string(), "No image data found in response.");
    }

    #[test]
    fn extract_image_no_candidates_fails() {
        assert!(extract_image(&json!({ "candidates": [] })).is_err());
        assert!(extract_image(&json!({})).is_err());
    }

    #[test]
    fn extract_image_skips_empty_data() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [
                    { "inlineData": { "mimeType": "image/png", "data": "" } },
                    { "inlineData": { "mimeType": "image/webp", "data": "CCCC" } }
                ]}
            }]
        });
        assert_eq!(extract_image(&response).unwrap().mime_type(), "image/webp");
    }

    #[test]
    fn extract_image_rejects_invalid_base64() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [ { "inlineData": { "data": "not base64!!" } } ] }
            }]
        });
        let err = extract_image(&response).unwrap_err();
        assert_eq!(err.to_string(), "Image data in response is not valid base64");
    }
}
