use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;

use super::{AspectRatio, ImageGenerator, extract_image};
use crate::payload::ImagePayload;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiService {
    api_key: String,
    model: String,
    client: Client,
}

impl GeminiService {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: Client::new(),
        }
    }
}

/// Build the `generateContent` body: reference images first, then the prompt.
fn build_request_body(
    prompt: &str,
    aspect_ratio: AspectRatio,
    references: &[ImagePayload],
) -> serde_json::Value {
    let mut parts: Vec<serde_json::Value> = references
        .iter()
        .map(|image| {
            json!({
                "inline_data": {
                    "mime_type": image.mime_type(),
                    "data": image.data()
                }
            })
        })
        .collect();
    parts.push(json!({ "text": prompt }));

    json!({
        "contents": [ { "parts": parts } ],
        "generationConfig": {
            "responseModalities": ["IMAGE"],
            "imageConfig": {
                "aspectRatio": aspect_ratio.as_str()
            }
        }
    })
}

#[async_trait::async_trait]
impl ImageGenerator for GeminiService {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn generate(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        references: &[ImagePayload],
    ) -> Result<ImagePayload> {
        let url = format!("{API_BASE}/{}:generateContent", self.model);
        let body = build_request_body(prompt, aspect_ratio, references);

        log::debug!(
            "Gemini request: model={} aspect={} references={}",
            self.model,
            aspect_ratio,
            references.len()
        );

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = resp.status();
        let text = resp.text().await.context("Failed to read Gemini response")?;

        if !status.is_success() {
            anyhow::bail!("Gemini API error ({}): {}", status, text);
        }

        let json: serde_json::Value =
            serde_json::from_str(&text).context("Failed to parse Gemini response JSON")?;

        extract_image(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_puts_references_before_prompt() {
        let refs = vec![
            ImagePayload::new("image/png", "AAAA"),
            ImagePayload::new("image/jpeg", "BBBB"),
        ];
        let body = build_request_body("a girl in the rain", AspectRatio::Portrait9x16, &refs);

        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[0]["inline_data"]["data"], "AAAA");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts[2]["text"], "a girl in the rain");
    }

    #[test]
    fn request_body_carries_aspect_ratio() {
        let body = build_request_body("x", AspectRatio::Landscape4x3, &[]);
        assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "4:3");
        assert_eq!(body["generationConfig"]["responseModalities"][0], "IMAGE");
        assert_eq!(body["contents"][0]["parts"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn service_name() {
        let service = GeminiService::new("key".into(), "gemini-2.5-flash-image".into());
        assert_eq!(service.name(), "Gemini");
    }
}
