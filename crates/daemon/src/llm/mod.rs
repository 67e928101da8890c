use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};

use crate::error::ProviderError;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Thin REST client for the Gemini `generateContent` and Imagen `predict` endpoints.
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    client: reqwest::Client,
}

/// Decoded image bytes plus the media type the service reported.
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: String, client: reqwest::Client) -> Self {
        Self { api_key, client }
    }

    async fn post(&self, model: &str, method: &str, body: &Value) -> Result<Value, ProviderError> {
        let url = format!("{}/models/{}:{}", GEMINI_API_BASE, model, method);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::request("gemini", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::Status {
                provider: "gemini".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::request("gemini", e))
    }

    /// Asks for a JSON document matching `schema` and returns it parsed.
    pub async fn generate_json(
        &self,
        model: &str,
        prompt: &str,
        schema: Value,
    ) -> Result<Value, ProviderError> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema
            }
        });

        let response = self.post(model, "generateContent", &body).await?;
        let text = response_parts(&response)
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect::<String>();
        if text.trim().is_empty() {
            return Err(ProviderError::malformed("gemini", "response carried no text"));
        }

        serde_json::from_str(&text)
            .map_err(|e| ProviderError::malformed("gemini", format!("invalid JSON: {e}")))
    }

    /// Generates one image. Imagen models go through `predict`; other
    /// models are asked for an inline image part.
    pub async fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        aspect_ratio: &str,
    ) -> Result<GeneratedImage, ProviderError> {
        if model.to_ascii_lowercase().contains("imagen") {
            let body = json!({
                "instances": [{ "prompt": prompt }],
                "parameters": { "sampleCount": 1, "aspectRatio": aspect_ratio }
            });
            let response = self.post(model, "predict", &body).await?;
            let prediction = response
                .get("predictions")
                .and_then(|p| p.get(0))
                .ok_or_else(|| ProviderError::malformed("gemini", "Imagen returned no images"))?;
            let encoded = prediction
                .get("bytesBase64Encoded")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ProviderError::malformed("gemini", "Imagen response missing image payload"))?;
            return Ok(GeneratedImage {
                bytes: decode(encoded)?,
                mime_type: prediction
                    .get("mimeType")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            });
        }

        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] }
        });
        let response = self.post(model, "generateContent", &body).await?;
        let parts = response_parts(&response);

        if let Some(inline) = parts.iter().find_map(|p| p.get("inlineData")) {
            let encoded = inline
                .get("data")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ProviderError::malformed("gemini", "inline image without data"))?;
            return Ok(GeneratedImage {
                bytes: decode(encoded)?,
                mime_type: inline
                    .get("mimeType")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            });
        }

        let text: Vec<&str> = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect();
        let mut reason = "Gemini returned no image data".to_string();
        if !text.is_empty() {
            reason.push_str(&format!(", replied with text: '{}'", text.join(" ")));
        }
        Err(ProviderError::malformed("gemini", reason))
    }
}

fn response_parts(response: &Value) -> Vec<Value> {
    response
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .cloned()
        .unwrap_or_default()
}

fn decode(encoded: &str) -> Result<Vec<u8>, ProviderError> {
    general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| ProviderError::malformed("gemini", format!("bad base64 payload: {e}")))
}
