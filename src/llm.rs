use std::future::Future;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::error::GenerationError;

/// An opaque text-generation service: prompt in, answer out.
pub trait CompletionClient: Send + Sync {
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String, GenerationError>> + Send;
}

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn from_env() -> Result<Self> {
        let api_key = dotenv::var("GOOGLE_API_KEY").context("GOOGLE_API_KEY required")?;
        let base_url = dotenv::var("GEMINI_BASE_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());
        let model =
            dotenv::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".to_string());

        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            model,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Resolve the generateContent endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let model = self.model.trim_start_matches("models/");
        format!("{}/models/{}:generateContent", base, model)
    }
}

impl CompletionClient for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }],
            }],
            "generationConfig": {
                "temperature": 0.3,
                "maxOutputTokens": 8192,
            },
        });

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(GenerationError::Request)?;

        let status = resp.status();
        let text = resp.text().await.map_err(GenerationError::Request)?;
        if !status.is_success() {
            return Err(GenerationError::Status { status, body: text });
        }

        let json: Value = serde_json::from_str(&text)?;
        extract_text(&json)
    }
}

/// Pull the answer out of a generateContent response.
fn extract_text(json: &Value) -> Result<String, GenerationError> {
    let parts = json["candidates"]
        .get(0)
        .and_then(|c| c["content"]["parts"].as_array());

    let Some(parts) = parts else {
        if let Some(reason) = json["promptFeedback"]["blockReason"].as_str() {
            return Err(GenerationError::Blocked(reason.to_string()));
        }
        return Err(GenerationError::Empty);
    };

    let text: String = parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect();

    if text.trim().is_empty() {
        return Err(GenerationError::Empty);
    }
    Ok(text)
}
