//! Gemini API client
//!
//! Both pipeline stages talk to the same `generateContent` endpoint; the
//! analysis call and the render call differ only in model and payload, so a
//! single typed client covers both.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::GeminiSettings;

/// Errors from the Gemini client
#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("Gemini API key not configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
}

impl GeminiError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            GeminiError::NotConfigured => false,
            GeminiError::Http(_) => true,
            GeminiError::Api { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
        }
    }
}

/// One content part: text or inline binary data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
        }
    }
}

/// Base64-encoded binary payload with its MIME type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// An ordered list of parts with an optional role
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }

    /// Bare text content, as used for system instructions
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![Part::text(text)],
        }
    }
}

/// Capability flags attached to a request
#[derive(Debug, Clone, Default, Serialize)]
pub struct Tool {
    #[serde(rename = "google_search", skip_serializing_if = "Option::is_none")]
    pub google_search: Option<serde_json::Value>,
}

impl Tool {
    /// Enable real-time web search grounding
    pub fn google_search() -> Self {
        Self {
            google_search: Some(serde_json::json!({})),
        }
    }
}

/// Image output configuration
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub aspect_ratio: String,
    pub image_size: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,
}

/// Request body for `models/{model}:generateContent`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
    pub grounding_metadata: Option<GroundingMetadata>,
}

/// Citation metadata from a search-grounded call
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GroundingChunk {
    pub web: Option<WebSource>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebSource {
    pub uri: Option<String>,
    pub title: Option<String>,
}

impl GenerateContentResponse {
    /// Joined text of the first candidate, or None if it produced no text
    pub fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let content = candidate.content.as_ref()?;
        let parts: Vec<&str> = content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .filter(|text| !text.trim().is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    /// Completion reason of the first candidate
    pub fn finish_reason(&self) -> Option<&str> {
        self.candidates.first()?.finish_reason.as_deref()
    }

    /// First content part carrying inline binary data, across all candidates
    pub fn first_inline_data(&self) -> Option<&InlineData> {
        self.candidates
            .iter()
            .filter_map(|candidate| candidate.content.as_ref())
            .flat_map(|content| content.parts.iter())
            .find_map(|part| part.inline_data.as_ref())
    }
}

/// Gemini API client shared by both pipeline stages
#[derive(Debug)]
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl GeminiClient {
    /// Create a new client; the API key falls back to GEMINI_API_KEY
    pub fn new(settings: &GeminiSettings) -> Self {
        let api_key = settings
            .api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .filter(|key| !key.is_empty());

        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(settings.timeout_secs))
                .build()
                .unwrap(),
            api_key,
            base_url: settings.base_url.clone(),
        }
    }

    /// Check if an API key is configured
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Send a generateContent request
    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let api_key = self.api_key.as_ref().ok_or(GeminiError::NotConfigured)?;

        debug!("sending generateContent request to {}", model);

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, model
            ))
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Gemini API error: {} - {}", status, truncate(&body, 2000));
            let message = extract_error_message(&body).unwrap_or_else(|| status.to_string());
            return Err(GeminiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

/// Pull the human-readable message out of a Gemini error body
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
}

fn truncate(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{}... (truncated)", truncated)
}
