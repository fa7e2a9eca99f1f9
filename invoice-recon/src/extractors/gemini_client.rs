//! Gemini Vision Client
//!
//! Sends an invoice image plus an instruction prompt to the Gemini
//! `generateContent` endpoint and returns the model's raw field map.
//!
//! # Architecture
//! Implements `ModelInference`. The client only transports and parses: the
//! returned JSON is heterogeneous and is mapped onto the field schema by the
//! schema normalizer.
//!
//! # API Reference
//! - Endpoint: `{base_url}/v1beta/models/{model}:generateContent`
//! - Auth: `x-goog-api-key` header
//! - Rate limit: one request per `min_request_interval_ms` (default 1 s)

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::prompts::PromptKind;
use crate::types::{DocumentImage, ExtractionError, ModelInference};

/// Gemini API base URL
const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

/// Model backend configuration (`[model]` section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Disable to run the pattern branch only
    pub enabled: bool,
    /// API key (overridden by GOOGLE_AI_API_KEY)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub prompt: PromptKind,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub request_timeout_secs: u64,
    /// Minimum spacing between consecutive requests (0 disables rate limiting)
    pub min_request_interval_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: GEMINI_API_URL.to_string(),
            model: "gemini-1.5-flash".to_string(),
            prompt: PromptKind::Standard,
            temperature: 0.1,
            top_p: 0.8,
            top_k: 40,
            max_output_tokens: 4096,
            request_timeout_secs: 120,
            min_request_interval_ms: 1000,
        }
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

type DirectRateLimiter = governor::RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Gemini vision-language model client
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    prompt: PromptKind,
    generation_config: Value,
    rate_limiter: Option<DirectRateLimiter>,
}

impl GeminiClient {
    /// Create client from config with an already-resolved API key
    ///
    /// # Errors
    /// Returns `NotAvailable` for a blank key and `Internal` if the HTTP client cannot be built
    pub fn new(config: &ModelConfig, api_key: String) -> Result<Self, ExtractionError> {
        if api_key.trim().is_empty() {
            return Err(ExtractionError::NotAvailable("Gemini API key is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("invoice-recon/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| ExtractionError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let rate_limiter = governor::Quota::with_period(Duration::from_millis(
            config.min_request_interval_ms,
        ))
        .map(governor::RateLimiter::direct);

        Ok(Self {
            client,
            api_key,
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                config.base_url.trim_end_matches('/'),
                config.model
            ),
            prompt: config.prompt,
            generation_config: json!({
                "temperature": config.temperature,
                "topP": config.top_p,
                "topK": config.top_k,
                "maxOutputTokens": config.max_output_tokens,
            }),
            rate_limiter,
        })
    }

    fn request_body(&self, image: &DocumentImage) -> Value {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&image.bytes);
        json!({
            "contents": [{
                "parts": [
                    {"text": self.prompt.text()},
                    {"inline_data": {"mime_type": image.mime_type, "data": encoded}}
                ]
            }],
            "generationConfig": self.generation_config,
        })
    }

    /// Send one generateContent request and return the concatenated response text
    async fn generate(&self, image: &DocumentImage) -> Result<String, ExtractionError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(image))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractionError::Timeout(format!("Gemini request timed out: {}", e))
                } else {
                    ExtractionError::Network(format!("Gemini request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api(format!(
                "Gemini API returned {}: {}",
                status,
                body.trim()
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(format!("Failed to parse Gemini response: {}", e)))?;

        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ExtractionError::Api(format!("Request blocked: {}", reason)));
        }

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ExtractionError::Parse("Empty response from Gemini API".to_string()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ExtractionError::Parse(format!(
                "Empty response from Gemini API (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(text)
    }
}

#[async_trait]
impl ModelInference for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn infer(&self, image: &DocumentImage) -> Result<Value, ExtractionError> {
        debug!(
            path = %image.path.display(),
            mime = %image.mime_type,
            bytes = image.bytes.len(),
            "Sending image to Gemini"
        );

        if !image.mime_type.starts_with("image/") {
            return Err(ExtractionError::UnsupportedFormat(format!(
                "{} is {}, not an image",
                image.path.display(),
                image.mime_type
            )));
        }

        let raw = self.generate(image).await?;
        let cleaned = clean_response_text(&raw);

        serde_json::from_str(cleaned).map_err(|e| {
            warn!(error = %e, "Gemini response is not valid JSON");
            ExtractionError::Parse(format!("Invalid JSON response: {}", e))
        })
    }
}

/// Strip markdown code fences and keep the outermost `{...}` span
pub fn clean_response_text(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    let text = text.trim();

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_json_fence() {
        let raw = "```json\n{\"vendor\": {\"value\": \"ACME\"}}\n```";
        assert_eq!(clean_response_text(raw), "{\"vendor\": {\"value\": \"ACME\"}}");
    }

    #[test]
    fn test_clean_strips_bare_fence_and_prose() {
        let raw = "```\nHere you go: {\"a\": 1} hope that helps\n```";
        assert_eq!(clean_response_text(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_clean_leaves_non_json_alone() {
        assert_eq!(clean_response_text("  no braces here "), "no braces here");
    }

    #[tokio::test]
    async fn test_non_image_rejected_before_request() {
        let config = ModelConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            min_request_interval_ms: 0,
            ..ModelConfig::default()
        };
        let client = GeminiClient::new(&config, "key".to_string()).unwrap();
        let document = DocumentImage {
            path: "notes.pdf".into(),
            bytes: b"%PDF-1.4".to_vec(),
            mime_type: "application/pdf".to_string(),
        };

        let err = client.infer(&document).await.unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_blank_api_key_rejected() {
        let result = GeminiClient::new(&ModelConfig::default(), "   ".to_string());
        assert!(matches!(result, Err(ExtractionError::NotAvailable(_))));
    }

    #[test]
    fn test_endpoint_and_body_shape() {
        let config = ModelConfig {
            base_url: "http://localhost:9999/".to_string(),
            min_request_interval_ms: 0,
            ..ModelConfig::default()
        };
        let client = GeminiClient::new(&config, "key".to_string()).unwrap();
        assert_eq!(
            client.endpoint,
            "http://localhost:9999/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert!(client.rate_limiter.is_none());

        let image = DocumentImage {
            path: "a.png".into(),
            bytes: vec![1, 2, 3],
            mime_type: "image/png".to_string(),
        };
        let body = client.request_body(&image);
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "AQID");
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let config = ModelConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            min_request_interval_ms: 0,
            request_timeout_secs: 5,
            ..ModelConfig::default()
        };
        let client = GeminiClient::new(&config, "key".to_string()).unwrap();
        let image = DocumentImage {
            path: "a.png".into(),
            bytes: vec![0x89, b'P', b'N', b'G'],
            mime_type: "image/png".to_string(),
        };

        let err = client.infer(&image).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Network(_)));
    }
}
