//! Gemini Provider
//!
//! Implementation of the LlmProvider trait for Google's Gemini
//! `generateContent` REST API. JSON mode maps to
//! `generationConfig.responseMimeType = "application/json"`.

use async_trait::async_trait;
use serde::Deserialize;

use super::provider::{missing_api_key_error, parse_http_error, LlmProvider};
use super::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, MessageRole, ProviderConfig,
    StopReason, UsageStats,
};
use crate::http_client::build_http_client;

/// Default Gemini API root
const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini provider
pub struct GeminiProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider with the given configuration
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let client = build_http_client(None)?;
        Ok(Self { config, client })
    }

    /// Create a provider sharing an existing HTTP client
    pub fn with_client(config: ProviderConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn endpoint(&self) -> String {
        let root = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(GEMINI_API_URL)
            .trim_end_matches('/');
        format!("{}/models/{}:generateContent", root, self.config.model)
    }

    /// Build the request body for the API
    fn build_request_body(
        &self,
        messages: &[Message],
        system: Option<&str>,
        request_options: &LlmRequestOptions,
    ) -> serde_json::Value {
        let mut system_parts: Vec<serde_json::Value> = Vec::new();
        if let Some(sys) = system {
            system_parts.push(serde_json::json!({ "text": sys }));
        }

        let mut contents: Vec<serde_json::Value> = Vec::new();
        for msg in messages {
            let role = match msg.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "model",
                MessageRole::System => {
                    system_parts.push(serde_json::json!({ "text": msg.content }));
                    continue;
                }
            };
            contents.push(serde_json::json!({
                "role": role,
                "parts": [{ "text": msg.content }]
            }));
        }

        let mut generation_config = serde_json::json!({
            "temperature": request_options
                .temperature_override
                .unwrap_or(self.config.temperature),
            "maxOutputTokens": self.config.max_tokens,
        });
        if request_options.json_mode {
            generation_config["responseMimeType"] = serde_json::json!("application/json");
        }

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if !system_parts.is_empty() {
            body["systemInstruction"] = serde_json::json!({ "parts": system_parts });
        }
        body
    }

    /// Parse a response from the Gemini API
    fn parse_response(&self, response: &GeminiResponse) -> LlmResponse {
        let candidate = response.candidates.first();

        let content = candidate
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter(|p| !p.thought.unwrap_or(false))
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.is_empty());

        let stop_reason = candidate
            .and_then(|c| c.finish_reason.as_deref())
            .map(StopReason::from)
            .unwrap_or(StopReason::EndTurn);

        let usage = response
            .usage_metadata
            .as_ref()
            .map(|u| UsageStats {
                input_tokens: u.prompt_token_count.unwrap_or(0),
                output_tokens: u.candidates_token_count.unwrap_or(0),
                thinking_tokens: u.thoughts_token_count,
            })
            .unwrap_or_default();

        LlmResponse {
            content,
            stop_reason,
            usage,
            model: response
                .model_version
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
        }
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| missing_api_key_error("gemini"))?;

        let body = self.build_request_body(&messages, system.as_deref(), &request_options);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError {
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body_text = response.text().await.map_err(|e| LlmError::NetworkError {
            message: e.to_string(),
        })?;

        if status != 200 {
            return Err(parse_http_error(status, &body_text, "gemini"));
        }

        let gemini_response: GeminiResponse =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ParseError {
                message: format!("Failed to parse response: {}", e),
            })?;

        if let Some(reason) = gemini_response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(LlmError::InvalidRequest {
                message: format!("prompt blocked by provider: {}", reason),
            });
        }

        Ok(self.parse_response(&gemini_response))
    }

    async fn health_check(&self) -> LlmResult<()> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| missing_api_key_error("gemini"))?;

        let root = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(GEMINI_API_URL)
            .trim_end_matches('/');
        let response = self
            .client
            .get(format!("{}/models/{}", root, self.config.model))
            .header("x-goog-api-key", api_key)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError {
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        if status == 200 {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(parse_http_error(status, &body, "gemini"))
        }
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// `generateContent` response format
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
    thought: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    thoughts_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}
