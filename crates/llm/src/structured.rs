//! Structured Invocation
//!
//! Executes one JSON-contract request against a provider:
//!
//! 1. Embeds the output type's JSON schema in the system prompt and enables
//!    the provider's JSON mode
//! 2. Bounds the call with `tokio::time::timeout`
//! 3. Reports token usage for the call to an optional [`CallObserver`],
//!    whether or not the response turns out to be usable
//! 4. Extracts the JSON object from the text, deserializes it into the
//!    output type and runs the type's own contract check
//!
//! Failures map onto distinct `LlmError` variants: `Timeout`,
//! `EmptyResponse`, `ParseError` (not JSON at all) and `ContractViolation`
//! (JSON that does not satisfy the output type).

use std::sync::Arc;
use std::time::{Duration, Instant};

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tracing::debug;

use medpanel_core::Finding;

use crate::provider::LlmProvider;
use crate::types::{LlmError, LlmRequestOptions, LlmResult, Message, UsageStats};

// ============================================================================
// Output contract
// ============================================================================

/// A type a model can be asked to produce.
///
/// The JSON schema comes from `schemars`; `check` covers what the schema
/// cannot express (non-blank strings, value ranges).
pub trait StructuredOutput: DeserializeOwned + JsonSchema + Send {
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

impl StructuredOutput for Finding {
    fn check(&self) -> Result<(), String> {
        self.check_contract().map_err(|e| e.to_string())
    }
}

/// JSON schema of `T` as a `serde_json::Value`.
pub fn schema_of<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(serde_json::Value::Null)
}

// ============================================================================
// Usage observation
// ============================================================================

/// Metadata for one completed provider round-trip.
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// Pipeline stage (`analyzer`, `validator`, `synthesis`, ...)
    pub stage: String,
    /// What the call was about, usually a specialty key
    pub subject: Option<String>,
    /// Model that served the call
    pub model: String,
    pub usage: UsageStats,
    /// Counts were estimated from text length because the provider sent none
    pub estimated: bool,
    pub duration_ms: u64,
}

/// Receives a [`CallRecord`] for every provider call that returned.
pub trait CallObserver: Send + Sync {
    fn on_call(&self, record: CallRecord);
}

/// Rough token estimate used when a provider reports no usage (~4 chars per token).
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    chars.div_ceil(4)
}

// ============================================================================
// Request / invoker
// ============================================================================

/// One structured request.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub stage: String,
    pub subject: Option<String>,
    pub system: String,
    pub prompt: String,
    pub timeout: Duration,
}

impl StructuredRequest {
    pub fn new(
        stage: impl Into<String>,
        system: impl Into<String>,
        prompt: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            stage: stage.into(),
            subject: None,
            system: system.into(),
            prompt: prompt.into(),
            timeout,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// Executes structured requests against a shared provider.
#[derive(Clone)]
pub struct StructuredInvoker {
    provider: Arc<dyn LlmProvider>,
    observer: Option<Arc<dyn CallObserver>>,
}

impl StructuredInvoker {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            observer: None,
        }
    }

    /// Report usage of every call to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Run `request` and parse the response as `T`.
    pub async fn call<T: StructuredOutput>(&self, request: StructuredRequest) -> LlmResult<T> {
        let schema = schema_of::<T>();
        let system = format!(
            "{}\n\nRespond with a single JSON object that conforms to this JSON schema. \
             Do not wrap it in markdown and do not add any text outside the object.\n{}",
            request.system.trim_end(),
            schema
        );
        let messages = vec![Message::user(request.prompt.clone())];
        let options = LlmRequestOptions::structured(request.stage.clone());

        let started = Instant::now();
        let response = tokio::time::timeout(
            request.timeout,
            self.provider.send_message(messages, Some(system.clone()), options),
        )
        .await
        .map_err(|_| LlmError::Timeout {
            stage: request.stage.clone(),
            seconds: request.timeout.as_secs(),
        })??;
        let duration_ms = started.elapsed().as_millis() as u64;

        if let Some(observer) = &self.observer {
            let estimated = response.usage.is_empty();
            let usage = if estimated {
                UsageStats {
                    input_tokens: estimate_tokens(&system) + estimate_tokens(&request.prompt),
                    output_tokens: response.content.as_deref().map(estimate_tokens).unwrap_or(0),
                    thinking_tokens: None,
                }
            } else {
                response.usage.clone()
            };
            observer.on_call(CallRecord {
                stage: request.stage.clone(),
                subject: request.subject.clone(),
                model: response.model.clone(),
                usage,
                estimated,
                duration_ms,
            });
        }

        debug!(
            stage = %request.stage,
            subject = request.subject.as_deref().unwrap_or("-"),
            model = %response.model,
            duration_ms,
            "Structured call returned"
        );

        let text = response.text().ok_or_else(|| LlmError::EmptyResponse {
            model: response.model.clone(),
        })?;
        parse_structured::<T>(text)
    }
}

/// Parse model text into `T`, tolerating markdown fences and surrounding prose.
pub fn parse_structured<T: StructuredOutput>(text: &str) -> LlmResult<T> {
    let json = extract_json_object(text).ok_or_else(|| LlmError::ParseError {
        message: format!("no JSON object in response: {}", preview(text)),
    })?;
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| LlmError::ParseError {
            message: format!("invalid JSON: {}", e),
        })?;
    let parsed: T = serde_json::from_value(value).map_err(|e| LlmError::ContractViolation {
        message: e.to_string(),
    })?;
    parsed
        .check()
        .map_err(|message| LlmError::ContractViolation { message })?;
    Ok(parsed)
}

/// The outermost `{ ... }` span of `text`, if any.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(120) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
