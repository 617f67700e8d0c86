//! Model Fallback Chain
//!
//! An `LlmProvider` that tries an ordered list of providers (usually the same
//! API with progressively more available models) and returns the first
//! success. Failures are classified into a [`FailureReason`]; reasons that no
//! other model can fix stop the chain immediately.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::provider::LlmProvider;
use crate::types::{LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, ProviderConfig};

/// Default pause between two models of the chain.
pub const DEFAULT_DELAY_BETWEEN_MODELS: Duration = Duration::from_secs(1);

/// Reasons a model attempt can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Model is not available for this key/region
    Unavailable,
    /// Timed out
    Timeout,
    /// Quota or rate limit
    RateLimited,
    /// Network/connection error
    NetworkError,
    /// Provider-side 5xx
    ServerError,
    /// Unparseable or empty response
    InvalidResponse,
    /// Credentials rejected
    Authentication,
    /// Anything else
    Error,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Unavailable => write!(f, "unavailable"),
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::RateLimited => write!(f, "rate_limited"),
            FailureReason::NetworkError => write!(f, "network_error"),
            FailureReason::ServerError => write!(f, "server_error"),
            FailureReason::InvalidResponse => write!(f, "invalid_response"),
            FailureReason::Authentication => write!(f, "authentication"),
            FailureReason::Error => write!(f, "error"),
        }
    }
}

impl FailureReason {
    /// Check if this failure reason should move on to the next model.
    ///
    /// Every model in a chain shares the same credentials, so a rejected key
    /// fails the whole chain at once.
    pub fn should_fallback(&self) -> bool {
        !matches!(self, FailureReason::Authentication)
    }

    /// Classify a provider error.
    pub fn from_error(error: &LlmError) -> Self {
        match error {
            LlmError::AuthenticationFailed { .. } => FailureReason::Authentication,
            LlmError::RateLimited { .. } => FailureReason::RateLimited,
            LlmError::ModelNotFound { .. } | LlmError::ProviderUnavailable { .. } => {
                FailureReason::Unavailable
            }
            LlmError::ServerError { .. } => FailureReason::ServerError,
            LlmError::NetworkError { .. } => FailureReason::NetworkError,
            LlmError::Timeout { .. } => FailureReason::Timeout,
            LlmError::ParseError { .. }
            | LlmError::ContractViolation { .. }
            | LlmError::EmptyResponse { .. } => FailureReason::InvalidResponse,
            LlmError::InvalidRequest { .. } | LlmError::Other { .. } => FailureReason::Error,
        }
    }
}

/// Ordered chain of providers tried until one succeeds.
pub struct ModelFallbackChain {
    providers: Vec<Arc<dyn LlmProvider>>,
    delay_between_models: Duration,
}

impl ModelFallbackChain {
    /// Create a chain whose first member is `primary`.
    pub fn new(primary: Arc<dyn LlmProvider>) -> Self {
        Self {
            providers: vec![primary],
            delay_between_models: DEFAULT_DELAY_BETWEEN_MODELS,
        }
    }

    /// Append a fallback provider
    pub fn add_fallback(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Set the pause inserted between two attempts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_between_models = delay;
        self
    }

    /// Models in the order they are tried
    pub fn models(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.model()).collect()
    }

    fn primary(&self) -> &Arc<dyn LlmProvider> {
        &self.providers[0]
    }
}

#[async_trait]
impl LlmProvider for ModelFallbackChain {
    fn name(&self) -> &'static str {
        self.primary().name()
    }

    fn model(&self) -> &str {
        self.primary().model()
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let stage = request_options.stage.clone().unwrap_or_default();
        let mut last_error: Option<LlmError> = None;

        for (index, provider) in self.providers.iter().enumerate() {
            if index > 0 && !self.delay_between_models.is_zero() {
                debug!(
                    delay_ms = self.delay_between_models.as_millis() as u64,
                    "Waiting before next model"
                );
                tokio::time::sleep(self.delay_between_models).await;
            }

            let started = Instant::now();
            match provider
                .send_message(messages.clone(), system.clone(), request_options.clone())
                .await
            {
                Ok(response) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    if index > 0 {
                        info!(
                            model = provider.model(),
                            stage = %stage,
                            failed_before = index,
                            duration_ms,
                            "Fallback model succeeded"
                        );
                    }
                    return Ok(response);
                }
                Err(e) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    let reason = FailureReason::from_error(&e);
                    warn!(
                        model = provider.model(),
                        stage = %stage,
                        reason = %reason,
                        duration_ms,
                        "Model attempt failed: {}",
                        e
                    );
                    if !reason.should_fallback() {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        warn!(stage = %stage, attempts = self.providers.len(), "All models in chain failed");
        Err(last_error.unwrap_or_else(|| LlmError::ProviderUnavailable {
            message: "no models configured".to_string(),
        }))
    }

    async fn health_check(&self) -> LlmResult<()> {
        self.primary().health_check().await
    }

    fn config(&self) -> &ProviderConfig {
        self.primary().config()
    }
}
