//! Engine Settings
//!
//! TOML settings file for the engine:
//!
//! ```toml
//! [provider]
//! provider = "gemini"
//! model = "gemini-2.5-flash-lite"
//! api_key_env = "GEMINI_API_KEY"
//! fallback_models = ["gemini-2.5-flash", "gemini-1.5-flash"]
//!
//! [panel]
//! max_retries = 2
//! approval_threshold = 75
//! max_concurrency = 8
//!
//! [timeouts]
//! analyzer_call_secs = 60
//!
//! [usage]
//! enabled = true
//!
//! [logging]
//! filter = "info,medpanel=debug"
//! ```
//!
//! Every section and field is optional. Panel limits are validated through
//! `PanelConfigBuilder`, so a loaded file never yields an invalid config.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use medpanel_core::{PanelConfig, PanelConfigBuilder};
use medpanel_llm::{
    build_http_client, GeminiProvider, LlmProvider, ModelFallbackChain, OpenAIProvider,
    ProviderConfig, ProviderType,
};

use crate::utils::error::{EngineError, EngineResult};

// ============================================================================
// Sections
// ============================================================================

/// `[provider]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub provider: ProviderType,
    pub model: String,
    pub base_url: Option<String>,
    /// Inline key; prefer `api_key_env`
    pub api_key: Option<String>,
    /// Environment variable holding the key
    pub api_key_env: String,
    pub proxy_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Models tried in order after the primary fails
    pub fallback_models: Vec<String>,
    /// Pause between two models of the chain
    pub fallback_delay_ms: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        let base = ProviderConfig::default();
        Self {
            provider: base.provider,
            model: base.model,
            base_url: None,
            api_key: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            proxy_url: None,
            max_tokens: base.max_tokens,
            temperature: base.temperature,
            fallback_models: Vec::new(),
            fallback_delay_ms: 1000,
        }
    }
}

/// `[panel]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelSettings {
    pub max_retries: u32,
    pub approval_threshold: u8,
    pub max_concurrency: usize,
    pub inject_feedback: bool,
    pub urgency_triage: bool,
    /// Specialty keys; empty means the whole pool
    pub default_specialties: Vec<String>,
}

impl Default for PanelSettings {
    fn default() -> Self {
        let base = PanelConfig::default();
        Self {
            max_retries: base.max_retries,
            approval_threshold: base.approval_threshold,
            max_concurrency: base.max_concurrency,
            inject_feedback: base.inject_feedback,
            urgency_triage: base.urgency_triage,
            default_specialties: base.default_specialties,
        }
    }
}

/// `[timeouts]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub analyzer_call_secs: u64,
    pub validator_call_secs: u64,
    pub synthesis_call_secs: u64,
    pub consolidation_call_secs: u64,
    pub fan_out_deadline_secs: Option<u64>,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        let base = PanelConfig::default();
        Self {
            analyzer_call_secs: base.analyzer_call_secs,
            validator_call_secs: base.validator_call_secs,
            synthesis_call_secs: base.synthesis_call_secs,
            consolidation_call_secs: base.consolidation_call_secs,
            fan_out_deadline_secs: base.fan_out_deadline_secs,
        }
    }
}

/// `[usage]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageSettings {
    pub enabled: bool,
    pub queue_capacity: usize,
    pub flush_interval_secs: u64,
}

impl Default for UsageSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 1024,
            flush_interval_secs: 5,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset
    pub filter: String,
    pub with_target: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            with_target: false,
        }
    }
}

// ============================================================================
// EngineSettings
// ============================================================================

/// Complete engine settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub provider: ProviderSettings,
    pub panel: PanelSettings,
    pub timeouts: TimeoutSettings,
    pub usage: UsageSettings,
    pub logging: LoggingSettings,
}

impl EngineSettings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "Loaded engine settings");
        Ok(settings)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(content: &str) -> EngineResult<Self> {
        let settings: Self = toml::from_str(content)?;
        settings.panel_config()?;
        Ok(settings)
    }

    /// Validated panel configuration.
    pub fn panel_config(&self) -> EngineResult<PanelConfig> {
        let mut builder = PanelConfigBuilder::new()
            .max_retries(self.panel.max_retries)
            .approval_threshold(self.panel.approval_threshold)
            .max_concurrency(self.panel.max_concurrency)
            .inject_feedback(self.panel.inject_feedback)
            .urgency_triage(self.panel.urgency_triage)
            .default_specialties(self.panel.default_specialties.iter().cloned())
            .analyzer_call_secs(self.timeouts.analyzer_call_secs)
            .validator_call_secs(self.timeouts.validator_call_secs)
            .synthesis_call_secs(self.timeouts.synthesis_call_secs)
            .consolidation_call_secs(self.timeouts.consolidation_call_secs);
        if let Some(secs) = self.timeouts.fan_out_deadline_secs {
            builder = builder.fan_out_deadline_secs(secs);
        }
        Ok(builder.build()?)
    }

    /// API key from the inline value or the configured environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.provider
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                std::env::var(&self.provider.api_key_env)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
    }

    /// Provider configuration of the primary model.
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider: self.provider.provider,
            api_key: self.resolve_api_key(),
            base_url: self.provider.base_url.clone(),
            model: self.provider.model.clone(),
            max_tokens: self.provider.max_tokens,
            temperature: self.provider.temperature,
        }
    }

    /// Build the provider: the primary model, wrapped in a fallback chain
    /// when fallback models are configured.
    pub fn build_provider(&self) -> EngineResult<Arc<dyn LlmProvider>> {
        let config = self.provider_config();
        if config.api_key.is_none() {
            return Err(EngineError::config(format!(
                "no API key: set provider.api_key or ${}",
                self.provider.api_key_env
            )));
        }
        let client = build_http_client(self.provider.proxy_url.as_deref())
            .map_err(|e| EngineError::config(e.to_string()))?;

        let make = |config: ProviderConfig| -> Arc<dyn LlmProvider> {
            match config.provider {
                ProviderType::Gemini => Arc::new(GeminiProvider::with_client(config, client.clone())),
                ProviderType::OpenAI => Arc::new(OpenAIProvider::with_client(config, client.clone())),
            }
        };

        let primary = make(config.clone());
        if self.provider.fallback_models.is_empty() {
            return Ok(primary);
        }

        let chain = self
            .provider
            .fallback_models
            .iter()
            .fold(ModelFallbackChain::new(primary), |chain, model| {
                chain.add_fallback(make(config.with_model(model)))
            })
            .with_delay(Duration::from_millis(self.provider.fallback_delay_ms));
        info!(models = ?chain.models(), "Model fallback chain configured");
        Ok(Arc::new(chain))
    }
}
