//! Cost Calculator
//!
//! Per-call cost in microdollars (1 USD = 1,000,000 microdollars) from token
//! counts. Models are matched by longest name prefix so versioned names
//! (`gemini-2.5-flash-001`) resolve to their family, and `gemini-2.5-flash-lite`
//! never resolves to `gemini-2.5-flash`.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::error::{EngineError, EngineResult};

/// Model used to price calls to models missing from the table.
pub const REFERENCE_MODEL: &str = "gemini-2.5-flash";

/// Prompts longer than this many input tokens use the long-context tier.
pub const LONG_CONTEXT_THRESHOLD: u32 = 200_000;

/// Pricing for one model family (microdollars per million tokens).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Model name or name prefix
    pub model_name: String,
    pub provider: String,
    pub input_price_per_million: i64,
    pub output_price_per_million: i64,
    /// Output price when the call used thinking tokens
    #[serde(default)]
    pub thinking_output_price_per_million: Option<i64>,
    /// (input, output) prices above [`LONG_CONTEXT_THRESHOLD`] input tokens
    #[serde(default)]
    pub long_context_prices: Option<(i64, i64)>,
    #[serde(default)]
    pub is_custom: bool,
}

impl ModelPricing {
    pub fn new(
        model_name: impl Into<String>,
        provider: impl Into<String>,
        input_price_per_million: i64,
        output_price_per_million: i64,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            provider: provider.into(),
            input_price_per_million,
            output_price_per_million,
            thinking_output_price_per_million: None,
            long_context_prices: None,
            is_custom: false,
        }
    }

    pub fn with_thinking_output(mut self, price_per_million: i64) -> Self {
        self.thinking_output_price_per_million = Some(price_per_million);
        self
    }

    pub fn with_long_context(mut self, input_per_million: i64, output_per_million: i64) -> Self {
        self.long_context_prices = Some((input_per_million, output_per_million));
        self
    }

    /// Cost in microdollars for one call.
    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32, thinking: bool) -> i64 {
        let (mut input_price, mut output_price) =
            (self.input_price_per_million, self.output_price_per_million);
        if input_tokens > LONG_CONTEXT_THRESHOLD {
            if let Some((long_in, long_out)) = self.long_context_prices {
                input_price = long_in;
                output_price = long_out;
            }
        }
        if thinking {
            if let Some(price) = self.thinking_output_price_per_million {
                output_price = price;
            }
        }
        let input_cost = (input_tokens as i64 * input_price) / 1_000_000;
        let output_cost = (output_tokens as i64 * output_price) / 1_000_000;
        input_cost + output_cost
    }
}

/// Default pricing table (Gemini, plus common OpenAI-compatible models).
fn default_pricing() -> Vec<ModelPricing> {
    vec![
        ModelPricing::new("gemini-3-pro", "gemini", 2_000_000, 12_000_000)
            .with_long_context(4_000_000, 18_000_000),
        ModelPricing::new("gemini-2.5-pro", "gemini", 1_250_000, 10_000_000)
            .with_long_context(2_500_000, 15_000_000),
        ModelPricing::new("gemini-2.5-flash", "gemini", 300_000, 600_000)
            .with_thinking_output(3_500_000),
        ModelPricing::new("gemini-2.5-flash-lite", "gemini", 100_000, 400_000),
        ModelPricing::new("gemini-2.0-flash", "gemini", 100_000, 400_000),
        ModelPricing::new("gemini-2.0-flash-lite", "gemini", 75_000, 300_000),
        ModelPricing::new("gemini-1.5-flash", "gemini", 75_000, 300_000),
        ModelPricing::new("gpt-4o", "openai", 5_000_000, 15_000_000),
        ModelPricing::new("gpt-4o-mini", "openai", 150_000, 600_000),
        ModelPricing::new("gpt-4.1", "openai", 2_000_000, 8_000_000),
        ModelPricing::new("gpt-4.1-mini", "openai", 400_000, 1_600_000),
    ]
}

/// Cost calculator with built-in pricing and custom overrides.
#[derive(Debug)]
pub struct CostCalculator {
    pricing: RwLock<HashMap<String, ModelPricing>>,
    custom_overrides: RwLock<HashMap<String, ModelPricing>>,
}

impl Default for CostCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl CostCalculator {
    pub fn new() -> Self {
        let pricing = default_pricing()
            .into_iter()
            .map(|p| (p.model_name.clone(), p))
            .collect();
        Self {
            pricing: RwLock::new(pricing),
            custom_overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Pricing for `model_name`: exact match, then longest prefix. Custom
    /// overrides win over the built-in table.
    pub fn get_pricing(&self, model_name: &str) -> Option<ModelPricing> {
        let model = model_name.strip_prefix("models/").unwrap_or(model_name);
        if let Ok(custom) = self.custom_overrides.read() {
            if let Some(p) = lookup(&custom, model) {
                return Some(p);
            }
        }
        self.pricing.read().ok().and_then(|table| lookup(&table, model))
    }

    /// Cost in microdollars. Unknown models are priced as [`REFERENCE_MODEL`].
    pub fn calculate_cost(
        &self,
        model_name: &str,
        input_tokens: u32,
        output_tokens: u32,
        thinking: bool,
    ) -> i64 {
        let pricing = self.get_pricing(model_name).or_else(|| {
            debug!(model = model_name, "No pricing for model, using {}", REFERENCE_MODEL);
            self.get_pricing(REFERENCE_MODEL)
        });
        match pricing {
            Some(p) => p.calculate_cost(input_tokens, output_tokens, thinking),
            None => 0,
        }
    }

    /// Override pricing for a model (or prefix).
    pub fn set_custom_pricing(&self, pricing: ModelPricing) -> EngineResult<()> {
        let mut custom = self
            .custom_overrides
            .write()
            .map_err(|_| EngineError::internal("Failed to acquire custom pricing lock"))?;
        custom.insert(
            pricing.model_name.clone(),
            ModelPricing {
                is_custom: true,
                ..pricing
            },
        );
        Ok(())
    }

    /// Remove a custom override.
    pub fn remove_custom_pricing(&self, model_name: &str) -> EngineResult<()> {
        let mut custom = self
            .custom_overrides
            .write()
            .map_err(|_| EngineError::internal("Failed to acquire custom pricing lock"))?;
        custom.remove(model_name);
        Ok(())
    }
}

fn lookup(table: &HashMap<String, ModelPricing>, model: &str) -> Option<ModelPricing> {
    if let Some(p) = table.get(model) {
        return Some(p.clone());
    }
    table
        .iter()
        .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, p)| p.clone())
}
