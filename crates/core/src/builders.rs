//! Panel Configuration Builder
//!
//! The orchestration limits a diagnostic run is held to: retry budget,
//! approval threshold, concurrency bound, per-stage call timeouts.
//!
//! Follows the usual builder shape:
//! 1. Create with `::new()` or `::default()`
//! 2. Chain `.field(value)` calls
//! 3. Call `.build()` which validates and returns `CoreResult<PanelConfig>`
//!
//! Everything that reaches the engine goes through `build()`, so an invalid
//! threshold or a zero concurrency bound is rejected before any model call.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Upper bound accepted for `max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 5;
/// Minimum critic score for approval.
pub const DEFAULT_APPROVAL_THRESHOLD: u8 = 75;
/// Concurrent analyzer slots.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

pub const DEFAULT_ANALYZER_CALL_SECS: u64 = 60;
pub const DEFAULT_VALIDATOR_CALL_SECS: u64 = 45;
pub const DEFAULT_SYNTHESIS_CALL_SECS: u64 = 90;
pub const DEFAULT_CONSOLIDATION_CALL_SECS: u64 = 90;

// ============================================================================
// PanelConfig
// ============================================================================

/// Validated panel configuration (output of [`PanelConfigBuilder`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    pub max_retries: u32,
    pub approval_threshold: u8,
    pub max_concurrency: usize,
    /// Thread the critic's feedback into regenerated requests
    pub inject_feedback: bool,
    /// Run the post-synthesis urgency classification
    pub urgency_triage: bool,
    /// Specialty keys used when triage is unavailable. Empty means all.
    pub default_specialties: Vec<String>,
    pub analyzer_call_secs: u64,
    pub validator_call_secs: u64,
    pub synthesis_call_secs: u64,
    pub consolidation_call_secs: u64,
    pub fan_out_deadline_secs: Option<u64>,
}

impl PanelConfig {
    /// Total invocations allowed per slot (initial + retries).
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub fn analyzer_timeout(&self) -> Duration {
        Duration::from_secs(self.analyzer_call_secs)
    }

    pub fn validator_timeout(&self) -> Duration {
        Duration::from_secs(self.validator_call_secs)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_call_secs)
    }

    pub fn consolidation_timeout(&self) -> Duration {
        Duration::from_secs(self.consolidation_call_secs)
    }

    pub fn fan_out_deadline(&self) -> Option<Duration> {
        self.fan_out_deadline_secs.map(Duration::from_secs)
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            approval_threshold: DEFAULT_APPROVAL_THRESHOLD,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            inject_feedback: true,
            urgency_triage: true,
            default_specialties: Vec::new(),
            analyzer_call_secs: DEFAULT_ANALYZER_CALL_SECS,
            validator_call_secs: DEFAULT_VALIDATOR_CALL_SECS,
            synthesis_call_secs: DEFAULT_SYNTHESIS_CALL_SECS,
            consolidation_call_secs: DEFAULT_CONSOLIDATION_CALL_SECS,
            fan_out_deadline_secs: None,
        }
    }
}

// ============================================================================
// PanelConfigBuilder
// ============================================================================

/// Builder for [`PanelConfig`].
///
/// # Example
/// ```ignore
/// let config = PanelConfigBuilder::new()
///     .max_retries(2)
///     .approval_threshold(75)
///     .max_concurrency(8)
///     .fan_out_deadline_secs(180)
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct PanelConfigBuilder {
    max_retries: Option<u32>,
    approval_threshold: Option<u8>,
    max_concurrency: Option<usize>,
    inject_feedback: Option<bool>,
    urgency_triage: Option<bool>,
    default_specialties: Vec<String>,
    analyzer_call_secs: Option<u64>,
    validator_call_secs: Option<u64>,
    synthesis_call_secs: Option<u64>,
    consolidation_call_secs: Option<u64>,
    fan_out_deadline_secs: Option<u64>,
}

impl PanelConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    pub fn approval_threshold(mut self, score: u8) -> Self {
        self.approval_threshold = Some(score);
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    pub fn inject_feedback(mut self, enabled: bool) -> Self {
        self.inject_feedback = Some(enabled);
        self
    }

    pub fn urgency_triage(mut self, enabled: bool) -> Self {
        self.urgency_triage = Some(enabled);
        self
    }

    /// Add a specialty key to the default panel.
    pub fn default_specialty(mut self, key: impl Into<String>) -> Self {
        self.default_specialties.push(key.into());
        self
    }

    /// Add several specialty keys to the default panel.
    pub fn default_specialties(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.default_specialties.extend(keys.into_iter().map(|k| k.into()));
        self
    }

    pub fn analyzer_call_secs(mut self, secs: u64) -> Self {
        self.analyzer_call_secs = Some(secs);
        self
    }

    pub fn validator_call_secs(mut self, secs: u64) -> Self {
        self.validator_call_secs = Some(secs);
        self
    }

    pub fn synthesis_call_secs(mut self, secs: u64) -> Self {
        self.synthesis_call_secs = Some(secs);
        self
    }

    pub fn consolidation_call_secs(mut self, secs: u64) -> Self {
        self.consolidation_call_secs = Some(secs);
        self
    }

    /// Overall budget for the fan-out phase. Slots still running when it
    /// elapses resolve to placeholders.
    pub fn fan_out_deadline_secs(mut self, secs: u64) -> Self {
        self.fan_out_deadline_secs = Some(secs);
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> CoreResult<PanelConfig> {
        let defaults = PanelConfig::default();

        let max_retries = self.max_retries.unwrap_or(defaults.max_retries);
        if max_retries > MAX_RETRIES_LIMIT {
            return Err(CoreError::validation(format!(
                "max_retries must be <= {}, got {}",
                MAX_RETRIES_LIMIT, max_retries
            )));
        }

        let approval_threshold = self.approval_threshold.unwrap_or(defaults.approval_threshold);
        if approval_threshold > 100 {
            return Err(CoreError::validation(format!(
                "approval_threshold must be within 0..=100, got {}",
                approval_threshold
            )));
        }

        let max_concurrency = self.max_concurrency.unwrap_or(defaults.max_concurrency);
        if max_concurrency == 0 {
            return Err(CoreError::validation("max_concurrency must be > 0"));
        }

        let mut seen = std::collections::HashSet::new();
        for key in &self.default_specialties {
            if key.trim().is_empty() {
                return Err(CoreError::validation("default specialty key cannot be empty"));
            }
            if !seen.insert(key.as_str()) {
                return Err(CoreError::validation(format!(
                    "Duplicate default specialty: '{}'",
                    key
                )));
            }
        }

        let timeouts = [
            ("analyzer_call_secs", self.analyzer_call_secs.unwrap_or(defaults.analyzer_call_secs)),
            ("validator_call_secs", self.validator_call_secs.unwrap_or(defaults.validator_call_secs)),
            ("synthesis_call_secs", self.synthesis_call_secs.unwrap_or(defaults.synthesis_call_secs)),
            (
                "consolidation_call_secs",
                self.consolidation_call_secs.unwrap_or(defaults.consolidation_call_secs),
            ),
        ];
        for (name, secs) in timeouts {
            if secs == 0 {
                return Err(CoreError::validation(format!("{} must be > 0", name)));
            }
        }
        if self.fan_out_deadline_secs == Some(0) {
            return Err(CoreError::validation("fan_out_deadline_secs must be > 0"));
        }

        Ok(PanelConfig {
            max_retries,
            approval_threshold,
            max_concurrency,
            inject_feedback: self.inject_feedback.unwrap_or(defaults.inject_feedback),
            urgency_triage: self.urgency_triage.unwrap_or(defaults.urgency_triage),
            default_specialties: self.default_specialties,
            analyzer_call_secs: timeouts[0].1,
            validator_call_secs: timeouts[1].1,
            synthesis_call_secs: timeouts[2].1,
            consolidation_call_secs: timeouts[3].1,
            fan_out_deadline_secs: self.fan_out_deadline_secs,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
