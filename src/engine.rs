//! Diagnostic Engine
//!
//! Facade running one diagnostic request end to end:
//!
//! 1. (documents only) pre-consolidation into a single clinical context
//! 2. panel selection: explicit, whole pool, or specialist triage
//! 3. fan-out over the selected analyzers, each slot under its own
//!    validate-and-retry loop
//! 4. synthesis of the resolved finding set
//! 5. (optional) urgency triage of the synthesized diagnosis
//!
//! The engine holds no per-request state; concurrent requests share only
//! the provider, the analyzer pool and the usage tracker.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use medpanel_core::{ClinicalContext, DocumentAnalysis, PanelConfig};
use medpanel_llm::{LlmProvider, StructuredInvoker};
use medpanel_quality_gates::{CriticValidator, FindingValidator, RetryController};

use crate::config::EngineSettings;
use crate::models::ConsolidatedDiagnosis;
use crate::services::analyzers::{AnalyzerPool, Specialty};
use crate::services::consolidation::PreConsolidator;
use crate::services::fan_out::{FanOutCoordinator, SlotRunner};
use crate::services::synthesis::Synthesizer;
use crate::services::triage::{SpecialistTriage, UrgencyTriage};
use crate::services::usage::{CostCalculator, TrackerConfig, UsageSink, UsageTracker};
use crate::utils::error::{EngineError, EngineResult};

/// Which analyzers a run dispatches.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PanelSelection {
    /// Every analyzer in the pool
    #[default]
    All,
    /// Exactly these, in this order
    Specialties(Vec<Specialty>),
    /// Let specialist triage choose; falls back to the default panel
    Triage,
}

/// Multi-specialist diagnostic engine.
#[derive(Clone)]
pub struct DiagnosticEngine {
    provider: Arc<dyn LlmProvider>,
    pool: Arc<AnalyzerPool>,
    config: PanelConfig,
    default_panel: Vec<Specialty>,
    usage: Option<UsageTracker>,
    validator: Option<Arc<dyn FindingValidator>>,
}

impl DiagnosticEngine {
    pub fn builder(provider: Arc<dyn LlmProvider>) -> DiagnosticEngineBuilder {
        DiagnosticEngineBuilder::new(provider)
    }

    /// Build an engine from settings. Spawns the usage task when usage
    /// reporting is enabled, so it must run inside a tokio runtime.
    pub fn from_settings(settings: &EngineSettings, sink: Arc<dyn UsageSink>) -> EngineResult<Self> {
        let provider = settings.build_provider()?;
        let mut builder = DiagnosticEngineBuilder::new(provider).config(settings.panel_config()?);
        if settings.usage.enabled {
            let tracker = UsageTracker::new(
                sink,
                Arc::new(CostCalculator::new()),
                TrackerConfig {
                    queue_capacity: settings.usage.queue_capacity,
                    flush_interval_secs: settings.usage.flush_interval_secs,
                    ..TrackerConfig::default()
                },
            );
            builder = builder.usage_tracker(tracker);
        }
        builder.build()
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn pool(&self) -> &AnalyzerPool {
        &self.pool
    }

    pub fn default_panel(&self) -> &[Specialty] {
        &self.default_panel
    }

    pub fn usage_tracker(&self) -> Option<&UsageTracker> {
        self.usage.as_ref()
    }

    /// Invoker for one run, reporting usage tagged with the run's patient.
    fn invoker(&self, patient_id: Option<&str>) -> StructuredInvoker {
        let invoker = StructuredInvoker::new(self.provider.clone());
        match &self.usage {
            Some(tracker) => invoker.with_observer(tracker.observer(patient_id)),
            None => invoker,
        }
    }

    fn validator(&self, invoker: &StructuredInvoker) -> Arc<dyn FindingValidator> {
        match &self.validator {
            Some(v) => v.clone(),
            None => Arc::new(
                CriticValidator::new(invoker.clone(), self.config.validator_timeout())
                    .with_threshold(self.config.approval_threshold),
            ),
        }
    }

    async fn resolve_selection(
        &self,
        selection: PanelSelection,
        context: &ClinicalContext,
        invoker: &StructuredInvoker,
        cancel: &CancellationToken,
    ) -> EngineResult<Vec<Specialty>> {
        match selection {
            PanelSelection::All => Ok(self.pool.specialties()),
            PanelSelection::Specialties(requested) => {
                let mut seen = HashSet::new();
                let specialties: Vec<Specialty> =
                    requested.into_iter().filter(|s| seen.insert(*s)).collect();
                if specialties.is_empty() {
                    return Err(EngineError::config("no specialties selected"));
                }
                Ok(specialties)
            }
            PanelSelection::Triage => {
                let triage = SpecialistTriage::new(invoker.clone(), self.config.analyzer_timeout());
                cancellable(
                    cancel,
                    triage.select_or_default(context, &self.pool, &self.default_panel),
                )
                .await
            }
        }
    }

    /// Run the panel over one clinical context.
    pub async fn diagnose(
        &self,
        context: ClinicalContext,
        selection: PanelSelection,
        cancel: &CancellationToken,
    ) -> EngineResult<ConsolidatedDiagnosis> {
        context.validate()?;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let invoker = self.invoker(context.patient_id());

        let specialties = self
            .resolve_selection(selection, &context, &invoker, cancel)
            .await?;
        let descriptors = self.pool.select(&specialties)?;
        info!(
            run_id = %run_id,
            specialists = descriptors.len(),
            max_attempts = self.config.max_attempts(),
            "Starting diagnostic run"
        );

        let context = Arc::new(context);
        let runner = Arc::new(SlotRunner::new(
            invoker.clone(),
            self.validator(&invoker),
            RetryController::new(self.config.max_retries, self.config.inject_feedback),
            self.config.analyzer_timeout(),
            context.clone(),
        ));
        let findings = FanOutCoordinator::new(self.config.max_concurrency)
            .with_deadline(self.config.fan_out_deadline())
            .run(descriptors, runner, cancel)
            .await;

        if cancel.is_cancelled() {
            warn!(run_id = %run_id, "Run cancelled after fan-out");
            return Err(EngineError::Cancelled);
        }

        let synthesizer = Synthesizer::new(invoker.clone(), self.config.synthesis_timeout());
        let synthesis = cancellable(cancel, synthesizer.synthesize(&context, &findings)).await??;

        let priority = if self.config.urgency_triage {
            let urgency = UrgencyTriage::new(invoker.clone(), self.config.validator_timeout());
            cancellable(cancel, urgency.classify(&synthesis)).await?
        } else {
            None
        };

        info!(
            run_id = %run_id,
            duration_ms = started.elapsed().as_millis() as u64,
            available = findings.available_count(),
            total = findings.len(),
            "Diagnostic run complete"
        );

        Ok(ConsolidatedDiagnosis::new(synthesis, findings)
            .with_run_id(run_id)
            .with_priority(priority))
    }

    /// Consolidate per-document analyses, then run the panel once over the
    /// merged context.
    pub async fn diagnose_documents(
        &self,
        documents: &[DocumentAnalysis],
        patient_history: &str,
        patient_id: Option<&str>,
        selection: PanelSelection,
        cancel: &CancellationToken,
    ) -> EngineResult<ConsolidatedDiagnosis> {
        if documents.is_empty() {
            return Err(EngineError::NoDocuments);
        }
        let invoker = self.invoker(patient_id);
        let consolidator = PreConsolidator::new(invoker, self.config.consolidation_timeout());
        let merged = cancellable(cancel, consolidator.consolidate(documents)).await??;

        let mut context = ClinicalContext::new(merged.exam_results_text, patient_history);
        if let Some(id) = patient_id {
            context = context.with_patient_id(id);
        }

        let diagnosis = self.diagnose(context, selection, cancel).await?;
        Ok(diagnosis
            .with_source_documents(merged.document_ids)
            .with_patient_explanation(merged.patient_explanation)
            .with_correlations(merged.correlations))
    }
}

/// Race `fut` against caller cancellation.
async fn cancellable<T>(cancel: &CancellationToken, fut: impl Future<Output = T>) -> EngineResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        out = fut => Ok(out),
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`DiagnosticEngine`].
pub struct DiagnosticEngineBuilder {
    provider: Arc<dyn LlmProvider>,
    pool: AnalyzerPool,
    config: PanelConfig,
    usage: Option<UsageTracker>,
    validator: Option<Arc<dyn FindingValidator>>,
}

impl DiagnosticEngineBuilder {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            pool: AnalyzerPool::standard(),
            config: PanelConfig::default(),
            usage: None,
            validator: None,
        }
    }

    pub fn pool(mut self, pool: AnalyzerPool) -> Self {
        self.pool = pool;
        self
    }

    /// Panel limits; build through `PanelConfigBuilder`.
    pub fn config(mut self, config: PanelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn usage_tracker(mut self, tracker: UsageTracker) -> Self {
        self.usage = Some(tracker);
        self
    }

    /// Replace the model-backed critic.
    pub fn validator(mut self, validator: Arc<dyn FindingValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn build(self) -> EngineResult<DiagnosticEngine> {
        if self.pool.is_empty() {
            return Err(EngineError::config("analyzer pool is empty"));
        }
        let default_panel = self.pool.resolve_keys(&self.config.default_specialties)?;
        Ok(DiagnosticEngine {
            provider: self.provider,
            pool: Arc::new(self.pool),
            config: self.config,
            default_panel,
            usage: self.usage,
            validator: self.validator,
        })
    }
}
