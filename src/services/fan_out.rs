//! Fan-Out Coordinator
//!
//! Dispatches one shared clinical context to every selected analyzer,
//! concurrently, and collects exactly one result per analyzer in dispatch
//! order. Each slot runs its own retry chain in its own task:
//!
//! - a semaphore bounds how many slots are in flight
//! - every slot races the caller's cancellation token (and the optional
//!   fan-out deadline); a slot that loses the race resolves to a
//!   `cancelled` placeholder
//! - a slot task that aborts resolves to a `task_failed` placeholder
//! - dropping the run future cancels every slot it spawned, so no analyzer
//!   call outlives the request
//!
//! Nothing a slot does can fail another slot or the coordinator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use medpanel_core::{ClinicalContext, Finding, UnavailableReason};
use medpanel_llm::StructuredInvoker;
use medpanel_quality_gates::{FindingValidator, RetryController, RetryOutcome, SlotResolution};

use crate::models::{FindingSet, SpecialistReport};
use crate::services::analyzers::{self, AnalyzerDescriptor};

/// Everything one slot chain needs, shared read-only by all slots of a run.
pub struct SlotRunner {
    invoker: StructuredInvoker,
    validator: Arc<dyn FindingValidator>,
    retry: RetryController,
    analyzer_timeout: Duration,
    context: Arc<ClinicalContext>,
}

impl SlotRunner {
    pub fn new(
        invoker: StructuredInvoker,
        validator: Arc<dyn FindingValidator>,
        retry: RetryController,
        analyzer_timeout: Duration,
        context: Arc<ClinicalContext>,
    ) -> Self {
        Self {
            invoker,
            validator,
            retry,
            analyzer_timeout,
            context,
        }
    }

    pub fn context(&self) -> &ClinicalContext {
        &self.context
    }

    /// Invoke, validate and retry one analyzer until a terminal state.
    pub async fn run_slot(&self, descriptor: &AnalyzerDescriptor) -> RetryOutcome {
        let invoker = &self.invoker;
        let context = self.context.as_ref();
        let timeout = self.analyzer_timeout;
        self.retry
            .run(
                descriptor.specialty.key(),
                context,
                self.validator.as_ref(),
                move |revision| async move {
                    analyzers::invoke(invoker, descriptor, context, revision.as_ref(), timeout).await
                },
            )
            .await
    }
}

/// Bounded concurrent dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct FanOutCoordinator {
    max_concurrency: usize,
    deadline: Option<Duration>,
}

impl FanOutCoordinator {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            deadline: None,
        }
    }

    /// Cancel slots still running after `deadline`; the run continues with
    /// their placeholders.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Run every descriptor once and return one report per descriptor, in
    /// the same order.
    pub async fn run(
        &self,
        descriptors: Vec<AnalyzerDescriptor>,
        runner: Arc<SlotRunner>,
        cancel: &CancellationToken,
    ) -> FindingSet {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let slots_token = cancel.child_token();
        // Fires on return and when the caller drops this future mid-await
        let _stop_slots = slots_token.clone().drop_guard();

        if let Some(deadline) = self.deadline {
            let token = slots_token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(deadline) => {
                        warn!(
                            deadline_secs = deadline.as_secs(),
                            "Fan-out deadline reached, cancelling outstanding analyzers"
                        );
                        token.cancel();
                    }
                }
            });
        }

        let mut handles = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let specialty = descriptor.specialty;
            let sem = semaphore.clone();
            let runner = runner.clone();
            let token = slots_token.clone();

            let task = tokio::spawn(async move {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => cancelled_outcome(&descriptor),
                    outcome = async {
                        let _permit = match sem.acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => return placeholder_outcome(&descriptor, UnavailableReason::TaskFailed),
                        };
                        runner.run_slot(&descriptor).await
                    } => outcome,
                }
            });
            handles.push((specialty, task));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (specialty, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(specialty = specialty.key(), "Analyzer task failed: {}", e);
                    RetryOutcome {
                        finding: Finding::unavailable(
                            specialty.display_name(),
                            UnavailableReason::TaskFailed,
                        ),
                        resolution: SlotResolution::unavailable(0),
                        last_verdict: None,
                    }
                }
            };
            debug!(
                specialty = specialty.key(),
                terminal = %outcome.resolution.terminal,
                attempts = outcome.resolution.attempts,
                "Slot resolved"
            );
            reports.push(SpecialistReport::new(specialty, outcome.finding, outcome.resolution));
        }

        let set = FindingSet::new(reports);
        info!(
            slots = set.len(),
            available = set.available_count(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Fan-out complete"
        );
        set
    }
}

fn placeholder_outcome(descriptor: &AnalyzerDescriptor, reason: UnavailableReason) -> RetryOutcome {
    RetryOutcome {
        finding: Finding::unavailable(descriptor.specialty.display_name(), reason),
        resolution: SlotResolution::unavailable(0),
        last_verdict: None,
    }
}

fn cancelled_outcome(descriptor: &AnalyzerDescriptor) -> RetryOutcome {
    debug!(specialty = descriptor.specialty.key(), "Analyzer cancelled");
    placeholder_outcome(descriptor, UnavailableReason::Cancelled)
}
