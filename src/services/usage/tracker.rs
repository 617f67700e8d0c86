//! Usage Tracker
//!
//! Side channel for per-call token accounting. Records are pushed with
//! `try_send` onto a bounded queue and drained in batches by a detached task
//! into a [`UsageSink`]. Reporting never blocks a request and never fails
//! it: a full queue drops the record with a debug log.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use medpanel_llm::{CallObserver, CallRecord};

use crate::utils::error::{EngineError, EngineResult};

use super::cost_calculator::CostCalculator;

/// One model call as seen by accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// Pipeline stage (`analyzer`, `validator`, `synthesis`, ...)
    pub stage: String,
    /// Specialty key, for analyzer and validator calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default)]
    pub thinking_tokens: u32,
    /// Counts were estimated from text length
    #[serde(default)]
    pub estimated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    pub cost_microdollars: i64,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens + self.thinking_tokens
    }
}

/// Destination of usage records.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record_batch(&self, records: &[UsageRecord]) -> EngineResult<()>;
}

/// Sink that writes each record to the log.
#[derive(Debug, Default)]
pub struct LogUsageSink;

#[async_trait]
impl UsageSink for LogUsageSink {
    async fn record_batch(&self, records: &[UsageRecord]) -> EngineResult<()> {
        for r in records {
            info!(
                stage = %r.stage,
                specialty = r.specialty.as_deref().unwrap_or("-"),
                model = %r.model,
                input_tokens = r.input_tokens,
                output_tokens = r.output_tokens,
                cost_microdollars = r.cost_microdollars,
                "Model usage"
            );
        }
        Ok(())
    }
}

/// Sink that keeps records in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryUsageSink {
    records: Arc<Mutex<Vec<UsageRecord>>>,
}

impl MemoryUsageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn total_cost_microdollars(&self) -> i64 {
        self.records().iter().map(|r| r.cost_microdollars).sum()
    }
}

#[async_trait]
impl UsageSink for MemoryUsageSink {
    async fn record_batch(&self, records: &[UsageRecord]) -> EngineResult<()> {
        let mut stored = self
            .records
            .lock()
            .map_err(|_| EngineError::internal("usage record store poisoned"))?;
        stored.extend_from_slice(records);
        Ok(())
    }
}

/// Message type for the tracker channel
#[derive(Debug)]
pub enum TrackerMessage {
    /// Track a new usage record
    Track(UsageRecord),
    /// Flush buffered records, then acknowledge
    Flush(oneshot::Sender<()>),
    /// Flush and stop the background task
    Shutdown(oneshot::Sender<()>),
}

/// Configuration for the usage tracker
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Queue capacity; records beyond it are dropped
    pub queue_capacity: usize,
    /// Buffer size before auto-flush
    pub buffer_size: usize,
    /// Flush interval in seconds
    pub flush_interval_secs: u64,
    pub enabled: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            buffer_size: 50,
            flush_interval_secs: 5,
            enabled: true,
        }
    }
}

/// Handle to the background usage task. Cheap to clone.
#[derive(Clone)]
pub struct UsageTracker {
    sender: mpsc::Sender<TrackerMessage>,
    cost_calculator: Arc<CostCalculator>,
    enabled: bool,
}

impl UsageTracker {
    /// Spawn the background task. Must be called inside a tokio runtime.
    pub fn new(
        sink: Arc<dyn UsageSink>,
        cost_calculator: Arc<CostCalculator>,
        config: TrackerConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel::<TrackerMessage>(config.queue_capacity.max(1));
        let enabled = config.enabled;
        tokio::spawn(async move {
            Self::process_messages(receiver, sink, config).await;
        });
        Self {
            sender,
            cost_calculator,
            enabled,
        }
    }

    async fn process_messages(
        mut receiver: mpsc::Receiver<TrackerMessage>,
        sink: Arc<dyn UsageSink>,
        config: TrackerConfig,
    ) {
        let mut buffer: Vec<UsageRecord> = Vec::with_capacity(config.buffer_size);
        let mut flush_interval =
            tokio::time::interval(std::time::Duration::from_secs(config.flush_interval_secs.max(1)));

        loop {
            tokio::select! {
                msg = receiver.recv() => {
                    match msg {
                        Some(TrackerMessage::Track(record)) => {
                            buffer.push(record);
                            if buffer.len() >= config.buffer_size {
                                Self::flush_buffer(sink.as_ref(), &mut buffer).await;
                            }
                        }
                        Some(TrackerMessage::Flush(ack)) => {
                            Self::flush_buffer(sink.as_ref(), &mut buffer).await;
                            let _ = ack.send(());
                        }
                        Some(TrackerMessage::Shutdown(ack)) => {
                            Self::flush_buffer(sink.as_ref(), &mut buffer).await;
                            let _ = ack.send(());
                            break;
                        }
                        None => {
                            Self::flush_buffer(sink.as_ref(), &mut buffer).await;
                            break;
                        }
                    }
                }
                _ = flush_interval.tick() => {
                    if !buffer.is_empty() {
                        Self::flush_buffer(sink.as_ref(), &mut buffer).await;
                    }
                }
            }
        }
    }

    async fn flush_buffer(sink: &dyn UsageSink, buffer: &mut Vec<UsageRecord>) {
        if buffer.is_empty() {
            return;
        }
        match sink.record_batch(buffer).await {
            Ok(()) => debug!("Flushed {} usage records", buffer.len()),
            Err(e) => error!("Failed to flush usage records: {}", e),
        }
        buffer.clear();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn cost_calculator(&self) -> &Arc<CostCalculator> {
        &self.cost_calculator
    }

    /// Queue a record without waiting.
    pub fn track(&self, record: UsageRecord) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.sender.try_send(TrackerMessage::Track(record)) {
            debug!("Dropping usage record: {}", e);
        }
    }

    /// Price and queue one provider call.
    pub fn track_call(&self, call: CallRecord, patient_id: Option<&str>) {
        if !self.enabled {
            return;
        }
        let thinking_tokens = call.usage.thinking_tokens.unwrap_or(0);
        let cost = self.cost_calculator.calculate_cost(
            &call.model,
            call.usage.input_tokens,
            call.usage.output_tokens + thinking_tokens,
            thinking_tokens > 0,
        );
        self.track(UsageRecord {
            stage: call.stage,
            specialty: call.subject,
            model: call.model,
            input_tokens: call.usage.input_tokens,
            output_tokens: call.usage.output_tokens,
            thinking_tokens,
            estimated: call.estimated,
            patient_id: patient_id.map(str::to_string),
            cost_microdollars: cost,
            duration_ms: call.duration_ms,
            timestamp: Utc::now(),
        });
    }

    /// Observer that reports calls of one run, tagged with its patient.
    pub fn observer(&self, patient_id: Option<&str>) -> Arc<dyn CallObserver> {
        Arc::new(RunUsageObserver {
            tracker: self.clone(),
            patient_id: patient_id.map(str::to_string),
        })
    }

    /// Write out everything queued so far.
    pub async fn flush(&self) -> EngineResult<()> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(TrackerMessage::Flush(ack))
            .await
            .map_err(|_| EngineError::internal("Failed to send flush message"))?;
        done.await
            .map_err(|_| EngineError::internal("Usage task stopped before flushing"))
    }

    /// Flush and stop the background task.
    pub async fn shutdown(&self) -> EngineResult<()> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(TrackerMessage::Shutdown(ack))
            .await
            .map_err(|_| EngineError::internal("Failed to send shutdown message"))?;
        done.await
            .map_err(|_| EngineError::internal("Usage task stopped before shutdown"))
    }
}

struct RunUsageObserver {
    tracker: UsageTracker,
    patient_id: Option<String>,
}

impl CallObserver for RunUsageObserver {
    fn on_call(&self, record: CallRecord) {
        self.tracker.track_call(record, self.patient_id.as_deref());
    }
}

/// Builder for creating UsageTracker instances
pub struct UsageTrackerBuilder {
    config: TrackerConfig,
    cost_calculator: Option<Arc<CostCalculator>>,
}

impl Default for UsageTrackerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageTrackerBuilder {
    pub fn new() -> Self {
        Self {
            config: TrackerConfig::default(),
            cost_calculator: None,
        }
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    pub fn flush_interval_secs(mut self, secs: u64) -> Self {
        self.config.flush_interval_secs = secs;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn cost_calculator(mut self, calc: Arc<CostCalculator>) -> Self {
        self.cost_calculator = Some(calc);
        self
    }

    /// Build the tracker and spawn its task.
    pub fn build(self, sink: Arc<dyn UsageSink>) -> UsageTracker {
        let cost_calc = self
            .cost_calculator
            .unwrap_or_else(|| Arc::new(CostCalculator::new()));
        UsageTracker::new(sink, cost_calc, self.config)
    }
}
