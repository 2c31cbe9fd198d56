//! Mock stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::context::StageContext;
use crate::core::{JobId, StageResult};
use crate::errors::StageError;
use crate::pipeline::ProgressListener;
use crate::stages::Stage;

/// One recorded stage invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCall {
    /// The job the stage ran for.
    pub job_id: JobId,
    /// The stage name.
    pub stage: String,
}

/// Shared, ordered log of stage invocations across jobs.
#[derive(Debug, Clone, Default)]
pub struct StageTrace {
    calls: Arc<Mutex<Vec<StageCall>>>,
}

impl StageTrace {
    /// Creates an empty trace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, job_id: JobId, stage: &str) {
        self.calls.lock().push(StageCall {
            job_id,
            stage: stage.to_string(),
        });
    }

    /// Returns every call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<StageCall> {
        self.calls.lock().clone()
    }

    /// Returns the stage names run for one job, in order.
    #[must_use]
    pub fn stages_for(&self, job_id: JobId) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.job_id == job_id)
            .map(|c| c.stage.clone())
            .collect()
    }

    /// Returns job IDs in the order their first stage ran.
    #[must_use]
    pub fn job_start_order(&self) -> Vec<JobId> {
        let mut order = Vec::new();
        for call in self.calls.lock().iter() {
            if !order.contains(&call.job_id) {
                order.push(call.job_id);
            }
        }
        order
    }
}

/// A stage that succeeds and counts its invocations.
#[derive(Debug)]
pub struct CountingStage {
    name: String,
    calls: AtomicUsize,
    trace: Option<StageTrace>,
}

impl CountingStage {
    /// Creates a new counting stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: AtomicUsize::new(0),
            trace: None,
        }
    }

    /// Records every invocation into a shared trace.
    #[must_use]
    pub fn traced(mut self, trace: &StageTrace) -> Self {
        self.trace = Some(trace.clone());
        self
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for CountingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageResult, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(trace) = &self.trace {
            trace.record(ctx.job_id(), &self.name);
        }
        Ok(StageResult::ok_value(
            format!("{}_done", self.name),
            serde_json::json!(true),
        ))
    }
}

/// A stage that always returns a non-retryable error.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: String,
    calls: AtomicUsize,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext<'_>) -> Result<StageResult, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StageError::new(self.error.clone()))
    }
}

/// A stage that fails with retryable errors a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyStage {
    name: String,
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyStage {
    /// Creates a stage that fails `failures` times before succeeding.
    #[must_use]
    pub fn new(name: impl Into<String>, failures: usize) -> Self {
        Self {
            name: name.into(),
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FlakyStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageResult, StageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(StageError::retryable(format!(
                "service unavailable (attempt {})",
                ctx.attempt()
            )))
        } else {
            Ok(StageResult::ok_value("attempt", serde_json::json!(ctx.attempt())))
        }
    }
}

/// A stage that panics.
#[derive(Debug)]
pub struct PanickingStage {
    name: String,
}

impl PanickingStage {
    /// Creates a new panicking stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for PanickingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext<'_>) -> Result<StageResult, StageError> {
        panic!("{} exploded", self.name);
    }
}

/// A stage that outputs a fixed numeric score.
#[derive(Debug)]
pub struct ScoreStage {
    name: String,
    key: String,
    score: f64,
    degraded: bool,
    calls: AtomicUsize,
}

impl ScoreStage {
    /// Creates a stage emitting `key = score`.
    #[must_use]
    pub fn new(name: impl Into<String>, key: impl Into<String>, score: f64) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            score,
            degraded: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Marks the emitted score as degraded-confidence.
    #[must_use]
    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for ScoreStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext<'_>) -> Result<StageResult, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = StageResult::ok_value(self.key.clone(), serde_json::json!(self.score));
        if self.degraded {
            Ok(result.degraded("scoring model unavailable"))
        } else {
            Ok(result)
        }
    }
}

/// A moderation-like stage emitting `flagged` and `reason`.
#[derive(Debug)]
pub struct FlagStage {
    name: String,
    flagged: bool,
    reason: String,
    calls: AtomicUsize,
}

impl FlagStage {
    /// Creates a stage that reports `flagged` with a reason.
    #[must_use]
    pub fn new(name: impl Into<String>, flagged: bool, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flagged,
            reason: reason.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FlagStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext<'_>) -> Result<StageResult, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(StageResult::ok_value("flagged", serde_json::json!(self.flagged))
            .with("reason", serde_json::json!(self.reason)))
    }
}

/// A stage that sleeps before succeeding.
#[derive(Debug)]
pub struct SlowStage {
    name: String,
    delay: Duration,
    trace: Option<StageTrace>,
}

impl SlowStage {
    /// Creates a new slow stage.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            trace: None,
        }
    }

    /// Records every invocation into a shared trace.
    #[must_use]
    pub fn traced(mut self, trace: &StageTrace) -> Self {
        self.trace = Some(trace.clone());
        self
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageResult, StageError> {
        if let Some(trace) = &self.trace {
            trace.record(ctx.job_id(), &self.name);
        }
        tokio::time::sleep(self.delay).await;
        Ok(StageResult::ok_empty())
    }
}

/// A progress listener that records every callback.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    started: Mutex<Vec<(JobId, String)>>,
    progress: Mutex<Vec<(JobId, u8, String)>>,
}

impl RecordingProgress {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `(job, percent, stage)` triples in callback order.
    #[must_use]
    pub fn progress(&self) -> Vec<(JobId, u8, String)> {
        self.progress.lock().clone()
    }

    /// Returns the percents reported for one job.
    #[must_use]
    pub fn percents_for(&self, job_id: JobId) -> Vec<u8> {
        self.progress
            .lock()
            .iter()
            .filter(|(id, _, _)| *id == job_id)
            .map(|(_, p, _)| *p)
            .collect()
    }

    /// Returns the stages reported as started.
    #[must_use]
    pub fn started(&self) -> Vec<String> {
        self.started.lock().iter().map(|(_, s)| s.clone()).collect()
    }
}

impl ProgressListener for RecordingProgress {
    fn stage_started(&self, job_id: JobId, stage: &str) {
        self.started.lock().push((job_id, stage.to_string()));
    }

    fn progress(&self, job_id: JobId, percent: u8, stage: &str) {
        self.progress.lock().push((job_id, percent, stage.to_string()));
    }
}
