//! Submission intake, the job lifecycle and the query APIs.
//!
//! A job moves `queued → processing → {completed | failed | rejected}`.
//! [`WorkflowOrchestrator::submit`] validates and queues;
//! [`WorkflowOrchestrator::run`] consumes the queue and drives each job
//! through its pipeline; [`status`](WorkflowOrchestrator::status) and
//! [`result`](WorkflowOrchestrator::result) answer from any task.

mod worker;


use crate::config::ThadamConfig;
use crate::core::{
    FinalOutput, Job, JobId, JobState, RejectionKind, RejectionReason, StoredId, Submission,
};
use crate::errors::{ConfigError, SinkError, StatusError, ThadamError, ValidationError, WaitError};
use crate::events::{EventSink, LifecycleEvent, LoggingEventSink};
use crate::observability::JobSummary;
use crate::pipeline::{
    panic_message, PipelineCatalog, PipelineDefinition, RunOutcome, StageRunner, Termination,
};
use crate::queue::{JobQueue, QueueStats};
use crate::sink::ResultSink;
use crate::stages::StageRegistry;
use crate::status::{StatusRecord, StatusStore};
use chrono::Utc;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use worker::StatusProgress;

/// Stage name recorded when persisting a completed job fails.
pub const RESULT_SINK_STAGE: &str = "result_sink";

/// Stage name recorded when a job panics outside any stage.
pub const ORCHESTRATOR_STAGE: &str = "orchestrator";

/// Answer of the Result API.
#[derive(Debug, Clone)]
pub enum ResultLookup {
    /// No such job.
    NotFound,
    /// The job has not finished yet.
    Pending(StatusRecord),
    /// The job completed; this is its stored output.
    Completed(FinalOutput),
    /// The job failed.
    Failed {
        /// The failing stage.
        stage: Option<String>,
        /// The recorded error.
        error: String,
    },
    /// The job was rejected.
    Rejected {
        /// The rejecting stage.
        stage: Option<String>,
        /// The recorded reason.
        reason: RejectionReason,
    },
}

/// Owns the queue, the status store and the pipelines, and drives jobs
/// through them.
pub struct WorkflowOrchestrator {
    config: Arc<ThadamConfig>,
    catalog: PipelineCatalog,
    queue: Arc<JobQueue>,
    status: Arc<StatusStore>,
    sink: Arc<dyn ResultSink>,
    events: Arc<dyn EventSink>,
    runner: StageRunner,
}

impl fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("catalog", &self.catalog)
            .field("queue", &self.queue.stats())
            .field("jobs", &self.status.len())
            .finish_non_exhaustive()
    }
}

impl WorkflowOrchestrator {
    /// Creates an orchestrator over an assembled catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn new(
        config: ThadamConfig,
        catalog: PipelineCatalog,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let events: Arc<dyn EventSink> = Arc::new(LoggingEventSink::debug());
        Ok(Self {
            queue: Arc::new(JobQueue::new(config.queue.dequeue_wait())),
            config: Arc::new(config),
            catalog,
            status: Arc::new(StatusStore::new()),
            sink,
            runner: StageRunner::new(events.clone()),
            events,
        })
    }

    /// Creates an orchestrator whose pipelines are assembled from the
    /// configured layouts and the registered stages.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate or names
    /// unregistered stages.
    pub fn from_registry(
        config: ThadamConfig,
        registry: &StageRegistry,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self, ConfigError> {
        let catalog = PipelineCatalog::from_config(&config, registry)?;
        Self::new(config, catalog, sink)
    }

    /// Replaces the lifecycle event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.runner = StageRunner::new(events.clone());
        self.events = events;
        self
    }

    /// Shares an existing status store.
    #[must_use]
    pub fn with_status_store(mut self, status: Arc<StatusStore>) -> Self {
        self.status = status;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ThadamConfig {
        &self.config
    }

    /// Returns the status store.
    #[must_use]
    pub fn status_store(&self) -> &Arc<StatusStore> {
        &self.status
    }

    /// Returns queue counters.
    #[must_use]
    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Stops accepting submissions. The consumer loop exits once the
    /// queue is drained.
    pub fn close(&self) {
        self.queue.close();
    }

    /// Validates a submission, records it as `queued` and enqueues it.
    ///
    /// # Errors
    ///
    /// Returns [`ThadamError::Validation`] for bad payloads or metadata;
    /// nothing is recorded in that case. Returns [`ThadamError::Queue`]
    /// once the orchestrator is closed.
    pub fn submit(&self, submission: Submission) -> Result<JobId, ThadamError> {
        self.validate(&submission)?;

        let job = Job::new(submission);
        let job_id = job.id;
        let category = job.category().map(str::to_string);

        self.status.create(job_id, JobState::Queued)?;
        if let Err(err) = self.queue.enqueue(job) {
            self.status.discard(job_id);
            return Err(err.into());
        }

        info!(%job_id, category = ?category, "Job queued");
        self.events
            .try_emit(LifecycleEvent::JobQueued { job_id, category });
        Ok(job_id)
    }

    fn validate(&self, submission: &Submission) -> Result<(), ValidationError> {
        let size = submission.payload.len();
        if size == 0 {
            return Err(ValidationError::EmptyPayload);
        }
        let max = self.config.limits.max_payload_bytes;
        if size > max {
            return Err(ValidationError::PayloadTooLarge { size, max });
        }
        self.config.schema.validate(&submission.metadata)
    }

    /// Drives one dequeued job to a terminal state.
    ///
    /// Stage failures and rejections are recorded on the job and return
    /// `Ok`, as does a panic outside the stages, which fails the job at
    /// [`ORCHESTRATOR_STAGE`]. An `Err` means the status store refused a
    /// transition, which the consumer loop treats as fatal.
    pub async fn process(&self, job: Job) -> Result<(), ThadamError> {
        let pipeline = self.catalog.resolve(job.category());
        let span = info_span!("job", job_id = %job.id, pipeline = %pipeline.name());

        async {
            let result = match AssertUnwindSafe(self.execute(&job, &pipeline))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(payload) => self.abandon(job.id, &panic_message(payload.as_ref())),
            };
            self.queue.finish(job.id);
            if let Err(err) = &result {
                error!(error = %err, "Job processing hit an infrastructure error");
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Fails a job whose processing panicked, unless it already finished.
    fn abandon(&self, job_id: JobId, panic: &str) -> Result<(), ThadamError> {
        let message = format!("processing panicked: {panic}");
        error!(error = %message, "Job processing panicked");
        match self.status.fail(job_id, ORCHESTRATOR_STAGE, message) {
            Ok(()) | Err(StatusError::AlreadyTerminal { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn execute(&self, job: &Job, pipeline: &PipelineDefinition) -> Result<(), ThadamError> {
        self.status.mark_processing(job.id)?;
        self.events
            .emit(LifecycleEvent::JobStarted {
                job_id: job.id,
                pipeline: pipeline.name().to_string(),
            })
            .await;
        info!(stages = pipeline.len(), "Job started");

        let listener = StatusProgress::new(&self.status);
        let outcome = self.runner.run(pipeline, job, &listener).await;
        if let Some(err) = listener.into_error() {
            return Err(err.into());
        }

        JobSummary::from_outcome(job, pipeline.name(), &outcome).emit();
        self.finalize(job, pipeline, outcome).await
    }

    async fn finalize(
        &self,
        job: &Job,
        pipeline: &PipelineDefinition,
        outcome: RunOutcome,
    ) -> Result<(), ThadamError> {
        let job_id = job.id;
        match outcome.termination {
            Termination::Completed | Termination::HeldForReview { .. } => {
                let output = FinalOutput {
                    job_id,
                    pipeline: pipeline.name().to_string(),
                    category: job.category().map(str::to_string),
                    verdict: outcome.verdict,
                    stages: outcome.results,
                    completed_at: Utc::now(),
                };
                match self.persist(&output).await {
                    Ok(stored) => {
                        self.status.complete(job_id, stored.clone(), output.verdict)?;
                        info!(stored_id = %stored, verdict = ?output.verdict, "Job completed");
                        self.events
                            .emit(LifecycleEvent::JobCompleted {
                                job_id,
                                verdict: output.verdict,
                            })
                            .await;
                    }
                    Err(err) => {
                        let message = format!("failed to store result: {err}");
                        warn!(error = %err, "Result sink failed");
                        self.status.fail(job_id, RESULT_SINK_STAGE, &message)?;
                        self.events
                            .emit(LifecycleEvent::JobFailed {
                                job_id,
                                stage: RESULT_SINK_STAGE.to_string(),
                                error: message,
                            })
                            .await;
                    }
                }
            }
            Termination::Rejected { stage, reason } => {
                self.status.reject(job_id, &stage, reason.clone())?;
                info!(stage = %stage, reason = %reason, "Job rejected");
                self.events
                    .emit(LifecycleEvent::JobRejected {
                        job_id,
                        stage,
                        reason,
                    })
                    .await;
            }
            Termination::Failed { stage, error } => {
                let message = format!("stage '{stage}' failed: {error}");
                self.status.fail(job_id, &stage, &message)?;
                warn!(stage = %stage, error = %error, "Job failed");
                self.events
                    .emit(LifecycleEvent::JobFailed {
                        job_id,
                        stage,
                        error: message,
                    })
                    .await;
            }
        }
        Ok(())
    }

    async fn persist(&self, output: &FinalOutput) -> Result<StoredId, SinkError> {
        let stored = self.sink.store(output).await?;
        self.sink.link(output.job_id, &stored).await?;
        Ok(stored)
    }

    /// Status API: a snapshot of the job's record, `None` if unknown.
    #[must_use]
    pub fn status(&self, job_id: JobId) -> Option<StatusRecord> {
        self.status.get(job_id)
    }

    /// Result API.
    ///
    /// # Errors
    ///
    /// Returns an error if a completed job's output cannot be loaded.
    pub async fn result(&self, job_id: JobId) -> Result<ResultLookup, SinkError> {
        let Some(record) = self.status.get(job_id) else {
            return Ok(ResultLookup::NotFound);
        };
        self.lookup(record).await
    }

    async fn lookup(&self, record: StatusRecord) -> Result<ResultLookup, SinkError> {
        match record.state {
            JobState::Queued | JobState::Processing => Ok(ResultLookup::Pending(record)),
            JobState::Completed => {
                let stored = record
                    .result_ref
                    .ok_or_else(|| SinkError::Missing(format!("result of job {}", record.job_id)))?;
                self.sink
                    .fetch(&stored)
                    .await?
                    .map(ResultLookup::Completed)
                    .ok_or_else(|| SinkError::Missing(stored.to_string()))
            }
            JobState::Failed => Ok(ResultLookup::Failed {
                stage: record.stage,
                error: record.error.unwrap_or_default(),
            }),
            JobState::Rejected => Ok(ResultLookup::Rejected {
                stage: record.stage,
                reason: record
                    .rejection
                    .unwrap_or_else(|| RejectionReason::new(RejectionKind::Policy)),
            }),
        }
    }

    /// Submits and waits until the job is terminal.
    ///
    /// Requires [`run`](Self::run) to be consuming the queue on another task.
    ///
    /// # Errors
    ///
    /// Returns the submission error, or the recorded failure or rejection.
    pub async fn run_and_wait(&self, submission: Submission) -> Result<FinalOutput, WaitError> {
        let job_id = self.submit(submission)?;
        let record = self
            .status
            .wait_for_terminal(job_id, self.config.orchestrator.wait_poll_interval())
            .await
            .ok_or(WaitError::NotFound(job_id))?;

        match self.lookup(record).await? {
            ResultLookup::Completed(output) => Ok(output),
            ResultLookup::Failed { error, .. } => Err(WaitError::Failed { job_id, error }),
            ResultLookup::Rejected { reason, .. } => Err(WaitError::Rejected { job_id, reason }),
            ResultLookup::NotFound | ResultLookup::Pending(_) => Err(WaitError::NotFound(job_id)),
        }
    }
}
