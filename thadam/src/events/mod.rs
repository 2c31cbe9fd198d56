//! Job lifecycle events.
//!
//! The orchestrator and the stage runner describe every transition as a
//! [`LifecycleEvent`] and hand it to an injected [`EventSink`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::core::{JobId, RejectionReason, Verdict};
use serde::{Deserialize, Serialize};

/// One observable step in a job's life.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// The job passed validation and entered the queue.
    JobQueued {
        /// The job.
        job_id: JobId,
        /// Submission category, if any.
        category: Option<String>,
    },
    /// A worker picked the job up.
    JobStarted {
        /// The job.
        job_id: JobId,
        /// The resolved pipeline.
        pipeline: String,
    },
    /// A stage began executing.
    StageStarted {
        /// The job.
        job_id: JobId,
        /// The stage.
        stage: String,
    },
    /// A stage produced a successful result.
    StageCompleted {
        /// The job.
        job_id: JobId,
        /// The stage.
        stage: String,
        /// Wall-clock duration.
        duration_ms: i64,
        /// Whether the result was produced in a degraded mode.
        degraded: bool,
    },
    /// A stage succeeded with reduced confidence.
    StageDegraded {
        /// The job.
        job_id: JobId,
        /// The stage.
        stage: String,
        /// Why confidence is reduced.
        reason: String,
    },
    /// A stage returned an error, panicked, or timed out.
    StageFailed {
        /// The job.
        job_id: JobId,
        /// The stage.
        stage: String,
        /// Error description.
        error: String,
    },
    /// The job reached `completed`.
    JobCompleted {
        /// The job.
        job_id: JobId,
        /// Outcome of threshold routing, if any ran.
        verdict: Option<Verdict>,
    },
    /// The job was rejected by a routing predicate.
    JobRejected {
        /// The job.
        job_id: JobId,
        /// The rejecting stage.
        stage: String,
        /// Why.
        reason: RejectionReason,
    },
    /// The job reached `failed`.
    JobFailed {
        /// The job.
        job_id: JobId,
        /// The failing stage.
        stage: String,
        /// Error description.
        error: String,
    },
}

impl LifecycleEvent {
    /// Returns the dotted event type, e.g. `"stage.completed"`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JobQueued { .. } => "job.queued",
            Self::JobStarted { .. } => "job.started",
            Self::StageStarted { .. } => "stage.started",
            Self::StageCompleted { .. } => "stage.completed",
            Self::StageDegraded { .. } => "stage.degraded",
            Self::StageFailed { .. } => "stage.failed",
            Self::JobCompleted { .. } => "job.completed",
            Self::JobRejected { .. } => "job.rejected",
            Self::JobFailed { .. } => "job.failed",
        }
    }

    /// Returns the job the event belongs to.
    #[must_use]
    pub fn job_id(&self) -> JobId {
        match self {
            Self::JobQueued { job_id, .. }
            | Self::JobStarted { job_id, .. }
            | Self::StageStarted { job_id, .. }
            | Self::StageCompleted { job_id, .. }
            | Self::StageDegraded { job_id, .. }
            | Self::StageFailed { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::JobRejected { job_id, .. }
            | Self::JobFailed { job_id, .. } => *job_id,
        }
    }
}
