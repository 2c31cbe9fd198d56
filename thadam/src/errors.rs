//! Error types for thadam.
//!
//! The taxonomy follows how far an error is allowed to travel:
//! - [`ValidationError`] is returned synchronously from `submit`
//! - [`StageError`] never leaves the runner; it becomes a `failed` status
//! - [`StatusError`], [`QueueError`] are infrastructure errors, fatal to the worker
//! - [`SinkError`] fails the job that could not be persisted

use crate::core::{JobId, JobState, RejectionReason};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for thadam operations.
#[derive(Debug, Error)]
pub enum ThadamError {
    /// A submission failed validation.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Configuration could not be loaded or is inconsistent.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A pipeline definition is invalid.
    #[error("{0}")]
    Pipeline(#[from] PipelineValidationError),

    /// The status store rejected a mutation.
    #[error("{0}")]
    Status(#[from] StatusError),

    /// The job queue is unusable.
    #[error("{0}")]
    Queue(#[from] QueueError),

    /// The result sink failed.
    #[error("{0}")]
    Sink(#[from] SinkError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ThadamError {
    /// Returns true for errors that must stop the worker process.
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Status(_) | Self::Queue(_) | Self::Io(_))
    }
}

/// Bad input or metadata, reported before a job is queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required metadata field is absent.
    #[error("Missing required field: {field}")]
    MissingField {
        /// The field name.
        field: String,
    },

    /// A required metadata field is present but empty.
    #[error("Field {field} cannot be empty")]
    EmptyField {
        /// The field name.
        field: String,
    },

    /// The uploader did not give consent.
    #[error("User consent is required for content submission")]
    ConsentRequired,

    /// The category is not in the allowed list.
    #[error("Invalid category '{category}'. Must be one of: {}", allowed.join(", "))]
    InvalidCategory {
        /// The submitted category.
        category: String,
        /// The allowed categories.
        allowed: Vec<String>,
    },

    /// A text field exceeds its length limit.
    #[error("Field {field} must be at most {max} characters")]
    FieldTooLong {
        /// The field name.
        field: String,
        /// The limit.
        max: usize,
    },

    /// The payload is empty.
    #[error("Payload is empty")]
    EmptyPayload,

    /// The payload exceeds the configured size limit.
    #[error("Payload size {size} bytes exceeds the limit of {max} bytes")]
    PayloadTooLarge {
        /// Actual size.
        size: usize,
        /// Configured limit.
        max: usize,
    },
}

/// Failure of a single stage.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StageError {
    /// Error message.
    pub message: String,
    /// Whether a retry might succeed.
    pub retryable: bool,
}

impl StageError {
    /// Creates a non-retryable stage error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a retryable stage error, e.g. a transient network failure.
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// The stage exceeded its time budget.
    #[must_use]
    pub fn timed_out(limit: Duration) -> Self {
        Self::retryable(format!("timed out after {}ms", limit.as_millis()))
    }

    /// The stage panicked.
    #[must_use]
    pub fn panicked(message: impl AsRef<str>) -> Self {
        Self::new(format!("panicked: {}", message.as_ref()))
    }
}

impl From<anyhow::Error> for StageError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

impl From<std::io::Error> for StageError {
    fn from(err: std::io::Error) -> Self {
        Self::retryable(format!("IO error: {err}"))
    }
}

/// Error raised when a pipeline definition is invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}

/// Status store mutation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    /// No record exists for the job.
    #[error("No status record for job {0}")]
    UnknownJob(JobId),

    /// A record already exists for the job.
    #[error("Status record for job {0} already exists")]
    AlreadyExists(JobId),

    /// The record is terminal and can no longer change.
    #[error("Job {job_id} is already {state}")]
    AlreadyTerminal {
        /// The job.
        job_id: JobId,
        /// Its terminal state.
        state: JobState,
    },

    /// The requested transition is not part of the state machine.
    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The job.
        job_id: JobId,
        /// Current state.
        from: JobState,
        /// Requested state.
        to: JobState,
    },
}

/// Job queue errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue no longer accepts work.
    #[error("Job queue is closed")]
    Closed,
}

/// Result sink errors.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The backing store is unavailable.
    #[error("Result sink unavailable: {0}")]
    Unavailable(String),

    /// A stored output could not be found.
    #[error("Stored result {0} not found")]
    Missing(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        /// The file path.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The configuration could not be parsed.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration is inconsistent.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// A pipeline layout names a stage that is not registered.
    #[error("Pipeline '{pipeline}' references unknown stage '{stage}'")]
    UnknownStage {
        /// The pipeline key.
        pipeline: String,
        /// The stage name.
        stage: String,
    },

    /// A pipeline layout produced an invalid pipeline.
    #[error("{0}")]
    Pipeline(#[from] PipelineValidationError),
}

/// Errors from `run_and_wait`.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The submission was not accepted.
    #[error("{0}")]
    Submit(#[from] ThadamError),

    /// The job record disappeared while waiting.
    #[error("Job {0} not found")]
    NotFound(JobId),

    /// The job failed.
    #[error("Job {job_id} failed: {error}")]
    Failed {
        /// The job.
        job_id: JobId,
        /// The recorded error.
        error: String,
    },

    /// The job was rejected on policy grounds.
    #[error("Job {job_id} rejected: {reason}")]
    Rejected {
        /// The job.
        job_id: JobId,
        /// The recorded reason.
        reason: RejectionReason,
    },

    /// The completed output could not be loaded.
    #[error("{0}")]
    Sink(#[from] SinkError),
}
