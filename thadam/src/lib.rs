//! # Thadam
//!
//! Orchestration core of the Thadam cultural submission pipeline.
//!
//! Submissions (recipes, dance recordings, ritual descriptions and the like)
//! are validated, queued and driven through an ordered pipeline of stages:
//!
//! - **Job queue**: unbounded FIFO consumed by a single background loop
//! - **Stage runner**: strictly sequential stages with routing between them
//! - **Status store**: observable per-job state machine with progress
//! - **Result sink**: persistence of completed outputs, exactly once per job
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use thadam::prelude::*;
//!
//! let registry = StageRegistry::new()
//!     .with(Arc::new(Recognizer::new()))
//!     .with(Arc::new(Moderator::new()))
//!     .with(Arc::new(AuthenticityScorer::new()))
//!     .with(Arc::new(PackGenerator::new()));
//!
//! let orchestrator = Arc::new(WorkflowOrchestrator::from_registry(
//!     ThadamConfig::from_file("thadam.toml")?,
//!     &registry,
//!     Arc::new(JsonFileResultSink::new("data/results.json")),
//! )?);
//!
//! tokio::spawn(orchestrator.clone().run(ShutdownToken::new()));
//! let job_id = orchestrator.submit(submission)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod orchestrator;
pub mod pipeline;
pub mod queue;
pub mod sink;
pub mod stages;
pub mod status;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::ShutdownToken;
    pub use crate::config::{
        PipelineLayout, RouteRule, ScoreThresholds, StageLayout, SubmissionSchema, ThadamConfig,
    };
    pub use crate::context::StageContext;
    pub use crate::core::{
        Confidence, FinalOutput, Job, JobId, JobState, RejectionKind, RejectionReason,
        StageResult, StoredId, Submission, SubmissionMetadata, Verdict,
    };
    pub use crate::errors::{
        ConfigError, SinkError, StageError, StatusError, ThadamError, ValidationError, WaitError,
    };
    pub use crate::events::{EventSink, LifecycleEvent, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::orchestrator::{ResultLookup, WorkflowOrchestrator};
    pub use crate::pipeline::{
        FlagRouter, PipelineBuilder, PipelineCatalog, PipelineDefinition, ProgressListener,
        RouteDecision, RoutingPredicate, StageRunner, ThresholdRouter,
    };
    pub use crate::queue::JobQueue;
    pub use crate::sink::{InMemoryResultSink, JsonFileResultSink, ResultSink};
    pub use crate::stages::{FnStage, RetryConfig, RetryingStage, Stage, StageRegistry};
    pub use crate::status::{StatusRecord, StatusStore};
}
