//! Sequential stage execution.

use super::{PipelineDefinition, RouteDecision, StageDescriptor};
use crate::context::StageContext;
use crate::core::{Confidence, Job, JobId, RejectionReason, StageResult, Verdict};
use crate::errors::StageError;
use crate::events::{EventSink, LifecycleEvent, NoOpEventSink};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Receives stage boundaries and progress from the runner.
///
/// `progress` is called once per stage that succeeds and whose routing
/// lets the pipeline continue, with that stage's pre-assigned percent.
pub trait ProgressListener: Send + Sync {
    /// A stage is about to run.
    fn stage_started(&self, _job_id: JobId, _stage: &str) {}

    /// A stage finished and the pipeline moves on.
    fn progress(&self, job_id: JobId, percent: u8, stage: &str);
}

impl<F> ProgressListener for F
where
    F: Fn(JobId, u8, &str) + Send + Sync,
{
    fn progress(&self, job_id: JobId, percent: u8, stage: &str) {
        self(job_id, percent, stage);
    }
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// Every stage ran.
    Completed,
    /// A routing predicate held the job for manual review.
    HeldForReview {
        /// The stage whose output was held.
        stage: String,
    },
    /// A routing predicate rejected the job.
    Rejected {
        /// The rejecting stage.
        stage: String,
        /// Why.
        reason: RejectionReason,
    },
    /// A stage errored, panicked, timed out or reported failure.
    Failed {
        /// The failing stage.
        stage: String,
        /// Error description.
        error: String,
    },
}

/// Everything a pipeline run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// How the run ended.
    pub termination: Termination,
    /// Stamped results in execution order, including a failed one.
    pub results: Vec<StageResult>,
    /// Threshold routing verdict.
    pub verdict: Option<Verdict>,
}

impl RunOutcome {
    /// Returns true if the job should end in `completed`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(
            self.termination,
            Termination::Completed | Termination::HeldForReview { .. }
        )
    }
}

/// Runs a pipeline's stages in order for one job.
///
/// Each stage sees the results of the stages before it. A stage error,
/// panic, timeout or `success == false` result ends the run.
#[derive(Clone)]
pub struct StageRunner {
    events: Arc<dyn EventSink>,
}

impl fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRunner").finish_non_exhaustive()
    }
}

impl Default for StageRunner {
    fn default() -> Self {
        Self::new(Arc::new(NoOpEventSink))
    }
}

impl StageRunner {
    /// Creates a runner emitting stage events to `events`.
    #[must_use]
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self { events }
    }

    /// Runs every stage of `pipeline` for `job`.
    pub async fn run(
        &self,
        pipeline: &PipelineDefinition,
        job: &Job,
        listener: &dyn ProgressListener,
    ) -> RunOutcome {
        let mut results: Vec<StageResult> = Vec::with_capacity(pipeline.len());
        let mut verdict = None;

        for descriptor in pipeline.stages() {
            let stage = descriptor.name.as_str();
            listener.stage_started(job.id, stage);
            self.events
                .emit(LifecycleEvent::StageStarted {
                    job_id: job.id,
                    stage: stage.to_string(),
                })
                .await;
            debug!(job_id = %job.id, stage, "Stage started");

            let started_at = Utc::now();
            let outcome = Self::invoke(descriptor, job, &results).await;

            let result = match outcome {
                Ok(result) if result.success => result.stamped(stage, started_at),
                Ok(result) => {
                    let error = result
                        .error
                        .clone()
                        .unwrap_or_else(|| "stage reported failure".to_string());
                    results.push(result.stamped(stage, started_at));
                    return self.fail(job.id, stage, error, results, verdict).await;
                }
                Err(err) => {
                    results.push(StageResult::fail(err.message.clone()).stamped(stage, started_at));
                    return self.fail(job.id, stage, err.message, results, verdict).await;
                }
            };

            info!(
                job_id = %job.id,
                stage,
                duration_ms = result.duration_ms(),
                degraded = result.is_degraded(),
                "Stage completed"
            );
            self.events
                .emit(LifecycleEvent::StageCompleted {
                    job_id: job.id,
                    stage: stage.to_string(),
                    duration_ms: result.duration_ms(),
                    degraded: result.is_degraded(),
                })
                .await;
            if let Confidence::Degraded { reason } = &result.confidence {
                self.events
                    .emit(LifecycleEvent::StageDegraded {
                        job_id: job.id,
                        stage: stage.to_string(),
                        reason: reason.clone(),
                    })
                    .await;
            }

            let decision = descriptor
                .route
                .as_ref()
                .map_or(RouteDecision::Continue, |route| route.route(&result));
            results.push(result);

            match decision {
                RouteDecision::Continue => {}
                RouteDecision::Approve => verdict = Some(Verdict::Verified),
                RouteDecision::HoldForReview => {
                    info!(job_id = %job.id, stage, "Held for manual review");
                    return RunOutcome {
                        termination: Termination::HeldForReview {
                            stage: stage.to_string(),
                        },
                        results,
                        verdict: Some(Verdict::Review),
                    };
                }
                RouteDecision::Reject(reason) => {
                    info!(job_id = %job.id, stage, reason = %reason, "Rejected by routing");
                    return RunOutcome {
                        termination: Termination::Rejected {
                            stage: stage.to_string(),
                            reason,
                        },
                        results,
                        verdict,
                    };
                }
            }

            listener.progress(job.id, descriptor.progress, stage);
        }

        RunOutcome {
            termination: Termination::Completed,
            results,
            verdict,
        }
    }

    async fn invoke(
        descriptor: &StageDescriptor,
        job: &Job,
        results: &[StageResult],
    ) -> Result<StageResult, StageError> {
        let ctx = StageContext::new(job, &descriptor.name, results);
        let guarded = async {
            match AssertUnwindSafe(descriptor.runner.execute(&ctx))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(payload) => Err(StageError::panicked(panic_message(payload.as_ref()))),
            }
        };

        match descriptor.timeout {
            Some(limit) => tokio::time::timeout(limit, guarded)
                .await
                .unwrap_or_else(|_| Err(StageError::timed_out(limit))),
            None => guarded.await,
        }
    }

    async fn fail(
        &self,
        job_id: JobId,
        stage: &str,
        error: String,
        results: Vec<StageResult>,
        verdict: Option<Verdict>,
    ) -> RunOutcome {
        warn!(%job_id, stage, error = %error, "Stage failed");
        self.events
            .emit(LifecycleEvent::StageFailed {
                job_id,
                stage: stage.to_string(),
                error: error.clone(),
            })
            .await;
        RunOutcome {
            termination: Termination::Failed {
                stage: stage.to_string(),
                error,
            },
            results,
            verdict,
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
