//! The consumer loop and its status-backed progress listener.

use super::WorkflowOrchestrator;
use crate::cancellation::ShutdownToken;
use crate::core::JobId;
use crate::errors::{StatusError, ThadamError};
use crate::pipeline::ProgressListener;
use crate::status::StatusStore;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

impl WorkflowOrchestrator {
    /// Consumes the queue until shutdown, or until the queue is closed and
    /// drained.
    ///
    /// Each job runs in its own task. At most `max_concurrent_jobs` run at
    /// once, and they are dequeued in FIFO order. Jobs already dequeued run
    /// to completion before this returns.
    ///
    /// # Errors
    ///
    /// Returns the first infrastructure error raised by a job. Stage
    /// failures never end the loop.
    pub async fn run(self: Arc<Self>, shutdown: ShutdownToken) -> Result<(), ThadamError> {
        let limit = self.config.orchestrator.max_concurrent_jobs.max(1);
        let permits = Arc::new(Semaphore::new(limit));
        let mut tasks: JoinSet<Result<(), ThadamError>> = JoinSet::new();
        info!(max_concurrent_jobs = limit, "Worker started");

        let mut outcome = 'consume: loop {
            while let Some(joined) = tasks.try_join_next() {
                if let Err(err) = reap(joined) {
                    break 'consume Err(err);
                }
            }
            if shutdown.is_shutdown() || (self.queue.is_closed() && self.queue.is_empty()) {
                break Ok(());
            }

            let permit = tokio::select! {
                () = shutdown.cancelled() => break Ok(()),
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
            };
            let next = tokio::select! {
                () = shutdown.cancelled() => break Ok(()),
                job = self.queue.dequeue() => job,
            };

            let Some(job) = next else {
                drop(permit);
                self.housekeeping();
                continue;
            };

            let this = Arc::clone(&self);
            tasks.spawn(async move {
                let _permit = permit;
                this.process(job).await
            });
        };

        if !tasks.is_empty() {
            debug!(remaining = tasks.len(), "Waiting for in-flight jobs");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = reap(joined) {
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }

        match &outcome {
            Ok(()) => info!(reason = ?shutdown.reason(), "Worker stopped"),
            Err(err) => error!(error = %err, "Worker stopped on infrastructure error"),
        }
        outcome
    }

    fn housekeeping(&self) {
        let max_age = self.config.orchestrator.stale_job_after();
        for entry in self.queue.stale_in_flight(max_age) {
            warn!(
                job_id = %entry.job_id,
                age_secs = entry.age().as_secs(),
                "Job has been processing longer than expected"
            );
        }
        if let Some(retention) = self.config.orchestrator.status_retention() {
            self.status.prune_finished(retention);
        }
    }
}

fn reap(joined: Result<Result<(), ThadamError>, JoinError>) -> Result<(), ThadamError> {
    match joined {
        Ok(result) => result,
        Err(err) => {
            error!(error = %err, "Job task aborted");
            Ok(())
        }
    }
}

/// Writes runner progress into the status store.
///
/// The first store error is kept and surfaced after the run.
pub(super) struct StatusProgress<'a> {
    status: &'a StatusStore,
    error: Mutex<Option<StatusError>>,
}

impl<'a> StatusProgress<'a> {
    pub(super) fn new(status: &'a StatusStore) -> Self {
        Self {
            status,
            error: Mutex::new(None),
        }
    }

    pub(super) fn into_error(self) -> Option<StatusError> {
        self.error.into_inner()
    }

    fn record(&self, err: StatusError) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

impl ProgressListener for StatusProgress<'_> {
    fn stage_started(&self, job_id: JobId, stage: &str) {
        if let Err(err) = self.status.enter_stage(job_id, stage) {
            self.record(err);
        }
    }

    fn progress(&self, job_id: JobId, percent: u8, stage: &str) {
        match self.status.update(job_id, percent, stage) {
            Ok(()) => debug!(%job_id, stage, progress = percent, "Progress updated"),
            Err(err) => self.record(err),
        }
    }
}
