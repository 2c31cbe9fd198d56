//! Unbounded FIFO job queue with in-flight tracking.
//!
//! Producers call [`JobQueue::enqueue`] from any task. A single consumer
//! pulls jobs with a bounded wait so it can interleave housekeeping and
//! observe shutdown between jobs.

use crate::core::{Job, JobId};
use crate::errors::QueueError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

/// A job handed to the consumer and not yet finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlight {
    /// The job.
    pub job_id: JobId,
    /// When the consumer took it.
    pub dequeued_at: DateTime<Utc>,
}

impl InFlight {
    /// Time since the job was dequeued.
    #[must_use]
    pub fn age(&self) -> Duration {
        (Utc::now() - self.dequeued_at).to_std().unwrap_or_default()
    }
}

/// Point-in-time queue counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs waiting to be dequeued.
    pub queued: usize,
    /// Jobs dequeued and not yet finished.
    pub processing: usize,
    /// Ids of the jobs in flight.
    pub processing_ids: Vec<JobId>,
}

/// FIFO queue of submitted jobs.
#[derive(Debug)]
pub struct JobQueue {
    sender: mpsc::UnboundedSender<Job>,
    receiver: Mutex<mpsc::UnboundedReceiver<Job>>,
    queued: AtomicUsize,
    in_flight: DashMap<JobId, InFlight>,
    closed: AtomicBool,
    default_wait: Duration,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl JobQueue {
    /// Creates an empty queue whose [`dequeue`](Self::dequeue) waits at
    /// most `default_wait`.
    #[must_use]
    pub fn new(default_wait: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            queued: AtomicUsize::new(0),
            in_flight: DashMap::new(),
            closed: AtomicBool::new(false),
            default_wait,
        }
    }

    /// Appends a job to the tail of the queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] after [`close`](Self::close).
    pub fn enqueue(&self, job: Job) -> Result<JobId, QueueError> {
        let job_id = job.id;
        // Count first: a consumer that sees `closed` must also see this job.
        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() || self.sender.send(job).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::Closed);
        }
        trace!(%job_id, "Job enqueued");
        Ok(job_id)
    }

    /// Takes the head of the queue, waiting at most the default wait.
    pub async fn dequeue(&self) -> Option<Job> {
        self.dequeue_timeout(self.default_wait).await
    }

    /// Takes the head of the queue, waiting at most `wait`.
    ///
    /// Returns `None` if nothing arrived in time.
    pub async fn dequeue_timeout(&self, wait: Duration) -> Option<Job> {
        let recv = async {
            let mut receiver = self.receiver.lock().await;
            receiver.recv().await
        };
        let job = tokio::time::timeout(wait, recv).await.ok().flatten()?;

        self.queued.fetch_sub(1, Ordering::SeqCst);
        self.in_flight.insert(
            job.id,
            InFlight {
                job_id: job.id,
                dequeued_at: Utc::now(),
            },
        );
        debug!(job_id = %job.id, "Job dequeued");
        Some(job)
    }

    /// Clears the in-flight entry of a finished job.
    pub fn finish(&self, job_id: JobId) {
        self.in_flight.remove(&job_id);
    }

    /// Returns all in-flight entries, oldest first.
    #[must_use]
    pub fn in_flight(&self) -> Vec<InFlight> {
        let mut entries: Vec<InFlight> = self.in_flight.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| e.dequeued_at);
        entries
    }

    /// Returns in-flight entries older than `max_age`.
    #[must_use]
    pub fn stale_in_flight(&self, max_age: Duration) -> Vec<InFlight> {
        self.in_flight()
            .into_iter()
            .filter(|e| e.age() > max_age)
            .collect()
    }

    /// Returns current counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let processing_ids: Vec<JobId> = self.in_flight().into_iter().map(|e| e.job_id).collect();
        QueueStats {
            queued: self.len(),
            processing: processing_ids.len(),
            processing_ids,
        }
    }

    /// Stops accepting new jobs. Queued jobs can still be dequeued.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(remaining = self.len(), "Job queue closed");
        }
    }

    /// Returns true after [`close`](Self::close).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of jobs waiting to be dequeued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Returns true if no job is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
