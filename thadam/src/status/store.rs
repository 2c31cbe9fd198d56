use super::StatusRecord;
use crate::core::{JobId, JobState, RejectionReason, StoredId, Verdict};
use crate::errors::StatusError;
use chrono::Utc;
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, trace};

/// Per-job status records with change notification.
///
/// Each record lives in a `watch` channel so waiters are woken on every
/// change. Mutations on one job are atomic; readers get clones and never
/// observe a partially applied update.
#[derive(Debug, Default)]
pub struct StatusStore {
    records: DashMap<JobId, watch::Sender<StatusRecord>>,
}

impl StatusStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the record of a new job.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::AlreadyExists`] if the job already has a record.
    pub fn create(&self, job_id: JobId, state: JobState) -> Result<(), StatusError> {
        match self.records.entry(job_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StatusError::AlreadyExists(job_id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let (sender, _) = watch::channel(StatusRecord::new(job_id, state));
                slot.insert(sender);
                trace!(%job_id, %state, "Status record created");
                Ok(())
            }
        }
    }

    /// Moves a queued job to `processing`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown jobs or if the job is not queued.
    pub fn mark_processing(&self, job_id: JobId) -> Result<(), StatusError> {
        self.modify(job_id, |record| {
            if record.state != JobState::Queued {
                return Err(StatusError::InvalidTransition {
                    job_id,
                    from: record.state,
                    to: JobState::Processing,
                });
            }
            record.state = JobState::Processing;
            Ok(true)
        })
    }

    /// Records progress and the current stage.
    ///
    /// Progress is clamped to 100 and never decreases; a lower value leaves
    /// the recorded progress unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown or terminal jobs.
    pub fn update(&self, job_id: JobId, progress: u8, stage: &str) -> Result<(), StatusError> {
        self.modify(job_id, |record| {
            let progress = progress.min(100).max(record.progress);
            let changed = progress != record.progress || record.stage.as_deref() != Some(stage);
            record.progress = progress;
            if record.stage.as_deref() != Some(stage) {
                record.stage = Some(stage.to_string());
            }
            Ok(changed)
        })
    }

    /// Records the stage that is about to run.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown or terminal jobs.
    pub fn enter_stage(&self, job_id: JobId, stage: &str) -> Result<(), StatusError> {
        self.modify(job_id, |record| {
            if record.stage.as_deref() == Some(stage) {
                return Ok(false);
            }
            record.stage = Some(stage.to_string());
            Ok(true)
        })
    }

    /// Marks a processing job `completed` at 100% progress.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown jobs or jobs not in `processing`.
    pub fn complete(
        &self,
        job_id: JobId,
        result_ref: StoredId,
        verdict: Option<Verdict>,
    ) -> Result<(), StatusError> {
        self.finish(job_id, JobState::Completed, |record| {
            record.progress = 100;
            record.result_ref = Some(result_ref);
            record.verdict = verdict;
        })
    }

    /// Marks a processing job `failed`. Progress stays where it was.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown jobs or jobs not in `processing`.
    pub fn fail(&self, job_id: JobId, stage: &str, error: impl Into<String>) -> Result<(), StatusError> {
        let error = error.into();
        self.finish(job_id, JobState::Failed, |record| {
            record.stage = Some(stage.to_string());
            record.error = Some(error);
        })
    }

    /// Marks a processing job `rejected`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown jobs or jobs not in `processing`.
    pub fn reject(&self, job_id: JobId, stage: &str, reason: RejectionReason) -> Result<(), StatusError> {
        self.finish(job_id, JobState::Rejected, |record| {
            record.stage = Some(stage.to_string());
            record.rejection = Some(reason);
        })
    }

    /// Returns a snapshot of a job's record.
    #[must_use]
    pub fn get(&self, job_id: JobId) -> Option<StatusRecord> {
        self.records.get(&job_id).map(|sender| sender.borrow().clone())
    }

    /// Subscribes to changes of a job's record.
    #[must_use]
    pub fn subscribe(&self, job_id: JobId) -> Option<watch::Receiver<StatusRecord>> {
        self.records.get(&job_id).map(|sender| sender.subscribe())
    }

    /// Waits until a job reaches a terminal state.
    ///
    /// Wakes on every change and at least once per `poll_interval`.
    /// Returns `None` if the job is unknown.
    pub async fn wait_for_terminal(&self, job_id: JobId, poll_interval: Duration) -> Option<StatusRecord> {
        let mut receiver = self.subscribe(job_id)?;
        loop {
            {
                let current = receiver.borrow_and_update();
                if current.is_terminal() {
                    return Some(current.clone());
                }
            }
            match tokio::time::timeout(poll_interval, receiver.changed()).await {
                Ok(Ok(())) | Err(_) => {}
                Ok(Err(_)) => return self.get(job_id),
            }
        }
    }

    /// Snapshots every record, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<StatusRecord> {
        let mut records: Vec<StatusRecord> = self
            .records
            .iter()
            .map(|entry| entry.value().borrow().clone())
            .collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    /// Drops terminal records that finished more than `retention` ago.
    ///
    /// Records with live subscribers are kept. Returns how many were dropped.
    pub fn prune_finished(&self, retention: Duration) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = Utc::now() - retention;
        let before = self.records.len();
        self.records.retain(|_, sender| {
            let record = sender.borrow();
            let expired = record.finished_at.is_some_and(|at| at <= cutoff);
            !(expired && sender.receiver_count() == 0)
        });
        let pruned = before.saturating_sub(self.records.len());
        if pruned > 0 {
            debug!(pruned, "Pruned finished status records");
        }
        pruned
    }

    /// Removes a record that never entered the queue.
    pub(crate) fn discard(&self, job_id: JobId) {
        self.records.remove(&job_id);
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn finish<F>(&self, job_id: JobId, to: JobState, apply: F) -> Result<(), StatusError>
    where
        F: FnOnce(&mut StatusRecord),
    {
        self.modify(job_id, |record| {
            if record.state != JobState::Processing {
                return Err(StatusError::InvalidTransition {
                    job_id,
                    from: record.state,
                    to,
                });
            }
            apply(record);
            record.finish(to);
            debug!(%job_id, state = %to, progress = record.progress, "Job finished");
            Ok(true)
        })
    }

    fn modify<F>(&self, job_id: JobId, mutate: F) -> Result<(), StatusError>
    where
        F: FnOnce(&mut StatusRecord) -> Result<bool, StatusError>,
    {
        let sender = self
            .records
            .get(&job_id)
            .ok_or(StatusError::UnknownJob(job_id))?;

        let mut outcome = Ok(());
        sender.send_if_modified(|record| {
            if record.is_terminal() {
                outcome = Err(StatusError::AlreadyTerminal {
                    job_id,
                    state: record.state,
                });
                return false;
            }
            match mutate(record) {
                Ok(changed) => {
                    if changed {
                        record.updated_at = Utc::now();
                    }
                    changed
                }
                Err(err) => {
                    outcome = Err(err);
                    false
                }
            }
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RejectionKind;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn processing(store: &StatusStore) -> JobId {
        let job_id = JobId::new();
        store.create(job_id, JobState::Queued).unwrap();
        store.mark_processing(job_id).unwrap();
        job_id
    }

    #[test]
    fn test_create_and_get() {
        let store = StatusStore::new();
        let job_id = JobId::new();
        store.create(job_id, JobState::Queued).unwrap();

        let record = store.get(job_id).unwrap();
        assert_eq!(record.state, JobState::Queued);
        assert_eq!(record.progress, 0);
        assert_eq!(
            store.create(job_id, JobState::Queued),
            Err(StatusError::AlreadyExists(job_id))
        );
        assert!(store.get(JobId::new()).is_none());
    }

    #[test]
    fn test_unknown_job_mutation_errors() {
        let store = StatusStore::new();
        let job_id = JobId::new();
        assert_eq!(
            store.update(job_id, 10, "recognize"),
            Err(StatusError::UnknownJob(job_id))
        );
    }

    #[test]
    fn test_progress_never_decreases() {
        let store = StatusStore::new();
        let job_id = processing(&store);

        store.update(job_id, 45, "moderate").unwrap();
        store.update(job_id, 30, "authenticate").unwrap();
        let record = store.get(job_id).unwrap();
        assert_eq!(record.progress, 45);
        assert_eq!(record.stage.as_deref(), Some("authenticate"));

        store.update(job_id, 250, "generate_pack").unwrap();
        assert_eq!(store.get(job_id).unwrap().progress, 100);
    }

    #[test]
    fn test_complete_sets_result_and_full_progress() {
        let store = StatusStore::new();
        let job_id = processing(&store);
        store.update(job_id, 60, "authenticate").unwrap();

        store
            .complete(job_id, StoredId::new("r-1"), Some(Verdict::Verified))
            .unwrap();

        let record = store.get(job_id).unwrap();
        assert_eq!(record.state, JobState::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.result_ref, Some(StoredId::new("r-1")));
        assert_eq!(record.verdict, Some(Verdict::Verified));
        assert!(record.finished_at.is_some());
        assert!(record.error.is_none());
    }

    #[test]
    fn test_fail_freezes_progress() {
        let store = StatusStore::new();
        let job_id = processing(&store);
        store.update(job_id, 30, "recognize").unwrap();

        store.fail(job_id, "moderate", "stage 'moderate' failed: timeout").unwrap();

        let record = store.get(job_id).unwrap();
        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.progress, 30);
        assert_eq!(record.stage.as_deref(), Some("moderate"));
        assert!(record.error.unwrap().contains("moderate"));
        assert!(record.result_ref.is_none());
    }

    #[test]
    fn test_reject_records_reason_without_error() {
        let store = StatusStore::new();
        let job_id = processing(&store);

        store
            .reject(job_id, "moderate", RejectionReason::moderation("graphic content"))
            .unwrap();

        let record = store.get(job_id).unwrap();
        assert_eq!(record.state, JobState::Rejected);
        assert_eq!(record.rejection.unwrap().kind, RejectionKind::Moderation);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_terminal_records_are_immutable() {
        let store = StatusStore::new();
        let job_id = processing(&store);
        store.fail(job_id, "recognize", "boom").unwrap();

        let terminal = Err(StatusError::AlreadyTerminal {
            job_id,
            state: JobState::Failed,
        });
        assert_eq!(store.update(job_id, 90, "moderate"), terminal);
        assert_eq!(store.complete(job_id, StoredId::new("x"), None), terminal);
        assert_eq!(store.mark_processing(job_id), terminal);
        assert_eq!(store.get(job_id).unwrap().error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_invalid_transitions() {
        let store = StatusStore::new();
        let job_id = JobId::new();
        store.create(job_id, JobState::Queued).unwrap();

        assert_eq!(
            store.complete(job_id, StoredId::new("x"), None),
            Err(StatusError::InvalidTransition {
                job_id,
                from: JobState::Queued,
                to: JobState::Completed,
            })
        );
        store.mark_processing(job_id).unwrap();
        assert!(matches!(
            store.mark_processing(job_id),
            Err(StatusError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_wait_for_terminal_wakes_on_change() {
        let store = Arc::new(StatusStore::new());
        let job_id = processing(&store);

        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.update(job_id, 50, "moderate").unwrap();
            writer.complete(job_id, StoredId::new("r"), None).unwrap();
        });

        let record = tokio::time::timeout(
            Duration::from_secs(2),
            store.wait_for_terminal(job_id, Duration::from_secs(60)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(record.state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_wait_for_unknown_job() {
        let store = StatusStore::new();
        assert!(store
            .wait_for_terminal(JobId::new(), Duration::from_millis(10))
            .await
            .is_none());
    }

    #[test]
    fn test_prune_finished_keeps_active_and_subscribed() {
        let store = StatusStore::new();
        let active = processing(&store);
        let done = processing(&store);
        let watched = processing(&store);
        store.fail(done, "recognize", "boom").unwrap();
        store.fail(watched, "recognize", "boom").unwrap();
        let _receiver = store.subscribe(watched).unwrap();

        assert_eq!(store.prune_finished(Duration::from_secs(3600)), 0);
        assert_eq!(store.prune_finished(Duration::ZERO), 1);

        assert!(store.get(active).is_some());
        assert!(store.get(done).is_none());
        assert!(store.get(watched).is_some());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_list_snapshots_all_records() {
        let store = StatusStore::new();
        let first = processing(&store);
        let second = processing(&store);
        let ids: Vec<JobId> = store.list().iter().map(|r| r.job_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first) && ids.contains(&second));
    }
}
