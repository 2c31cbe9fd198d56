use crate::core::{JobId, JobState, RejectionReason, StoredId, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observable state of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// The job.
    pub job_id: JobId,
    /// Lifecycle state.
    pub state: JobState,
    /// Percent complete, 0-100, never decreasing.
    pub progress: u8,
    /// The stage currently running, or the one that ended the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Failure description; set only when `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Rejection reason; set only when `rejected`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionReason>,
    /// Where the final output is stored; set only when `completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<StoredId>,
    /// Threshold routing verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
    /// When the job reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl StatusRecord {
    /// Creates a fresh record in `state`.
    #[must_use]
    pub fn new(job_id: JobId, state: JobState) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            state,
            progress: 0,
            stage: None,
            error: None,
            rejection: None,
            result_ref: None,
            verdict: None,
            created_at: now,
            updated_at: now,
            finished_at: state.is_terminal().then_some(now),
        }
    }

    /// Returns true once the job can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub(super) fn finish(&mut self, state: JobState) {
        let now = Utc::now();
        self.state = state;
        self.updated_at = now;
        self.finished_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record() {
        let record = StatusRecord::new(JobId::new(), JobState::Queued);
        assert_eq!(record.progress, 0);
        assert!(!record.is_terminal());
        assert!(record.finished_at.is_none());
    }

    #[test]
    fn test_serialization_omits_unset_fields() {
        let record = StatusRecord::new(JobId::new(), JobState::Processing);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["state"], "processing");
        assert!(value.get("error").is_none());
        assert!(value.get("result_ref").is_none());
    }
}
