//! Execution context handed to each stage.
//!
//! A [`StageContext`] borrows the job and every result produced so far by
//! earlier stages of the same job. Stages read from it; only the runner
//! appends to the accumulated results.

use crate::core::{Job, JobId, StageResult, SubmissionMetadata};

/// Read-only view of a job while one of its stages runs.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    job: &'a Job,
    stage_name: &'a str,
    results: &'a [StageResult],
    attempt: u32,
}

impl<'a> StageContext<'a> {
    /// Creates a context for `stage_name` with the results accumulated so far.
    #[must_use]
    pub fn new(job: &'a Job, stage_name: &'a str, results: &'a [StageResult]) -> Self {
        Self {
            job,
            stage_name,
            results,
            attempt: 1,
        }
    }

    /// Returns a copy of this context for a later attempt of the same stage.
    #[must_use]
    pub fn for_attempt(self, attempt: u32) -> Self {
        Self { attempt, ..self }
    }

    /// Returns the job ID.
    #[must_use]
    pub fn job_id(&self) -> JobId {
        self.job.id
    }

    /// Returns the job.
    #[must_use]
    pub fn job(&self) -> &'a Job {
        self.job
    }

    /// Returns the raw submission payload.
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        &self.job.submission.payload
    }

    /// Returns the submission metadata.
    #[must_use]
    pub fn metadata(&self) -> &'a SubmissionMetadata {
        &self.job.submission.metadata
    }

    /// Returns the name of the running stage.
    #[must_use]
    pub fn stage_name(&self) -> &'a str {
        self.stage_name
    }

    /// Returns the 1-based attempt number (greater than 1 only under retry).
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns all prior results in execution order.
    #[must_use]
    pub fn results(&self) -> &'a [StageResult] {
        self.results
    }

    /// Returns the result of an earlier stage.
    #[must_use]
    pub fn result_of(&self, stage: &str) -> Option<&'a StageResult> {
        self.results.iter().find(|r| r.stage == stage)
    }

    /// Returns the result of the immediately preceding stage.
    #[must_use]
    pub fn previous(&self) -> Option<&'a StageResult> {
        self.results.last()
    }

    /// Looks a key up in prior results, most recent stage first.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<&'a serde_json::Value> {
        self.results.iter().rev().find_map(|r| r.data.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Submission;
    use chrono::Utc;
    use serde_json::json;

    fn job() -> Job {
        Job::new(Submission::new(
            b"payload".to_vec(),
            SubmissionMetadata::new().with("category", "Folk Arts"),
        ))
    }

    #[test]
    fn test_context_accessors() {
        let job = job();
        let ctx = StageContext::new(&job, "moderate", &[]);

        assert_eq!(ctx.job_id(), job.id);
        assert_eq!(ctx.payload(), b"payload");
        assert_eq!(ctx.metadata().category(), Some("Folk Arts"));
        assert_eq!(ctx.stage_name(), "moderate");
        assert_eq!(ctx.attempt(), 1);
        assert!(ctx.previous().is_none());
    }

    #[test]
    fn test_lookup_prefers_latest_stage() {
        let job = job();
        let now = Utc::now();
        let results = vec![
            StageResult::ok_value("text", json!("raw")).stamped("recognize", now),
            StageResult::ok_value("text", json!("clean"))
                .with("flagged", json!(false))
                .stamped("moderate", now),
        ];
        let ctx = StageContext::new(&job, "authenticate", &results);

        assert_eq!(ctx.lookup("text"), Some(&json!("clean")));
        assert_eq!(ctx.lookup("missing"), None);
        assert_eq!(
            ctx.result_of("recognize").and_then(|r| r.get_str("text")),
            Some("raw")
        );
        assert_eq!(ctx.previous().map(|r| r.stage.as_str()), Some("moderate"));
    }

    #[test]
    fn test_for_attempt() {
        let job = job();
        let ctx = StageContext::new(&job, "enrich", &[]).for_attempt(3);
        assert_eq!(ctx.attempt(), 3);
        assert_eq!(ctx.stage_name(), "enrich");
    }
}
