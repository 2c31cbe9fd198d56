//! One wide event per finished job.

use crate::core::{Job, JobId, Verdict};
use crate::pipeline::{RunOutcome, Termination};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Everything worth knowing about a finished pipeline run, in one record.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    /// The job.
    pub job_id: JobId,
    /// The pipeline that ran.
    pub pipeline: String,
    /// Submission category.
    pub category: Option<String>,
    /// `completed`, `held`, `rejected` or `failed`.
    pub outcome: &'static str,
    /// Stage that ended the run early, if any.
    pub stopped_at: Option<String>,
    /// Rejection code or failure message.
    pub detail: Option<String>,
    /// Threshold routing verdict.
    pub verdict: Option<Verdict>,
    /// Per-stage duration in milliseconds.
    pub stage_durations: BTreeMap<String, i64>,
    /// Stages whose output was degraded.
    pub degraded_stages: Vec<String>,
    /// Sum of stage durations.
    pub duration_ms: i64,
}

impl JobSummary {
    /// Summarizes a finished run.
    #[must_use]
    pub fn from_outcome(job: &Job, pipeline: &str, outcome: &RunOutcome) -> Self {
        let (label, stopped_at, detail) = match &outcome.termination {
            Termination::Completed => ("completed", None, None),
            Termination::HeldForReview { stage } => ("held", Some(stage.clone()), None),
            Termination::Rejected { stage, reason } => {
                ("rejected", Some(stage.clone()), Some(reason.code()))
            }
            Termination::Failed { stage, error } => {
                ("failed", Some(stage.clone()), Some(error.clone()))
            }
        };

        let stage_durations: BTreeMap<String, i64> = outcome
            .results
            .iter()
            .map(|r| (r.stage.clone(), r.duration_ms()))
            .collect();
        let degraded_stages = outcome
            .results
            .iter()
            .filter(|r| r.is_degraded())
            .map(|r| r.stage.clone())
            .collect();

        Self {
            job_id: job.id,
            pipeline: pipeline.to_string(),
            category: job.category().map(str::to_string),
            outcome: label,
            stopped_at,
            detail,
            verdict: outcome.verdict,
            duration_ms: stage_durations.values().sum(),
            stage_durations,
            degraded_stages,
        }
    }

    /// Logs the summary as a single structured event.
    pub fn emit(&self) {
        let payload = serde_json::to_string(self).unwrap_or_default();
        info!(
            target: "thadam::summary",
            job_id = %self.job_id,
            pipeline = %self.pipeline,
            outcome = self.outcome,
            duration_ms = self.duration_ms,
            summary = %payload,
            "Job summary"
        );
    }
}
