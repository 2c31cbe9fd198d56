//! Final pipeline output handed to the result sink.

use super::{JobId, StageResult, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifier assigned by a result sink to a stored output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredId(String);

impl StoredId {
    /// Wraps a sink-specific identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoredId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The structured result of a job that reached `completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalOutput {
    /// The job this output belongs to.
    pub job_id: JobId,
    /// Name of the pipeline that produced it.
    pub pipeline: String,
    /// Submission category, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Threshold routing verdict, if the pipeline routes on a score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    /// Every stage result, in execution order.
    pub stages: Vec<StageResult>,
    /// When the job finished.
    pub completed_at: DateTime<Utc>,
}

impl FinalOutput {
    /// Returns the result of a named stage.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|r| r.stage == name)
    }

    /// Returns the last stage's result.
    #[must_use]
    pub fn last(&self) -> Option<&StageResult> {
        self.stages.last()
    }

    /// Merges all stage data; later stages win on key collisions.
    #[must_use]
    pub fn merged_data(&self) -> HashMap<String, serde_json::Value> {
        let mut merged = HashMap::new();
        for result in &self.stages {
            merged.extend(result.data.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }

    /// Returns true if any stage produced degraded output.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.stages.iter().any(StageResult::is_degraded)
    }
}
