//! Job lifecycle states and policy outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle state of a job.
///
/// `Queued` is initial. `Completed`, `Failed` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted and waiting in the queue.
    #[default]
    Queued,
    /// Dequeued and running through its pipeline.
    Processing,
    /// Every stage finished and the output was persisted.
    Completed,
    /// A stage or the infrastructure around it failed.
    Failed,
    /// A routing predicate halted the pipeline on policy grounds.
    Rejected,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl JobState {
    /// Returns true if the state can never change again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Rejected)
    }

    /// Returns true if the job is still waiting or running.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued | Self::Processing)
    }
}

/// Outcome of threshold routing on a completed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Score cleared the verified threshold; downstream stages ran.
    Verified,
    /// Score landed between the cut points; held for a human reviewer.
    Review,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verified => write!(f, "verified"),
            Self::Review => write!(f, "review"),
        }
    }
}

/// Category of a policy rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// Content was flagged by moderation.
    Moderation,
    /// A score fell below the review threshold.
    LowScore,
    /// Any other business rule.
    #[default]
    Policy,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Moderation => write!(f, "moderation"),
            Self::LowScore => write!(f, "low_score"),
            Self::Policy => write!(f, "policy"),
        }
    }
}

/// Machine-readable reason attached to a `rejected` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionReason {
    /// Rejection category.
    pub kind: RejectionKind,
    /// Human-readable detail, if the stage supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The score that triggered the rejection, for threshold rejections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl RejectionReason {
    /// Creates a reason of the given kind with no detail.
    #[must_use]
    pub fn new(kind: RejectionKind) -> Self {
        Self {
            kind,
            detail: None,
            score: None,
        }
    }

    /// Moderation flagged the content.
    #[must_use]
    pub fn moderation(detail: impl Into<String>) -> Self {
        Self::new(RejectionKind::Moderation).with_detail(detail)
    }

    /// A score fell below the review threshold.
    #[must_use]
    pub fn low_score(score: f64, review_threshold: f64) -> Self {
        Self {
            kind: RejectionKind::LowScore,
            detail: Some(format!(
                "score {score:.1} is below the review threshold {review_threshold:.1}"
            )),
            score: Some(score),
        }
    }

    /// Sets the detail message.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Returns the machine-readable code, e.g. `"moderation"`.
    #[must_use]
    pub fn code(&self) -> String {
        self.kind.to_string()
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", self.kind, detail),
            None => write!(f, "{}", self.kind),
        }
    }
}
