//! Routing predicates evaluated on a stage's output.
//!
//! A predicate turns one [`StageResult`] into a [`RouteDecision`]. The
//! runner stops at the first decision other than `Continue`.

use crate::config::ScoreThresholds;
use crate::core::{RejectionKind, RejectionReason, StageResult};
use std::fmt;

/// What the runner does after a routed stage.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    /// Run the next stage.
    Continue,
    /// Run the remaining stages; the job is verified.
    Approve,
    /// Stop here; the job completes pending manual review.
    HoldForReview,
    /// Stop here; the job is rejected.
    Reject(RejectionReason),
}

/// Decides how a pipeline proceeds from a stage's output.
pub trait RoutingPredicate: Send + Sync + fmt::Debug {
    /// Evaluates the stage output.
    fn route(&self, result: &StageResult) -> RouteDecision;
}

/// Rejects when a boolean output key is true.
#[derive(Debug, Clone)]
pub struct FlagRouter {
    key: String,
    reason_key: Option<String>,
    kind: RejectionKind,
}

impl FlagRouter {
    /// Creates a router rejecting with `kind` when `key` is true.
    #[must_use]
    pub fn new(key: impl Into<String>, kind: RejectionKind) -> Self {
        Self {
            key: key.into(),
            reason_key: None,
            kind,
        }
    }

    /// Content moderation: rejects with kind `moderation` and reads the
    /// reason from the `reason` key.
    #[must_use]
    pub fn moderation(key: impl Into<String>) -> Self {
        Self::new(key, RejectionKind::Moderation).with_reason_key("reason")
    }

    /// Sets the output key holding the human-readable reason.
    #[must_use]
    pub fn with_reason_key(mut self, key: impl Into<String>) -> Self {
        self.reason_key = Some(key.into());
        self
    }
}

impl RoutingPredicate for FlagRouter {
    fn route(&self, result: &StageResult) -> RouteDecision {
        if !result.get_bool(&self.key).unwrap_or(false) {
            return RouteDecision::Continue;
        }
        let mut reason = RejectionReason::new(self.kind);
        if let Some(detail) = self
            .reason_key
            .as_deref()
            .and_then(|key| result.get_str(key))
        {
            reason = reason.with_detail(detail);
        }
        RouteDecision::Reject(reason)
    }
}

/// Compares a numeric output key against two cut points.
///
/// A missing or non-numeric score counts as zero. A degraded result can
/// at best be held for review.
#[derive(Debug, Clone)]
pub struct ThresholdRouter {
    score_key: String,
    thresholds: ScoreThresholds,
}

impl ThresholdRouter {
    /// Creates a threshold router.
    #[must_use]
    pub fn new(score_key: impl Into<String>, thresholds: ScoreThresholds) -> Self {
        Self {
            score_key: score_key.into(),
            thresholds,
        }
    }

    /// Returns the cut points.
    #[must_use]
    pub fn thresholds(&self) -> ScoreThresholds {
        self.thresholds
    }
}

impl RoutingPredicate for ThresholdRouter {
    fn route(&self, result: &StageResult) -> RouteDecision {
        let score = result.get_f64(&self.score_key).unwrap_or(0.0);
        if score >= self.thresholds.verified {
            if result.is_degraded() {
                RouteDecision::HoldForReview
            } else {
                RouteDecision::Approve
            }
        } else if score >= self.thresholds.review {
            RouteDecision::HoldForReview
        } else {
            RouteDecision::Reject(RejectionReason::low_score(score, self.thresholds.review))
        }
    }
}

/// A predicate backed by a closure.
pub struct FnRouter<F>
where
    F: Fn(&StageResult) -> RouteDecision + Send + Sync,
{
    label: String,
    func: F,
}

impl<F> FnRouter<F>
where
    F: Fn(&StageResult) -> RouteDecision + Send + Sync,
{
    /// Creates a closure-backed predicate.
    pub fn new(label: impl Into<String>, func: F) -> Self {
        Self {
            label: label.into(),
            func,
        }
    }
}

impl<F> fmt::Debug for FnRouter<F>
where
    F: Fn(&StageResult) -> RouteDecision + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRouter").field("label", &self.label).finish()
    }
}

impl<F> RoutingPredicate for FnRouter<F>
where
    F: Fn(&StageResult) -> RouteDecision + Send + Sync,
{
    fn route(&self, result: &StageResult) -> RouteDecision {
        (self.func)(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn scored(score: f64) -> StageResult {
        StageResult::ok_value("authenticity_score", json!(score))
    }

    fn router() -> ThresholdRouter {
        ThresholdRouter::new("authenticity_score", ScoreThresholds::default())
    }

    #[test]
    fn test_threshold_bands() {
        let router = router();
        assert_eq!(router.route(&scored(92.0)), RouteDecision::Approve);
        assert_eq!(router.route(&scored(80.0)), RouteDecision::Approve);
        assert_eq!(router.route(&scored(75.0)), RouteDecision::HoldForReview);
        assert_eq!(router.route(&scored(70.0)), RouteDecision::HoldForReview);

        match router.route(&scored(40.0)) {
            RouteDecision::Reject(reason) => {
                assert_eq!(reason.kind, RejectionKind::LowScore);
                assert_eq!(reason.score, Some(40.0));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_score_rejects() {
        let decision = router().route(&StageResult::ok_empty());
        assert!(matches!(decision, RouteDecision::Reject(r) if r.score == Some(0.0)));
    }

    #[test]
    fn test_degraded_score_is_held() {
        let result = scored(95.0).degraded("heuristic fallback");
        assert_eq!(router().route(&result), RouteDecision::HoldForReview);
    }

    #[test]
    fn test_flag_router() {
        let router = FlagRouter::moderation("flagged");

        let clean = StageResult::ok_value("flagged", json!(false));
        assert_eq!(router.route(&clean), RouteDecision::Continue);
        assert_eq!(router.route(&StageResult::ok_empty()), RouteDecision::Continue);

        let flagged = StageResult::ok_value("flagged", json!(true))
            .with("reason", json!("graphic content"));
        match router.route(&flagged) {
            RouteDecision::Reject(reason) => {
                assert_eq!(reason.kind, RejectionKind::Moderation);
                assert_eq!(reason.detail.as_deref(), Some("graphic content"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_fn_router() {
        let router = FnRouter::new("always-hold", |_| RouteDecision::HoldForReview);
        assert_eq!(router.route(&StageResult::ok_empty()), RouteDecision::HoldForReview);
    }
}
