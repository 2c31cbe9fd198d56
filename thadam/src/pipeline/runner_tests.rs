use super::*;
use crate::config::ScoreThresholds;
use crate::core::{Job, JobId, RejectionKind, StageResult, Verdict};
use crate::errors::StageError;
use crate::events::CollectingEventSink;
use crate::stages::{FnStage, Stage};
use crate::testing::{
    valid_submission, CountingStage, FailingStage, FlagStage, PanickingStage, RecordingProgress,
    ScoreStage, SlowStage,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn job() -> Job {
    Job::new(valid_submission())
}

fn thresholds() -> Arc<ThresholdRouter> {
    Arc::new(ThresholdRouter::new(
        "authenticity_score",
        ScoreThresholds::default(),
    ))
}

fn verification(moderation_flagged: bool, score: f64) -> (PipelineDefinition, Arc<CountingStage>) {
    let pack = Arc::new(CountingStage::new("generate_pack"));
    let pipeline = PipelineBuilder::new("verification")
        .stage(Arc::new(CountingStage::new("recognize")))
        .routed_stage(
            Arc::new(FlagStage::new("moderate", moderation_flagged, "graphic content")),
            Arc::new(FlagRouter::moderation("flagged")),
        )
        .routed_stage(
            Arc::new(ScoreStage::new("authenticate", "authenticity_score", score)),
            thresholds(),
        )
        .stage(pack.clone())
        .build()
        .unwrap();
    (pipeline, pack)
}

#[tokio::test]
async fn test_runs_all_stages_in_order_with_progress() {
    let (pipeline, pack) = verification(false, 92.0);
    let job = job();
    let progress = RecordingProgress::new();

    let outcome = StageRunner::default().run(&pipeline, &job, &progress).await;

    assert_eq!(outcome.termination, Termination::Completed);
    assert_eq!(outcome.verdict, Some(Verdict::Verified));
    assert!(outcome.is_success());
    assert_eq!(pack.calls(), 1);

    let stages: Vec<&str> = outcome.results.iter().map(|r| r.stage.as_str()).collect();
    assert_eq!(stages, vec!["recognize", "moderate", "authenticate", "generate_pack"]);
    assert_eq!(progress.percents_for(job.id), vec![25, 50, 75, 100]);
    assert_eq!(
        progress.started(),
        vec!["recognize", "moderate", "authenticate", "generate_pack"]
    );
}

#[tokio::test]
async fn test_stages_see_previous_results() {
    let seen = Arc::new(Mutex::new(None));
    let seen_in_stage = seen.clone();
    let pipeline = PipelineBuilder::new("chain")
        .stage(Arc::new(FnStage::new("transcribe", |_ctx| {
            Ok(StageResult::ok_value("transcript", json!("vanakkam")))
        })))
        .stage(Arc::new(FnStage::new("summarize", move |ctx| {
            *seen_in_stage.lock() = ctx.lookup("transcript").cloned();
            Ok(StageResult::ok_empty())
        })))
        .build()
        .unwrap();

    let outcome = StageRunner::default()
        .run(&pipeline, &job(), &RecordingProgress::new())
        .await;

    assert_eq!(outcome.termination, Termination::Completed);
    assert_eq!(*seen.lock(), Some(json!("vanakkam")));
}

#[tokio::test]
async fn test_moderation_rejects_and_stops() {
    let (pipeline, pack) = verification(true, 92.0);
    let job = job();
    let progress = RecordingProgress::new();

    let outcome = StageRunner::default().run(&pipeline, &job, &progress).await;

    match &outcome.termination {
        Termination::Rejected { stage, reason } => {
            assert_eq!(stage, "moderate");
            assert_eq!(reason.kind, RejectionKind::Moderation);
            assert_eq!(reason.detail.as_deref(), Some("graphic content"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(pack.calls(), 0);
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(progress.percents_for(job.id), vec![25]);
}

#[tokio::test]
async fn test_score_between_thresholds_is_held() {
    let (pipeline, pack) = verification(false, 75.0);
    let job = job();
    let progress = RecordingProgress::new();

    let outcome = StageRunner::default().run(&pipeline, &job, &progress).await;

    assert_eq!(
        outcome.termination,
        Termination::HeldForReview {
            stage: "authenticate".to_string()
        }
    );
    assert_eq!(outcome.verdict, Some(Verdict::Review));
    assert!(outcome.is_success());
    assert_eq!(pack.calls(), 0);
    assert_eq!(progress.percents_for(job.id), vec![25, 50]);
}

#[tokio::test]
async fn test_low_score_rejects() {
    let (pipeline, pack) = verification(false, 42.0);

    let outcome = StageRunner::default()
        .run(&pipeline, &job(), &RecordingProgress::new())
        .await;

    match outcome.termination {
        Termination::Rejected { stage, reason } => {
            assert_eq!(stage, "authenticate");
            assert_eq!(reason.kind, RejectionKind::LowScore);
            assert_eq!(reason.score, Some(42.0));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(pack.calls(), 0);
}

#[tokio::test]
async fn test_stage_error_fails_and_skips_rest() {
    let after = Arc::new(CountingStage::new("after"));
    let pipeline = PipelineBuilder::new("failing")
        .stage(Arc::new(CountingStage::new("before")))
        .stage(Arc::new(FailingStage::new("recognize", "model offline")))
        .stage(after.clone())
        .build()
        .unwrap();
    let job = job();
    let progress = RecordingProgress::new();

    let outcome = StageRunner::default().run(&pipeline, &job, &progress).await;

    assert_eq!(
        outcome.termination,
        Termination::Failed {
            stage: "recognize".to_string(),
            error: "model offline".to_string(),
        }
    );
    assert!(!outcome.is_success());
    assert_eq!(after.calls(), 0);
    assert_eq!(progress.percents_for(job.id), vec![33]);

    let failed = outcome.results.last().unwrap();
    assert_eq!(failed.stage, "recognize");
    assert!(!failed.success);
}

#[tokio::test]
async fn test_unsuccessful_result_counts_as_failure() {
    let pipeline = PipelineBuilder::new("soft-fail")
        .stage(Arc::new(FnStage::new("recognize", |_ctx| {
            Ok(StageResult::fail("unsupported codec"))
        })))
        .build()
        .unwrap();

    let outcome = StageRunner::default()
        .run(&pipeline, &job(), &RecordingProgress::new())
        .await;

    assert!(matches!(
        outcome.termination,
        Termination::Failed { ref error, .. } if error == "unsupported codec"
    ));
}

#[tokio::test]
async fn test_panic_is_contained() {
    let pipeline = PipelineBuilder::new("panics")
        .stage(Arc::new(PanickingStage::new("recognize")))
        .build()
        .unwrap();

    let outcome = StageRunner::default()
        .run(&pipeline, &job(), &RecordingProgress::new())
        .await;

    match outcome.termination {
        Termination::Failed { stage, error } => {
            assert_eq!(stage, "recognize");
            assert!(error.contains("panicked"), "{error}");
            assert!(error.contains("recognize exploded"), "{error}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_timeout_fails_stage() {
    let pipeline = PipelineBuilder::new("slow")
        .stage(Arc::new(SlowStage::new("transcribe", Duration::from_secs(5))))
        .timeout(Duration::from_millis(20))
        .build()
        .unwrap();

    let outcome = StageRunner::default()
        .run(&pipeline, &job(), &RecordingProgress::new())
        .await;

    match outcome.termination {
        Termination::Failed { error, .. } => assert!(error.contains("timed out"), "{error}"),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_emits_stage_events() {
    let events = Arc::new(CollectingEventSink::new());
    let pipeline = PipelineBuilder::new("events")
        .stage(Arc::new(CountingStage::new("recognize")))
        .stage(Arc::new(FailingStage::new("moderate", "service down")))
        .build()
        .unwrap();

    StageRunner::new(events.clone())
        .run(&pipeline, &job(), &RecordingProgress::new())
        .await;

    assert_eq!(
        events.kinds(),
        vec!["stage.started", "stage.completed", "stage.started", "stage.failed"]
    );
}

#[tokio::test]
async fn test_closure_listener() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let listener = move |_job: JobId, percent: u8, stage: &str| {
        sink.lock().push((percent, stage.to_string()));
    };
    let pipeline = PipelineBuilder::new("closure")
        .stage(Arc::new(CountingStage::new("a")))
        .progress(40)
        .stage(Arc::new(CountingStage::new("b")))
        .build()
        .unwrap();

    StageRunner::default().run(&pipeline, &job(), &listener).await;

    assert_eq!(
        *seen.lock(),
        vec![(40, "a".to_string()), (100, "b".to_string())]
    );
}

#[tokio::test]
async fn test_fn_stage_error_conversion() {
    let pipeline = PipelineBuilder::new("anyhow")
        .stage(Arc::new(FnStage::new("recognize", |_ctx| {
            Err(StageError::from(anyhow::anyhow!("decoder crashed")))
        })))
        .build()
        .unwrap();
    let stage: &dyn Stage = pipeline.stages()[0].runner.as_ref();
    assert_eq!(stage.name(), "recognize");

    let outcome = StageRunner::default()
        .run(&pipeline, &job(), &RecordingProgress::new())
        .await;
    assert!(matches!(
        outcome.termination,
        Termination::Failed { ref error, .. } if error == "decoder crashed"
    ));
}

#[tokio::test]
async fn test_degraded_result_emits_event() {
    let events = Arc::new(CollectingEventSink::new());
    let pipeline = PipelineBuilder::new("degraded")
        .stage(Arc::new(
            ScoreStage::new("authenticate", "authenticity_score", 91.0).degraded(),
        ))
        .build()
        .unwrap();

    StageRunner::new(events.clone())
        .run(&pipeline, &job(), &RecordingProgress::new())
        .await;

    assert_eq!(
        events.kinds(),
        vec!["stage.started", "stage.completed", "stage.degraded"]
    );
}
