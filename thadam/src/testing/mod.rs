//! Testing utilities for thadam pipelines.
//!
//! This module provides:
//! - Mock stages with call counters
//! - A progress listener that records every callback
//! - Submission and configuration fixtures

mod fixtures;
mod mocks;

pub use fixtures::{fast_config, metadata_for, submission_for, valid_metadata, valid_submission};
pub use mocks::{
    CountingStage, FailingStage, FlagStage, FlakyStage, PanickingStage, RecordingProgress,
    ScoreStage, SlowStage, StageCall, StageTrace,
};
