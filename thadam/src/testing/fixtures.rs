//! Test fixtures for submissions and configuration.

use crate::config::{SubmissionSchema, ThadamConfig};
use crate::core::{Submission, SubmissionMetadata};

/// Metadata that satisfies the default schema.
#[must_use]
pub fn valid_metadata() -> SubmissionMetadata {
    metadata_for("Folk Arts")
}

/// Metadata that satisfies the default schema, with a chosen category.
#[must_use]
pub fn metadata_for(category: &str) -> SubmissionMetadata {
    SubmissionMetadata::new()
        .with("title", "Parai drumming basics")
        .with("category", category)
        .with("description", "Rhythm patterns used in village festivals")
        .with("attribution", "Madurai folk collective")
        .with("consent", true)
}

/// A small text submission that satisfies the default schema.
#[must_use]
pub fn valid_submission() -> Submission {
    submission_for("Folk Arts")
}

/// A small text submission in the given category.
#[must_use]
pub fn submission_for(category: &str) -> Submission {
    Submission::new(
        b"The parai is a frame drum played at festivals.".to_vec(),
        metadata_for(category),
    )
    .with_filename("parai.txt")
}

/// Configuration with short intervals suited to tests.
#[must_use]
pub fn fast_config() -> ThadamConfig {
    let mut config = ThadamConfig::default();
    config.queue.dequeue_wait_ms = 20;
    config.orchestrator.wait_poll_interval_ms = 10;
    config.schema = SubmissionSchema::default();
    config
}
