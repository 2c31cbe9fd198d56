//! Job identity and submission payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a fresh random job ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Structured metadata supplied with a submission.
///
/// Which fields are required is decided by the configured
/// [`SubmissionSchema`](crate::config::SubmissionSchema), so this is an
/// open JSON object with typed accessors for the well-known keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionMetadata {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl SubmissionMetadata {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds metadata from a JSON value; non-objects yield empty metadata.
    #[must_use]
    pub fn from_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(fields) => Self { fields },
            _ => Self::default(),
        }
    }

    /// Sets a field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns a raw field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    /// Returns a field as a string slice.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(serde_json::Value::as_str)
    }

    /// Returns true if the field is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// The submission category, used to pick a pipeline variant.
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.get_str("category")
    }

    /// The submission title.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.get_str("title")
    }

    /// Whether the uploader gave consent.
    #[must_use]
    pub fn consent(&self) -> bool {
        self.fields
            .get("consent")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Iterates over all fields.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.fields.iter()
    }
}

/// A client submission: opaque payload bytes plus metadata.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    /// Raw media or document bytes.
    pub payload: Vec<u8>,
    /// Original file name, if the client supplied one.
    pub filename: Option<String>,
    /// Structured metadata.
    pub metadata: SubmissionMetadata,
}

impl Submission {
    /// Creates a submission from payload bytes and metadata.
    #[must_use]
    pub fn new(payload: impl Into<Vec<u8>>, metadata: SubmissionMetadata) -> Self {
        Self {
            payload: payload.into(),
            filename: None,
            metadata,
        }
    }

    /// Sets the file name.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// A unit of work accepted by the orchestrator.
#[derive(Debug, Clone)]
pub struct Job {
    /// Immutable identity.
    pub id: JobId,
    /// The submission being processed.
    pub submission: Submission,
    /// When the job was accepted.
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Creates a job with a fresh ID.
    #[must_use]
    pub fn new(submission: Submission) -> Self {
        Self {
            id: JobId::new(),
            submission,
            created_at: Utc::now(),
        }
    }

    /// Returns the submission category.
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.submission.metadata.category()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_roundtrip_through_string() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_job_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn test_metadata_accessors() {
        let metadata = SubmissionMetadata::new()
            .with("title", "Kolam patterns")
            .with("category", "Folk Arts")
            .with("consent", true);

        assert_eq!(metadata.title(), Some("Kolam patterns"));
        assert_eq!(metadata.category(), Some("Folk Arts"));
        assert!(metadata.consent());
        assert!(!metadata.contains("description"));
    }

    #[test]
    fn test_metadata_from_non_object() {
        let metadata = SubmissionMetadata::from_value(serde_json::json!([1, 2]));
        assert_eq!(metadata.iter().count(), 0);
        assert!(!metadata.consent());
    }

    #[test]
    fn test_job_category() {
        let job = Job::new(Submission::new(
            b"text".to_vec(),
            SubmissionMetadata::new().with("category", "Culinary Traditions"),
        ));
        assert_eq!(job.category(), Some("Culinary Traditions"));
    }
}
