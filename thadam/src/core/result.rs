//! Stage result type with factory methods.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How much a stage trusts its own output.
///
/// Stages backed by an unavailable model or service return a degraded
/// result instead of placeholder data, so downstream routing can tell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum Confidence {
    /// Output came from the real implementation.
    #[default]
    Full,
    /// Output is a fallback or partial answer.
    Degraded {
        /// Why the output is degraded.
        reason: String,
    },
}

/// The output of one stage execution.
///
/// Immutable once the runner has stamped it; it becomes part of the
/// context every later stage of the same job can read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Name of the stage that produced this result.
    #[serde(default)]
    pub stage: String,
    /// Whether the stage succeeded.
    pub success: bool,
    /// Produced data.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, serde_json::Value>,
    /// Error detail for failed results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Confidence of the produced data.
    #[serde(default)]
    pub confidence: Confidence,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage ended.
    pub ended_at: DateTime<Utc>,
}

impl StageResult {
    /// Creates a successful result with data.
    #[must_use]
    pub fn ok(data: HashMap<String, serde_json::Value>) -> Self {
        let now = Utc::now();
        Self {
            stage: String::new(),
            success: true,
            data,
            error: None,
            confidence: Confidence::Full,
            started_at: now,
            ended_at: now,
        }
    }

    /// Creates a successful result with no data.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self::ok(HashMap::new())
    }

    /// Creates a successful result with a single value.
    #[must_use]
    pub fn ok_value(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut data = HashMap::new();
        data.insert(key.into(), value);
        Self::ok(data)
    }

    /// Creates a failed result.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::ok_empty()
        }
    }

    /// Adds a data entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Marks the output as degraded.
    #[must_use]
    pub fn degraded(mut self, reason: impl Into<String>) -> Self {
        self.confidence = Confidence::Degraded {
            reason: reason.into(),
        };
        self
    }

    /// Stamps the producing stage and timing. Called by the runner.
    #[must_use]
    pub(crate) fn stamped(mut self, stage: &str, started_at: DateTime<Utc>) -> Self {
        self.stage = stage.to_string();
        self.started_at = started_at;
        self.ended_at = Utc::now();
        self
    }

    /// Returns true if the confidence is degraded.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self.confidence, Confidence::Degraded { .. })
    }

    /// Returns a data value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Returns a data value as a number.
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(serde_json::Value::as_f64)
    }

    /// Returns a data value as a bool.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(serde_json::Value::as_bool)
    }

    /// Returns a data value as a string slice.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}
