//! Configuration for the orchestrator, queue, routing and pipelines.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration. Load with [`ThadamConfig::from_file`] or
//! [`ThadamConfig::from_toml_str`]; both validate before returning.

use crate::core::{RejectionKind, SubmissionMetadata};
use crate::errors::{ConfigError, ValidationError};
use crate::observability::LogFormat;
use crate::stages::RetryConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThadamConfig {
    /// Queue settings.
    pub queue: QueueConfig,
    /// Worker loop and waiting behavior.
    pub orchestrator: OrchestratorConfig,
    /// Submission limits.
    pub limits: LimitsConfig,
    /// Score cut points for threshold routing.
    pub thresholds: ScoreThresholds,
    /// Metadata schema enforced at submission.
    pub schema: SubmissionSchema,
    /// Logging setup.
    pub logging: LoggingConfig,
    /// Key of the pipeline used when no category-specific variant matches.
    pub default_pipeline: String,
    /// Pipeline layouts keyed by category (plus the default key).
    pub pipelines: HashMap<String, PipelineLayout>,
}

impl Default for ThadamConfig {
    fn default() -> Self {
        let mut pipelines = HashMap::new();
        pipelines.insert(default_pipeline_key(), PipelineLayout::verification());
        Self {
            queue: QueueConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            limits: LimitsConfig::default(),
            thresholds: ScoreThresholds::default(),
            schema: SubmissionSchema::default(),
            logging: LoggingConfig::default(),
            default_pipeline: default_pipeline_key(),
            pipelines,
        }
    }
}

fn default_pipeline_key() -> String {
    "default".to_string()
}

impl ThadamConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;

        if self.queue.dequeue_wait_ms == 0 {
            return Err(ConfigError::Invalid(
                "queue.dequeue_wait_ms must be positive".to_string(),
            ));
        }
        if self.orchestrator.wait_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.wait_poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.orchestrator.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.limits.max_payload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_payload_bytes must be positive".to_string(),
            ));
        }
        if !self.pipelines.contains_key(&self.default_pipeline) {
            return Err(ConfigError::Invalid(format!(
                "default pipeline '{}' has no layout",
                self.default_pipeline
            )));
        }
        for (key, layout) in &self.pipelines {
            if layout.stages.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "pipeline '{key}' has no stages"
                )));
            }
        }
        Ok(())
    }

    /// Returns the layout used for unknown categories.
    #[must_use]
    pub fn default_layout(&self) -> Option<&PipelineLayout> {
        self.pipelines.get(&self.default_pipeline)
    }
}

/// Job queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// How long one dequeue call waits before returning nothing.
    #[serde(default = "default_dequeue_wait_ms")]
    pub dequeue_wait_ms: u64,
}

fn default_dequeue_wait_ms() -> u64 {
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dequeue_wait_ms: default_dequeue_wait_ms(),
        }
    }
}

impl QueueConfig {
    /// Returns the dequeue wait as a Duration.
    #[must_use]
    pub fn dequeue_wait(&self) -> Duration {
        Duration::from_millis(self.dequeue_wait_ms)
    }
}

/// Worker loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Fallback re-check interval for `run_and_wait`.
    #[serde(default = "default_wait_poll_interval_ms")]
    pub wait_poll_interval_ms: u64,
    /// How many pipelines may interleave on the worker.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Time budget applied to stages without their own timeout.
    #[serde(default)]
    pub default_stage_timeout_ms: Option<u64>,
    /// In-flight jobs older than this are reported as stale.
    #[serde(default = "default_stale_job_after_secs")]
    pub stale_job_after_secs: u64,
    /// Terminal status records older than this are pruned. `None` keeps them.
    #[serde(default = "default_status_retention_secs")]
    pub status_retention_secs: Option<u64>,
}

fn default_wait_poll_interval_ms() -> u64 {
    1000
}

fn default_max_concurrent_jobs() -> usize {
    1
}

fn default_stale_job_after_secs() -> u64 {
    600
}

#[allow(clippy::unnecessary_wraps)]
fn default_status_retention_secs() -> Option<u64> {
    Some(3600)
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            wait_poll_interval_ms: default_wait_poll_interval_ms(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            default_stage_timeout_ms: None,
            stale_job_after_secs: default_stale_job_after_secs(),
            status_retention_secs: default_status_retention_secs(),
        }
    }
}

impl OrchestratorConfig {
    /// Returns the wait poll interval as a Duration.
    #[must_use]
    pub fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_poll_interval_ms)
    }

    /// Returns the stale threshold as a Duration.
    #[must_use]
    pub fn stale_job_after(&self) -> Duration {
        Duration::from_secs(self.stale_job_after_secs)
    }

    /// Returns the retention window, if pruning is enabled.
    #[must_use]
    pub fn status_retention(&self) -> Option<Duration> {
        self.status_retention_secs.map(Duration::from_secs)
    }
}

/// Submission limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest accepted payload in bytes.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

fn default_max_payload_bytes() -> usize {
    100 * 1024 * 1024 // 100MB
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

/// The two cut points of threshold routing.
///
/// `score >= verified` auto-approves, `score >= review` holds for manual
/// review, anything lower is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreThresholds {
    /// Auto-approve cut point.
    #[serde(default = "default_verified_threshold")]
    pub verified: f64,
    /// Manual-review cut point.
    #[serde(default = "default_review_threshold")]
    pub review: f64,
}

fn default_verified_threshold() -> f64 {
    80.0
}

fn default_review_threshold() -> f64 {
    70.0
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            verified: default_verified_threshold(),
            review: default_review_threshold(),
        }
    }
}

impl ScoreThresholds {
    /// Creates thresholds from explicit cut points.
    #[must_use]
    pub const fn new(verified: f64, review: f64) -> Self {
        Self { verified, review }
    }

    /// Both cut points must lie in 0..=100 with review <= verified.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !in_range(self.verified) || !in_range(self.review) {
            return Err(ConfigError::Invalid(format!(
                "thresholds must lie in 0..=100 (verified {}, review {})",
                self.verified, self.review
            )));
        }
        if self.review > self.verified {
            return Err(ConfigError::Invalid(format!(
                "review threshold {} exceeds verified threshold {}",
                self.review, self.verified
            )));
        }
        Ok(())
    }
}

/// Metadata rules checked before a job is queued.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionSchema {
    /// Fields that must be present and non-empty.
    pub required_fields: Vec<String>,
    /// Accepted categories; empty accepts any.
    pub allowed_categories: Vec<String>,
    /// Character limits per text field.
    pub max_field_lengths: HashMap<String, usize>,
    /// Whether `consent` must be `true`.
    pub require_consent: bool,
}

impl Default for SubmissionSchema {
    fn default() -> Self {
        let required_fields = ["title", "category", "description", "consent", "attribution"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let allowed_categories = [
            "Tamil Classical Dance",
            "Traditional Medicine",
            "Religious Rituals",
            "Folk Arts",
            "Culinary Traditions",
            "Musical Heritage",
            "Architectural Styles",
            "Literary Works",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
        let mut max_field_lengths = HashMap::new();
        max_field_lengths.insert("title".to_string(), 200);
        max_field_lengths.insert("description".to_string(), 2000);

        Self {
            required_fields,
            allowed_categories,
            max_field_lengths,
            require_consent: true,
        }
    }
}

impl SubmissionSchema {
    /// A schema that accepts any metadata.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            required_fields: Vec::new(),
            allowed_categories: Vec::new(),
            max_field_lengths: HashMap::new(),
            require_consent: false,
        }
    }

    /// Validates metadata against the schema.
    pub fn validate(&self, metadata: &SubmissionMetadata) -> Result<(), ValidationError> {
        for field in &self.required_fields {
            let Some(value) = metadata.get(field) else {
                return Err(ValidationError::MissingField {
                    field: field.clone(),
                });
            };
            // consent is a boolean and is checked on its own below
            if field != "consent" && is_empty_value(value) {
                return Err(ValidationError::EmptyField {
                    field: field.clone(),
                });
            }
        }

        if self.require_consent && !metadata.consent() {
            return Err(ValidationError::ConsentRequired);
        }

        if !self.allowed_categories.is_empty() {
            let category = metadata.category().unwrap_or_default();
            if !self.allowed_categories.iter().any(|c| c == category) {
                return Err(ValidationError::InvalidCategory {
                    category: category.to_string(),
                    allowed: self.allowed_categories.clone(),
                });
            }
        }

        for (field, max) in &self.max_field_lengths {
            if let Some(text) = metadata.get_str(field) {
                if text.chars().count() > *max {
                    return Err(ValidationError::FieldTooLong {
                        field: field.clone(),
                        max: *max,
                    });
                }
            }
        }

        Ok(())
    }
}

fn is_empty_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Logging setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "thadam=info".to_string(),
        }
    }
}

/// Ordered stage layout of one pipeline variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineLayout {
    /// Stages in execution order.
    pub stages: Vec<StageLayout>,
}

impl PipelineLayout {
    /// The submission verification pipeline:
    /// recognize → moderate → authenticate → generate_pack.
    #[must_use]
    pub fn verification() -> Self {
        Self {
            stages: vec![
                StageLayout::new("recognize"),
                StageLayout::new("moderate").with_route(RouteRule::Flag {
                    key: "flagged".to_string(),
                    reason_key: Some("reason".to_string()),
                    rejection: RejectionKind::Moderation,
                }),
                StageLayout::new("authenticate").with_route(RouteRule::Threshold {
                    score_key: "authenticity_score".to_string(),
                }),
                StageLayout::new("generate_pack"),
            ],
        }
    }
}

/// One stage slot in a pipeline layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLayout {
    /// Registered stage name.
    pub name: String,
    /// Progress reported once this stage completes; evenly spaced if unset.
    #[serde(default)]
    pub progress: Option<u8>,
    /// Time budget for this stage.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Bounded retry around this stage.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Routing rule evaluated on this stage's output.
    #[serde(default)]
    pub route: Option<RouteRule>,
}

impl StageLayout {
    /// Creates a layout slot with defaults.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            progress: None,
            timeout_ms: None,
            retry: None,
            route: None,
        }
    }

    /// Sets the progress percent.
    #[must_use]
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Sets the routing rule.
    #[must_use]
    pub fn with_route(mut self, route: RouteRule) -> Self {
        self.route = Some(route);
        self
    }
}

/// Declarative routing rule attached to a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteRule {
    /// Reject when a boolean output key is true.
    Flag {
        /// Output key holding the flag.
        key: String,
        /// Output key holding the human-readable reason.
        #[serde(default)]
        reason_key: Option<String>,
        /// Rejection category to report.
        #[serde(default)]
        rejection: RejectionKind,
    },
    /// Compare a numeric output key against the configured thresholds.
    Threshold {
        /// Output key holding the score.
        score_key: String,
    },
}
