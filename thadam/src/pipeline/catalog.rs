//! Category → pipeline lookup.

use super::{FlagRouter, PipelineBuilder, PipelineDefinition, RoutingPredicate, ThresholdRouter};
use crate::config::{PipelineLayout, RouteRule, ScoreThresholds, ThadamConfig};
use crate::errors::ConfigError;
use crate::stages::{RetryingStage, Stage, StageRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Maps submission categories to pipeline variants.
///
/// Categories without a variant of their own run the default pipeline.
#[derive(Debug, Clone)]
pub struct PipelineCatalog {
    default: Arc<PipelineDefinition>,
    variants: HashMap<String, Arc<PipelineDefinition>>,
}

impl PipelineCatalog {
    /// Creates a catalog holding only a default pipeline.
    #[must_use]
    pub fn new(default: PipelineDefinition) -> Self {
        Self {
            default: Arc::new(default),
            variants: HashMap::new(),
        }
    }

    /// Adds a variant for one category.
    #[must_use]
    pub fn with_variant(mut self, category: impl Into<String>, pipeline: PipelineDefinition) -> Self {
        self.variants.insert(category.into(), Arc::new(pipeline));
        self
    }

    /// Assembles every configured layout from registered stages.
    ///
    /// The layout named by `default_pipeline` becomes the default; every
    /// other layout is a variant keyed by its name.
    ///
    /// # Errors
    ///
    /// Returns an error if a layout names an unregistered stage, the
    /// default layout is missing, or a layout fails pipeline validation.
    pub fn from_config(config: &ThadamConfig, registry: &StageRegistry) -> Result<Self, ConfigError> {
        let default_timeout = config
            .orchestrator
            .default_stage_timeout_ms
            .map(Duration::from_millis);

        let mut default = None;
        let mut variants = HashMap::new();
        for (name, layout) in &config.pipelines {
            let pipeline = Arc::new(build_layout(
                name,
                layout,
                registry,
                config.thresholds,
                default_timeout,
            )?);
            debug!(pipeline = %name, stages = pipeline.len(), "Assembled pipeline");
            if *name == config.default_pipeline {
                default = Some(pipeline);
            } else {
                variants.insert(name.clone(), pipeline);
            }
        }

        let default = default.ok_or_else(|| {
            ConfigError::Invalid(format!(
                "default pipeline '{}' is not defined",
                config.default_pipeline
            ))
        })?;
        Ok(Self { default, variants })
    }

    /// Returns the pipeline for a category.
    #[must_use]
    pub fn resolve(&self, category: Option<&str>) -> Arc<PipelineDefinition> {
        category
            .and_then(|c| self.variants.get(c))
            .unwrap_or(&self.default)
            .clone()
    }

    /// Returns the default pipeline.
    #[must_use]
    pub fn default_pipeline(&self) -> &Arc<PipelineDefinition> {
        &self.default
    }

    /// Returns the categories with a dedicated variant, sorted.
    #[must_use]
    pub fn categories(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.variants.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn build_layout(
    name: &str,
    layout: &PipelineLayout,
    registry: &StageRegistry,
    thresholds: ScoreThresholds,
    default_timeout: Option<Duration>,
) -> Result<PipelineDefinition, ConfigError> {
    let mut builder = PipelineBuilder::new(name).default_timeout(default_timeout);

    for slot in &layout.stages {
        let registered = registry
            .get(&slot.name)
            .ok_or_else(|| ConfigError::UnknownStage {
                pipeline: name.to_string(),
                stage: slot.name.clone(),
            })?;
        let runner: Arc<dyn Stage> = match &slot.retry {
            Some(retry) => Arc::new(RetryingStage::new(registered, retry.clone())),
            None => registered,
        };

        builder = match &slot.route {
            Some(rule) => builder.routed_stage(runner, route_for(rule, thresholds)),
            None => builder.stage(runner),
        };
        if let Some(progress) = slot.progress {
            builder = builder.progress(progress);
        }
        if let Some(ms) = slot.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
    }

    Ok(builder.build()?)
}

fn route_for(rule: &RouteRule, thresholds: ScoreThresholds) -> Arc<dyn RoutingPredicate> {
    match rule {
        RouteRule::Flag {
            key,
            reason_key,
            rejection,
        } => {
            let mut router = FlagRouter::new(key.clone(), *rejection);
            if let Some(reason_key) = reason_key {
                router = router.with_reason_key(reason_key.clone());
            }
            Arc::new(router)
        }
        RouteRule::Threshold { score_key } => {
            Arc::new(ThresholdRouter::new(score_key.clone(), thresholds))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageLayout;
    use crate::pipeline::{StageRunner, Termination};
    use crate::core::Job;
    use crate::stages::RetryConfig;
    use crate::testing::{
        submission_for, CountingStage, FlagStage, FlakyStage, RecordingProgress, ScoreStage,
    };
    use pretty_assertions::assert_eq;

    fn registry() -> StageRegistry {
        StageRegistry::new()
            .with(Arc::new(CountingStage::new("recognize")))
            .with(Arc::new(FlagStage::new("moderate", false, "")))
            .with(Arc::new(ScoreStage::new(
                "authenticate",
                "authenticity_score",
                88.0,
            )))
            .with(Arc::new(CountingStage::new("generate_pack")))
            .with(Arc::new(CountingStage::new("transcribe")))
    }

    #[test]
    fn test_default_layout_assembles() {
        let catalog = PipelineCatalog::from_config(&ThadamConfig::default(), &registry()).unwrap();

        let pipeline = catalog.resolve(None);
        assert_eq!(pipeline.name(), "default");
        assert_eq!(
            pipeline.stage_names(),
            vec!["recognize", "moderate", "authenticate", "generate_pack"]
        );
        assert!(pipeline.stage("moderate").unwrap().route.is_some());
        assert!(pipeline.stage("authenticate").unwrap().route.is_some());
        assert!(pipeline.stage("recognize").unwrap().route.is_none());
    }

    #[test]
    fn test_unknown_category_resolves_to_default() {
        let mut config = ThadamConfig::default();
        config.pipelines.insert(
            "Culinary Traditions".to_string(),
            PipelineLayout {
                stages: vec![
                    StageLayout::new("transcribe").with_progress(60),
                    StageLayout::new("generate_pack"),
                ],
            },
        );
        let catalog = PipelineCatalog::from_config(&config, &registry()).unwrap();

        assert_eq!(catalog.categories(), vec!["Culinary Traditions"]);
        let recipe = catalog.resolve(Some("Culinary Traditions"));
        assert_eq!(recipe.stage_names(), vec!["transcribe", "generate_pack"]);
        assert_eq!(recipe.stages()[0].progress, 60);
        assert_eq!(catalog.resolve(Some("Folk Arts")).name(), "default");
    }

    #[test]
    fn test_unknown_stage_is_config_error() {
        let mut config = ThadamConfig::default();
        config.pipelines.insert(
            "broken".to_string(),
            PipelineLayout {
                stages: vec![StageLayout::new("does_not_exist")],
            },
        );

        match PipelineCatalog::from_config(&config, &registry()) {
            Err(ConfigError::UnknownStage { pipeline, stage }) => {
                assert_eq!(pipeline, "broken");
                assert_eq!(stage, "does_not_exist");
            }
            other => panic!("expected unknown stage error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_default_is_config_error() {
        let mut config = ThadamConfig::default();
        config.default_pipeline = "absent".to_string();
        assert!(matches!(
            PipelineCatalog::from_config(&config, &registry()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_timeouts_from_config() {
        let mut config = ThadamConfig::default();
        config.orchestrator.default_stage_timeout_ms = Some(5_000);
        let mut layout = PipelineLayout::verification();
        layout.stages[0].timeout_ms = Some(250);
        config.pipelines.insert("default".to_string(), layout);

        let catalog = PipelineCatalog::from_config(&config, &registry()).unwrap();
        let pipeline = catalog.resolve(None);
        assert_eq!(
            pipeline.stage("recognize").unwrap().timeout,
            Some(Duration::from_millis(250))
        );
        assert_eq!(
            pipeline.stage("moderate").unwrap().timeout,
            Some(Duration::from_secs(5))
        );
    }

    #[tokio::test]
    async fn test_retry_layout_wraps_stage() {
        let flaky = Arc::new(FlakyStage::new("transcribe", 2));
        let registry = StageRegistry::new().with(flaky.clone());

        let mut config = ThadamConfig::default();
        let mut slot = StageLayout::new("transcribe");
        slot.retry = Some(RetryConfig::new().with_max_attempts(3).with_base_delay_ms(1));
        config
            .pipelines
            .insert("default".to_string(), PipelineLayout { stages: vec![slot] });

        let catalog = PipelineCatalog::from_config(&config, &registry).unwrap();
        let job = Job::new(submission_for("Musical Heritage"));
        let outcome = StageRunner::default()
            .run(&catalog.resolve(job.category()), &job, &RecordingProgress::new())
            .await;

        assert_eq!(outcome.termination, Termination::Completed);
        assert_eq!(flaky.calls(), 3);
    }
}
