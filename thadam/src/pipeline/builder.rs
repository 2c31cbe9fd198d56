//! Pipeline builder with validation.

use super::{PipelineDefinition, RoutingPredicate, StageDescriptor};
use crate::errors::PipelineValidationError;
use crate::stages::Stage;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct PendingStage {
    runner: Arc<dyn Stage>,
    progress: Option<u8>,
    route: Option<Arc<dyn RoutingPredicate>>,
    timeout: Option<Duration>,
}

/// Builder for creating validated pipelines.
///
/// Stages without an explicit progress value get an evenly spaced one:
/// stage `k` of `n` reports `k * 100 / n`.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<PendingStage>,
    default_timeout: Option<Duration>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            default_timeout: None,
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, runner: Arc<dyn Stage>) -> Self {
        self.stages.push(PendingStage {
            runner,
            progress: None,
            route: None,
            timeout: None,
        });
        self
    }

    /// Appends a stage whose output is routed by `route`.
    #[must_use]
    pub fn routed_stage(mut self, runner: Arc<dyn Stage>, route: Arc<dyn RoutingPredicate>) -> Self {
        self.stages.push(PendingStage {
            runner,
            progress: None,
            route: Some(route),
            timeout: None,
        });
        self
    }

    /// Sets the progress reported by the most recently added stage.
    #[must_use]
    pub fn progress(mut self, percent: u8) -> Self {
        if let Some(last) = self.stages.last_mut() {
            last.progress = Some(percent);
        }
        self
    }

    /// Sets the time budget of the most recently added stage.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        if let Some(last) = self.stages.last_mut() {
            last.timeout = Some(timeout);
        }
        self
    }

    /// Sets the time budget for stages without their own.
    #[must_use]
    pub fn default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Validates and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank, there are no stages, a stage
    /// name repeats, or progress values exceed 100 or decrease.
    pub fn build(self) -> Result<PipelineDefinition, PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new(
                "Pipeline name cannot be empty or whitespace-only",
            ));
        }
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Pipeline '{}' has no stages",
                self.name
            )));
        }

        let total = self.stages.len();
        let mut seen = HashSet::new();
        let mut descriptors = Vec::with_capacity(total);
        let mut previous: Option<(String, u8)> = None;

        for (index, pending) in self.stages.into_iter().enumerate() {
            let name = pending.runner.name().to_string();
            if !seen.insert(name.clone()) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{name}' appears more than once in pipeline '{}'",
                    self.name
                ))
                .with_stages(vec![name]));
            }

            let progress = pending.progress.unwrap_or_else(|| even_progress(index, total));
            if progress > 100 {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{name}' reports progress {progress} above 100"
                ))
                .with_stages(vec![name]));
            }
            if let Some((prev_name, prev_progress)) = &previous {
                if progress < *prev_progress {
                    return Err(PipelineValidationError::new(format!(
                        "Stage '{name}' reports progress {progress} below '{prev_name}' ({prev_progress})"
                    ))
                    .with_stages(vec![prev_name.clone(), name]));
                }
            }
            previous = Some((name.clone(), progress));

            descriptors.push(StageDescriptor {
                name,
                runner: pending.runner,
                progress,
                route: pending.route,
                timeout: pending.timeout.or(self.default_timeout),
            });
        }

        Ok(PipelineDefinition::new(self.name, descriptors))
    }
}

fn even_progress(index: usize, total: usize) -> u8 {
    // index < total, so the quotient is at most 100
    u8::try_from((index + 1) * 100 / total).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FlagRouter;
    use crate::testing::CountingStage;

    fn stage(name: &str) -> Arc<dyn Stage> {
        Arc::new(CountingStage::new(name))
    }

    #[test]
    fn test_even_progress() {
        let pipeline = PipelineBuilder::new("five")
            .stage(stage("a"))
            .stage(stage("b"))
            .stage(stage("c"))
            .stage(stage("d"))
            .stage(stage("e"))
            .build()
            .unwrap();

        let progress: Vec<u8> = pipeline.stages().iter().map(|s| s.progress).collect();
        assert_eq!(progress, vec![20, 40, 60, 80, 100]);
        assert_eq!(pipeline.stage_names(), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_explicit_progress_and_timeouts() {
        let pipeline = PipelineBuilder::new("video")
            .default_timeout(Some(Duration::from_secs(30)))
            .stage(stage("transcribe"))
            .progress(15)
            .timeout(Duration::from_secs(120))
            .stage(stage("keyframes"))
            .progress(30)
            .build()
            .unwrap();

        let transcribe = pipeline.stage("transcribe").unwrap();
        assert_eq!(transcribe.progress, 15);
        assert_eq!(transcribe.timeout, Some(Duration::from_secs(120)));
        assert_eq!(
            pipeline.stage("keyframes").unwrap().timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_routed_stage_keeps_predicate() {
        let pipeline = PipelineBuilder::new("verify")
            .routed_stage(stage("moderate"), Arc::new(FlagRouter::moderation("flagged")))
            .build()
            .unwrap();
        assert!(pipeline.stages()[0].route.is_some());
    }

    #[test]
    fn test_rejects_empty_and_blank() {
        assert!(PipelineBuilder::new("empty").build().is_err());
        assert!(PipelineBuilder::new("  ").stage(stage("a")).build().is_err());
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let err = PipelineBuilder::new("dup")
            .stage(stage("a"))
            .stage(stage("a"))
            .build()
            .unwrap_err();
        assert_eq!(err.stages, vec!["a".to_string()]);
    }

    #[test]
    fn test_rejects_decreasing_progress() {
        let err = PipelineBuilder::new("backwards")
            .stage(stage("a"))
            .progress(60)
            .stage(stage("b"))
            .progress(40)
            .build()
            .unwrap_err();
        assert!(err.message.contains("below"));
    }

    #[test]
    fn test_rejects_progress_above_100() {
        assert!(PipelineBuilder::new("over")
            .stage(stage("a"))
            .progress(101)
            .build()
            .is_err());
    }
}
