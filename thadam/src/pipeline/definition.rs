//! Immutable pipeline and stage descriptors.

use super::RoutingPredicate;
use crate::stages::Stage;
use std::sync::Arc;
use std::time::Duration;

/// One stage slot in a pipeline.
#[derive(Debug, Clone)]
pub struct StageDescriptor {
    /// The unique name of the stage within the pipeline.
    pub name: String,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
    /// Progress reported once this stage completes.
    pub progress: u8,
    /// Routing predicate evaluated on the stage's output.
    pub route: Option<Arc<dyn RoutingPredicate>>,
    /// Time budget for one execution of the stage.
    pub timeout: Option<Duration>,
}

/// An ordered, validated sequence of stages.
///
/// Built once through [`PipelineBuilder`](super::PipelineBuilder) and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    name: String,
    stages: Vec<StageDescriptor>,
}

impl PipelineDefinition {
    pub(super) fn new(name: String, stages: Vec<StageDescriptor>) -> Self {
        Self { name, stages }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false for a built pipeline.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the descriptor of a named stage.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageDescriptor> {
        self.stages.iter().find(|s| s.name == name)
    }
}
