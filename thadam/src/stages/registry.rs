//! Name → stage lookup used to assemble pipelines from configuration.

use super::Stage;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of stage implementations keyed by name.
#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    stages: HashMap<String, Arc<dyn Stage>>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stage under its own name, replacing any previous entry.
    pub fn register(&mut self, stage: Arc<dyn Stage>) -> &mut Self {
        self.stages.insert(stage.name().to_string(), stage);
        self
    }

    /// Registers a stage, builder style.
    #[must_use]
    pub fn with(mut self, stage: Arc<dyn Stage>) -> Self {
        self.register(stage);
        self
    }

    /// Returns the stage registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Stage>> {
        self.stages.get(name).cloned()
    }

    /// Returns true if a stage is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    /// Returns the registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
