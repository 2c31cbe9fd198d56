//! Stage trait and implementations.
//!
//! Stages are the pluggable units of work in a pipeline: recognition,
//! moderation, scoring, transcription, report generation. They all share
//! one contract, so the runner never needs to know what they do.

mod registry;
mod retry;

pub use registry::StageRegistry;
pub use retry::{BackoffStrategy, JitterStrategy, RetryConfig, RetryingStage};

use crate::context::StageContext;
use crate::core::StageResult;
use crate::errors::StageError;
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline stages.
///
/// Returning `Err` or a result with `success == false` both fail the job.
/// Use `Err` for unexpected conditions (I/O, unavailable services) so the
/// error can carry a retryable flag.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage against the job and all earlier results.
    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageResult, StageError>;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&StageContext<'_>) -> Result<StageResult, StageError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageContext<'_>) -> Result<StageResult, StageError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageContext<'_>) -> Result<StageResult, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageContext<'_>) -> Result<StageResult, StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageResult, StageError> {
        (self.func)(ctx)
    }
}
