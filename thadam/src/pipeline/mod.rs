//! Pipeline definition and execution.
//!
//! This module provides:
//! - Ordered pipeline definitions with pre-assigned progress
//! - Routing predicates evaluated between stages
//! - The sequential stage runner
//! - The category → pipeline catalog

mod builder;
mod catalog;
mod definition;
mod routing;
mod runner;

#[cfg(test)]
mod runner_tests;

pub use builder::PipelineBuilder;
pub use catalog::PipelineCatalog;
pub use definition::{PipelineDefinition, StageDescriptor};
pub use routing::{FlagRouter, FnRouter, RouteDecision, RoutingPredicate, ThresholdRouter};
pub use runner::{ProgressListener, RunOutcome, StageRunner, Termination};
pub(crate) use runner::panic_message;
