//! Persistence of final outputs.
//!
//! The orchestrator calls [`ResultSink::store`] and then
//! [`ResultSink::link`] exactly once per job, and only when the job
//! completes. Failed and rejected jobs never reach the sink.

mod file;
mod memory;

pub use file::JsonFileResultSink;
pub use memory::InMemoryResultSink;

use crate::core::{FinalOutput, JobId, StoredId};
use crate::errors::SinkError;
use async_trait::async_trait;

/// Durable store for final outputs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Persists an output and returns its id.
    async fn store(&self, output: &FinalOutput) -> Result<StoredId, SinkError>;

    /// Associates a stored output with the job that produced it.
    async fn link(&self, job_id: JobId, stored: &StoredId) -> Result<(), SinkError>;

    /// Loads a stored output.
    async fn fetch(&self, stored: &StoredId) -> Result<Option<FinalOutput>, SinkError>;
}
