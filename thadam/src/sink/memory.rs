use super::ResultSink;
use crate::core::{FinalOutput, JobId, StoredId};
use crate::errors::SinkError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// Keeps outputs in process memory.
#[derive(Debug, Default)]
pub struct InMemoryResultSink {
    outputs: RwLock<HashMap<StoredId, FinalOutput>>,
    links: RwLock<HashMap<JobId, StoredId>>,
    store_calls: AtomicUsize,
}

impl InMemoryResultSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored id linked to a job.
    #[must_use]
    pub fn linked(&self, job_id: JobId) -> Option<StoredId> {
        self.links.read().get(&job_id).cloned()
    }

    /// Returns how many times `store` was called.
    #[must_use]
    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    /// Number of stored outputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.read().len()
    }

    /// Returns true if nothing was stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.read().is_empty()
    }
}

#[async_trait]
impl ResultSink for InMemoryResultSink {
    async fn store(&self, output: &FinalOutput) -> Result<StoredId, SinkError> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        let id = StoredId::new(Uuid::new_v4().to_string());
        self.outputs.write().insert(id.clone(), output.clone());
        Ok(id)
    }

    async fn link(&self, job_id: JobId, stored: &StoredId) -> Result<(), SinkError> {
        if !self.outputs.read().contains_key(stored) {
            return Err(SinkError::Missing(stored.to_string()));
        }
        self.links.write().insert(job_id, stored.clone());
        Ok(())
    }

    async fn fetch(&self, stored: &StoredId) -> Result<Option<FinalOutput>, SinkError> {
        Ok(self.outputs.read().get(stored).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn output() -> FinalOutput {
        FinalOutput {
            job_id: JobId::new(),
            pipeline: "default".to_string(),
            category: Some("Folk Arts".to_string()),
            verdict: None,
            stages: Vec::new(),
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_store_link_fetch() {
        let sink = InMemoryResultSink::new();
        let output = output();

        let id = sink.store(&output).await.unwrap();
        sink.link(output.job_id, &id).await.unwrap();

        assert_eq!(sink.linked(output.job_id), Some(id.clone()));
        assert_eq!(sink.store_calls(), 1);
        let fetched = sink.fetch(&id).await.unwrap().unwrap();
        assert_eq!(fetched.job_id, output.job_id);
        assert!(sink.fetch(&StoredId::new("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_link_unknown_id_fails() {
        let sink = InMemoryResultSink::new();
        let err = sink.link(JobId::new(), &StoredId::new("missing")).await;
        assert!(matches!(err, Err(SinkError::Missing(id)) if id == "missing"));
    }
}
