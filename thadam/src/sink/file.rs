use super::ResultSink;
use crate::core::{FinalOutput, JobId, StoredId};
use crate::errors::SinkError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SinkDocument {
    #[serde(default)]
    results: BTreeMap<StoredId, FinalOutput>,
    #[serde(default)]
    links: BTreeMap<String, StoredId>,
}

/// Stores every output in one JSON document on disk.
///
/// Writes go to a sibling temporary file that is renamed over the
/// document, so readers never see a half-written file.
#[derive(Debug)]
pub struct JsonFileResultSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileResultSink {
    /// Creates a sink backed by `path`. The file is created on first store.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored id linked to a job.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read.
    pub async fn linked(&self, job_id: JobId) -> Result<Option<StoredId>, SinkError> {
        let _guard = self.lock.lock().await;
        let document = self.load().await?;
        Ok(document.links.get(&job_id.to_string()).cloned())
    }

    async fn load(&self) -> Result<SinkDocument, SinkError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(SinkDocument::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(SinkDocument::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, document: &SinkDocument) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ResultSink for JsonFileResultSink {
    async fn store(&self, output: &FinalOutput) -> Result<StoredId, SinkError> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        let id = StoredId::new(Uuid::new_v4().to_string());
        document.results.insert(id.clone(), output.clone());
        self.save(&document).await?;
        debug!(job_id = %output.job_id, stored_id = %id, path = %self.path.display(), "Stored result");
        Ok(id)
    }

    async fn link(&self, job_id: JobId, stored: &StoredId) -> Result<(), SinkError> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        if !document.results.contains_key(stored) {
            return Err(SinkError::Missing(stored.to_string()));
        }
        document.links.insert(job_id.to_string(), stored.clone());
        self.save(&document).await
    }

    async fn fetch(&self, stored: &StoredId) -> Result<Option<FinalOutput>, SinkError> {
        let _guard = self.lock.lock().await;
        let document = self.load().await?;
        Ok(document.results.get(stored).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StageResult, Verdict};
    use chrono::Utc;
    use serde_json::json;

    fn output() -> FinalOutput {
        FinalOutput {
            job_id: JobId::new(),
            pipeline: "default".to_string(),
            category: Some("Culinary Traditions".to_string()),
            verdict: Some(Verdict::Verified),
            stages: vec![StageResult::ok_value("authenticity_score", json!(91.5))],
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let sink = JsonFileResultSink::new(&path);
        let output = output();

        let id = sink.store(&output).await.unwrap();
        sink.link(output.job_id, &id).await.unwrap();

        let reopened = JsonFileResultSink::new(&path);
        let fetched = reopened.fetch(&id).await.unwrap().unwrap();
        assert_eq!(fetched.job_id, output.job_id);
        assert_eq!(fetched.verdict, Some(Verdict::Verified));
        assert_eq!(fetched.stages[0].get_f64("authenticity_score"), Some(91.5));
        assert_eq!(reopened.linked(output.job_id).await.unwrap(), Some(id));
        assert!(!dir.path().join("results.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileResultSink::new(dir.path().join("nested").join("results.json"));
        assert!(sink.fetch(&StoredId::new("x")).await.unwrap().is_none());
        assert!(matches!(
            sink.link(JobId::new(), &StoredId::new("x")).await,
            Err(SinkError::Missing(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_document_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, b"{not json").unwrap();

        let sink = JsonFileResultSink::new(&path);
        assert!(matches!(
            sink.fetch(&StoredId::new("x")).await,
            Err(SinkError::Serialization(_))
        ));
    }
}
