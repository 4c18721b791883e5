use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::RunRecord;
use super::repository::{RunRepository, StoreError};

const STORE_FILE: &str = "runs.json";

/// On-disk shape: a single document holding the full run list.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RunsDocument {
    #[serde(default)]
    runs: Vec<RunRecord>,
}

/// JSON-document store for runs: in-memory `RwLock<Vec>` (insertion order =
/// creation order) persisted as one `runs.json` per mutation. The write lock
/// spans the whole read-modify-write, so concurrent operations cannot lose
/// updates.
pub struct FileRunRepository {
    runs: RwLock<Vec<RunRecord>>,
    dir: PathBuf,
}

impl FileRunRepository {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            runs: RwLock::new(Vec::new()),
            dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn store_path(&self) -> PathBuf {
        self.dir.join(STORE_FILE)
    }

    /// Persist the full document. Called with the write lock held.
    fn persist(&self, runs: &[RunRecord]) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let doc = RunsDocument {
            runs: runs.to_vec(),
        };
        let content = serde_json::to_string_pretty(&doc)?;

        // Atomic write via temp file + rename
        let path = self.store_path();
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

#[async_trait]
impl RunRepository for FileRunRepository {
    /// Load the persisted document. An absent file or empty document yields
    /// an empty run list; a malformed record fails the load outright.
    async fn load(&self) -> Result<(), StoreError> {
        let path = self.store_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no run store on disk yet");
            *self.runs.write().await = Vec::new();
            return Ok(());
        }

        let content = std::fs::read_to_string(&path)?;
        let doc: RunsDocument = if content.trim().is_empty() {
            RunsDocument::default()
        } else {
            serde_json::from_str(&content)?
        };

        tracing::info!(count = doc.runs.len(), "loaded runs from storage");
        *self.runs.write().await = doc.runs;
        Ok(())
    }

    async fn list(&self) -> Vec<RunRecord> {
        self.runs.read().await.clone()
    }

    async fn get(&self, id: &str) -> Option<RunRecord> {
        self.runs.read().await.iter().find(|r| r.id == id).cloned()
    }

    async fn add(&self, run: RunRecord) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        runs.push(run);
        self.persist(&runs)
    }

    async fn update(&self, run: RunRecord) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        match runs.iter_mut().find(|r| r.id == run.id) {
            Some(existing) => {
                *existing = run;
                self.persist(&runs)
            }
            None => Err(StoreError::NotFound(run.id)),
        }
    }
}
