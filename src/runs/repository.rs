use async_trait::async_trait;

use super::RunRecord;

/// Errors from run store operations.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("run not found: {0}")]
    NotFound(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid run document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Persistence seam for run records. `update` replaces an existing run by id
/// and is not an upsert; an unknown id is a `NotFound` error and leaves the
/// stored list untouched.
#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn load(&self) -> Result<(), StoreError>;
    async fn list(&self) -> Vec<RunRecord>;
    async fn get(&self, id: &str) -> Option<RunRecord>;
    async fn add(&self, run: RunRecord) -> Result<(), StoreError>;
    async fn update(&self, run: RunRecord) -> Result<(), StoreError>;
}
