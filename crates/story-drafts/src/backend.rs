use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreResult;
use crate::record::HistoryRecord;

/// One logical table of drafts keyed by [`HistoryRecord::key`].
///
/// Backends only store and return whole records; the insert-or-update policy
/// lives in [`crate::DraftStore`].
#[async_trait]
pub trait DraftBackend: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<HistoryRecord>>;

    /// Insert the record, replacing any record stored under the same key.
    async fn put(&self, record: &HistoryRecord) -> StoreResult<()>;

    /// Every stored record, in whatever order the backend keeps them.
    async fn all(&self) -> StoreResult<Vec<HistoryRecord>>;

    async fn clear(&self) -> StoreResult<()>;
}

/// Drafts held in process memory. Lost when the process exits.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    records: Arc<RwLock<HashMap<String, HistoryRecord>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl DraftBackend for MemoryBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<HistoryRecord>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put(&self, record: &HistoryRecord) -> StoreResult<()> {
        self.records
            .write()
            .await
            .insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn all(&self) -> StoreResult<Vec<HistoryRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn clear(&self) -> StoreResult<()> {
        self.records.write().await.clear();
        Ok(())
    }
}
