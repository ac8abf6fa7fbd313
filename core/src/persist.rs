use crate::error::{PersistError, TableError};
use crate::service::{IndexMetadata, QpsService};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;

/// Well-known id of the single persisted index record.
pub const MAIN_INDEX_ID: &str = "qps-main-index";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub version: String,
    pub checksum: String,
    /// Serialized [`crate::service::Snapshot`].
    pub data: String,
    pub metadata: IndexMetadata,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields replaced when an existing record is updated; `created_at` is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPatch {
    pub version: String,
    pub checksum: String,
    pub data: String,
    pub metadata: IndexMetadata,
    pub updated_at: String,
}

impl IndexRecord {
    fn apply(&mut self, patch: IndexPatch) {
        self.version = patch.version;
        self.checksum = patch.checksum;
        self.data = patch.data;
        self.metadata = patch.metadata;
        self.updated_at = patch.updated_at;
    }
}

/// Durable keyed table holding index records.
#[async_trait]
pub trait IndexTable: Send + Sync {
    /// Insert a new record, failing with [`TableError::AlreadyExists`] if the id is taken.
    async fn insert(&self, record: IndexRecord) -> Result<(), TableError>;
    /// Patch the record with `id`. Returns whether a record matched.
    async fn update(&self, id: &str, patch: IndexPatch) -> Result<bool, TableError>;
    async fn find_one(&self, id: &str) -> Result<Option<IndexRecord>, TableError>;
    async fn delete(&self, id: &str) -> Result<(), TableError>;
}

/// Process-local table, mainly for tests and throwaway engines.
#[derive(Debug, Default, Clone)]
pub struct MemoryIndexTable {
    records: Arc<Mutex<HashMap<String, IndexRecord>>>,
}

impl MemoryIndexTable {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.records.lock().len() }

    pub fn is_empty(&self) -> bool { self.records.lock().is_empty() }
}

#[async_trait]
impl IndexTable for MemoryIndexTable {
    async fn insert(&self, record: IndexRecord) -> Result<(), TableError> {
        let mut records = self.records.lock();
        if records.contains_key(&record.id) {
            return Err(TableError::AlreadyExists(record.id));
        }
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn update(&self, id: &str, patch: IndexPatch) -> Result<bool, TableError> {
        match self.records.lock().get_mut(id) {
            Some(record) => {
                record.apply(patch);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_one(&self, id: &str) -> Result<Option<IndexRecord>, TableError> {
        Ok(self.records.lock().get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<(), TableError> {
        self.records.lock().remove(id);
        Ok(())
    }
}

/// Table backed by a sled tree, one bincode-encoded record per key.
#[derive(Clone)]
pub struct SledIndexTable {
    tree: sled::Tree,
}

impl SledIndexTable {
    pub const TREE: &'static str = "qps_index";

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        let db = sled::open(path)?;
        Self::from_db(&db)
    }

    pub fn from_db(db: &sled::Db) -> Result<Self, TableError> {
        Ok(Self { tree: db.open_tree(Self::TREE)? })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, TableError>
    where
        T: Send + 'static,
        F: FnOnce(sled::Tree) -> Result<T, TableError> + Send + 'static,
    {
        let tree = self.tree.clone();
        tokio::task::spawn_blocking(move || f(tree))
            .await
            .map_err(|e| TableError::Task(e.to_string()))?
    }
}

#[async_trait]
impl IndexTable for SledIndexTable {
    async fn insert(&self, record: IndexRecord) -> Result<(), TableError> {
        self.blocking(move |tree| {
            let bytes = bincode::serialize(&record)?;
            let swapped = tree.compare_and_swap(record.id.as_bytes(), None as Option<&[u8]>, Some(bytes))?;
            if swapped.is_err() {
                return Err(TableError::AlreadyExists(record.id));
            }
            tree.flush()?;
            Ok(())
        })
        .await
    }

    async fn update(&self, id: &str, patch: IndexPatch) -> Result<bool, TableError> {
        let id = id.to_string();
        self.blocking(move |tree| {
            let Some(bytes) = tree.get(id.as_bytes())? else { return Ok(false) };
            let mut record: IndexRecord = bincode::deserialize(&bytes)?;
            record.apply(patch);
            tree.insert(id.as_bytes(), bincode::serialize(&record)?)?;
            tree.flush()?;
            Ok(true)
        })
        .await
    }

    async fn find_one(&self, id: &str) -> Result<Option<IndexRecord>, TableError> {
        let id = id.to_string();
        self.blocking(move |tree| match tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<(), TableError> {
        let id = id.to_string();
        self.blocking(move |tree| {
            tree.remove(id.as_bytes())?;
            tree.flush()?;
            Ok(())
        })
        .await
    }
}

/// Saves and restores a [`QpsService`] snapshot through an [`IndexTable`],
/// verifying the checksum on the way back in.
pub struct QpsPersistence<T> {
    table: T,
    index_id: String,
}

impl<T: IndexTable> QpsPersistence<T> {
    pub fn new(table: T) -> Self {
        Self::with_index_id(table, MAIN_INDEX_ID)
    }

    pub fn with_index_id(table: T, index_id: impl Into<String>) -> Self {
        Self { table, index_id: index_id.into() }
    }

    pub fn index_id(&self) -> &str { &self.index_id }

    /// Insert the snapshot, falling back to an update when the record exists.
    pub async fn save_index(&self, service: &QpsService) -> Result<IndexMetadata, PersistError> {
        let metadata = service.index_metadata()?;
        let data = service.serialize()?;
        let now = now_rfc3339();

        let record = IndexRecord {
            id: self.index_id.clone(),
            version: metadata.version.clone(),
            checksum: metadata.checksum.clone(),
            data: data.clone(),
            metadata: metadata.clone(),
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        match self.table.insert(record.clone()).await {
            Ok(()) => {}
            Err(TableError::AlreadyExists(_)) => {
                let patch = IndexPatch {
                    version: metadata.version.clone(),
                    checksum: metadata.checksum.clone(),
                    data,
                    metadata: metadata.clone(),
                    updated_at: now,
                };
                // The record vanished between insert and update: insert once more.
                if !self.table.update(&self.index_id, patch).await? {
                    tracing::warn!(index_id = %self.index_id, "index record disappeared during save, re-inserting");
                    self.table.insert(record).await?;
                }
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(
            index_id = %self.index_id,
            documents = metadata.document_count,
            checksum = %metadata.checksum,
            "qps index saved"
        );
        Ok(metadata)
    }

    /// Load the stored index. Absent, undecodable or checksum-mismatched
    /// records all yield `Ok(None)`; only table failures are errors.
    pub async fn load_index(&self) -> Result<Option<QpsService>, PersistError> {
        let Some(record) = self.table.find_one(&self.index_id).await? else {
            return Ok(None);
        };
        let service = match QpsService::deserialize(&record.data) {
            Ok(service) => service,
            Err(e) => {
                tracing::error!(index_id = %self.index_id, error = %e, "failed to deserialize qps index");
                return Ok(None);
            }
        };
        let checksum = service.index_checksum()?;
        if checksum != record.checksum {
            tracing::warn!(
                index_id = %self.index_id,
                stored = %record.checksum,
                computed = %checksum,
                "qps index checksum mismatch, data may be corrupted"
            );
            return Ok(None);
        }
        tracing::info!(index_id = %self.index_id, documents = service.index_status().total_documents, "qps index loaded");
        Ok(Some(service))
    }

    pub async fn delete_index(&self) -> Result<(), PersistError> {
        self.table.delete(&self.index_id).await?;
        tracing::info!(index_id = %self.index_id, "qps index deleted");
        Ok(())
    }

    /// Best-effort save: failures are logged, never returned.
    pub async fn auto_save(&self, service: &QpsService) {
        match self.save_index(service).await {
            Ok(_) => tracing::debug!(index_id = %self.index_id, "qps index auto-saved"),
            Err(e) => tracing::error!(index_id = %self.index_id, error = %e, "failed to auto-save qps index"),
        }
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "".into())
}
