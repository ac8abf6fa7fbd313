use crate::config::IndexConfig;
use crate::error::{QpsError, Result};
use crate::index::{Document, IndexStore, StoreSnapshot};
use crate::indexer::Indexer;
use crate::searcher::Searcher;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

pub const SNAPSHOT_VERSION: u32 = 1;
pub const METADATA_VERSION: &str = "1.0";

const TITLE_MAX_LINE: usize = 100;
const TITLE_PREFIX: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    Note,
    Folder,
    #[serde(other)]
    Other,
}

/// A record from the note source. Only `Note` kinds with content are indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub kind: NoteKind,
    #[serde(default)]
    pub content: String,
}

impl Note {
    pub fn new(id: impl Into<String>, kind: NoteKind, content: impl Into<String>) -> Self {
        Self { id: id.into(), kind, content: content.into() }
    }

    fn is_indexable(&self) -> bool {
        self.kind == NoteKind::Note && !self.content.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QpsSearchResult {
    pub note_id: String,
    pub title: String,
    pub content: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    pub has_index: bool,
    pub total_documents: usize,
    pub total_tokens: usize,
    pub index_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub version: String,
    pub document_count: usize,
    pub token_count: usize,
    pub checksum: String,
    pub config: IndexConfig,
}

/// Versioned whole-engine snapshot. Unknown or missing fields fail decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    pub version: u32,
    pub config: IndexConfig,
    pub store: StoreSnapshot,
}

/// The part of a snapshot covered by the checksum.
#[derive(Serialize)]
struct ChecksumInput<'a> {
    config: &'a IndexConfig,
    store: &'a StoreSnapshot,
}

/// Quantum proximity search engine: owns configuration, the index store and
/// the indexer/searcher pair built from that configuration.
///
/// Not internally synchronized; callers serialize access (e.g. behind a lock).
#[derive(Debug, Clone)]
pub struct QpsService {
    config: IndexConfig,
    store: IndexStore,
    indexer: Indexer,
    searcher: Searcher,
}

impl Default for QpsService {
    fn default() -> Self { Self::new(IndexConfig::default()) }
}

impl QpsService {
    pub fn new(config: IndexConfig) -> Self {
        Self::with_store(config, IndexStore::new())
    }

    fn with_store(config: IndexConfig, store: IndexStore) -> Self {
        tracing::info!(
            max_segments = config.max_segments,
            proximity_bonus = config.proximity_bonus,
            documents = store.document_count(),
            "qps service initialized"
        );
        Self { indexer: Indexer::new(&config), searcher: Searcher::new(&config), config, store }
    }

    pub fn config(&self) -> &IndexConfig { &self.config }

    pub fn store(&self) -> &IndexStore { &self.store }

    pub fn search(&self, query: &str, limit: usize) -> Vec<QpsSearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        self.searcher
            .search(&self.store, query, limit)
            .into_iter()
            .map(|hit| QpsSearchResult {
                title: extract_title(&hit.content),
                note_id: hit.doc_id,
                content: hit.content,
                score: hit.score,
            })
            .collect()
    }

    /// Full rebuild from the note source. Documents that fail to index are
    /// logged and skipped. The rebuilt store replaces the current one in a
    /// single assignment, so the previous index stays intact until then.
    pub fn sync_all_notes(&mut self, notes: &[Note]) -> usize {
        tracing::info!(notes = notes.len(), "syncing notes into qps index");
        let mut fresh = IndexStore::new();
        let mut synced = 0usize;
        for note in notes.iter().filter(|n| n.is_indexable()) {
            match self.indexer.index(&mut fresh, &note.id, &note.content) {
                Ok(_) => synced += 1,
                Err(e) => tracing::warn!(note_id = %note.id, error = %e, "failed to index note"),
            }
        }
        self.store = fresh;
        tracing::info!(synced, tokens = self.store.token_count(), "qps index rebuilt");
        synced
    }

    /// Index or re-index one note. Returns its token count.
    pub fn index_note(&mut self, note_id: &str, content: &str) -> Result<usize> {
        self.indexer.index(&mut self.store, note_id, content)
    }

    pub fn remove_note(&mut self, note_id: &str) -> Option<Document> {
        self.store.remove_document(note_id)
    }

    pub fn document(&self, note_id: &str) -> Option<&Document> {
        self.store.get_document(note_id)
    }

    pub fn index_status(&self) -> IndexStatus {
        let total_documents = self.store.document_count();
        IndexStatus {
            has_index: total_documents > 0,
            total_documents,
            total_tokens: self.store.token_count(),
            index_size: total_documents,
        }
    }

    pub fn clear_index(&mut self) {
        self.store.clear();
        tracing::info!("qps index cleared");
    }

    /// Hex SHA-1 over the canonical JSON encoding of config and store.
    pub fn index_checksum(&self) -> Result<String> {
        let store = self.store.snapshot();
        checksum_of(&self.config, &store)
    }

    pub fn index_metadata(&self) -> Result<IndexMetadata> {
        Ok(IndexMetadata {
            version: METADATA_VERSION.to_string(),
            document_count: self.store.document_count(),
            token_count: self.store.token_count(),
            checksum: self.index_checksum()?,
            config: self.config,
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot { version: SNAPSHOT_VERSION, config: self.config, store: self.store.snapshot() }
    }

    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    pub fn deserialize(data: &str) -> Result<Self> {
        let snapshot: Snapshot =
            serde_json::from_str(data).map_err(|e| QpsError::MalformedSnapshot(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(QpsError::UnsupportedSnapshotVersion { found: snapshot.version, expected: SNAPSHOT_VERSION });
        }
        snapshot.config.validate().map_err(|e| QpsError::MalformedSnapshot(e.to_string()))?;
        let store = IndexStore::from_snapshot(snapshot.store)?;
        if let Some(max) = store.max_segment() {
            if max >= snapshot.config.max_segments {
                return Err(QpsError::MalformedSnapshot(format!(
                    "segment {max} outside configured bound {}",
                    snapshot.config.max_segments
                )));
            }
        }
        Ok(Self::with_store(snapshot.config, store))
    }
}

pub fn checksum_of(config: &IndexConfig, store: &StoreSnapshot) -> Result<String> {
    let bytes = serde_json::to_vec(&ChecksumInput { config, store })?;
    let mut hasher = Sha1::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// First line when it is short enough, otherwise the leading characters with an ellipsis.
pub fn extract_title(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or("").trim();
    let line_len = first_line.chars().count();
    if line_len > 0 && line_len <= TITLE_MAX_LINE {
        return first_line.to_string();
    }
    let prefix: String = content.chars().take(TITLE_PREFIX).collect();
    let ellipsis = if content.chars().count() > TITLE_PREFIX { "..." } else { "" };
    format!("{}{}", prefix.trim(), ellipsis)
}
