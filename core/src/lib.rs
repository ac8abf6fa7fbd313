//! Quantum proximity search: an in-memory full-text index for personal notes,
//! ranking by query-token coverage plus a segment-granular proximity bonus.

pub mod config;
pub mod error;
pub mod index;
pub mod indexer;
pub mod persist;
pub mod searcher;
pub mod service;
pub mod tokenizer;

pub use config::IndexConfig;
pub use error::{PersistError, QpsError, TableError};
pub use index::{DocId, Document, IndexStore, StoreSnapshot, TokenMap, TokenMetadata};
pub use persist::{IndexRecord, IndexTable, MemoryIndexTable, QpsPersistence, SledIndexTable, MAIN_INDEX_ID};
pub use service::{IndexMetadata, IndexStatus, Note, NoteKind, QpsSearchResult, QpsService, Snapshot};
