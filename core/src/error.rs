use thiserror::Error;

pub type Result<T> = std::result::Result<T, QpsError>;

/// Errors raised by the engine itself: configuration, indexing and snapshot decoding.
#[derive(Error, Debug)]
pub enum QpsError {
    #[error("invalid index config: {0}")]
    InvalidConfig(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedSnapshotVersion { found: u32, expected: u32 },

    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures reported by a durable table backing the persisted index.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("record {0} already exists")]
    AlreadyExists(String),

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("record codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("blocking task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error(transparent)]
    Engine(#[from] QpsError),

    #[error(transparent)]
    Table(#[from] TableError),
}
