use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("text index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "probe vector dimension mismatch: expected {expected}, got {actual}"
    )]
    InvalidProbe { expected: usize, actual: usize },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("embedding index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

impl Error {
    /// Whether the caller may usefully retry the failed operation.
    ///
    /// Only a transient index outage qualifies; validation and data errors
    /// never do.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::IndexUnavailable(_))
    }
}
