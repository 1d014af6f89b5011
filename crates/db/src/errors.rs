use thiserror::Error;

/// Simple result type used across the database interface.
pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("entry already exists in {0}")]
    AlreadyExists(&'static str),

    #[error("entry not found in {0}")]
    NotFound(&'static str),

    /// The nonce at this height was already consumed for a different
    /// message digest. Signing anyway would leak the secret key.
    #[error("nonce at height {0} already consumed for a different message")]
    EquivocationAttempt(u64),

    /// Stored bytes differ from the incoming bytes for an insert-once key.
    #[error("stored entry at height {0} conflicts with incoming bytes")]
    Conflict(u64),

    #[error("last_voted_height must increase: current {0}, new {1}")]
    NonMonotonicHeight(u64, u64),

    #[error("rocksdb: {0}")]
    Rocksdb(String),

    #[error("codec: {0}")]
    Codec(String),

    #[error("{0}")]
    Other(String),
}
