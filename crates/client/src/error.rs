use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// Transport-level error classification.
///
/// Pipelines only branch on the class: transient errors are retried with
/// backoff, duplicates are treated as success, rejections bubble up.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Timeout, connection failure, mempool congestion; worth retrying.
    #[error("transient: {0}")]
    Transient(String),

    /// The chain already holds the equivalent state.
    #[error("duplicate submission: {0}")]
    Duplicate(String),

    /// Permanent rejection; retrying the same call cannot succeed.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl ClientError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transient(_))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, ClientError::Duplicate(_))
    }
}
