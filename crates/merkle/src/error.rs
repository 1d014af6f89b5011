use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("empty root hash")]
    EmptyRoot,

    #[error("invalid index {index} for total {total}")]
    InvalidIndex { index: u64, total: u64 },

    #[error("expected hash of {expected} bytes, got {got}")]
    BadHashSize { expected: usize, got: usize },

    #[error("too many aunts: {0}")]
    TooManyAunts(usize),

    #[error("unexpected inner hashes")]
    UnexpectedInnerHashes,

    #[error("expected at least one inner hash")]
    MissingInnerHashes,

    #[error("leaf hash mismatch")]
    LeafHashMismatch,

    #[error("root hash mismatch")]
    RootHashMismatch,
}
