use fp_client::ClientError;
use fp_db::DbError;
use fp_eots_manager::EotsManagerError;
use fp_primitives::Buf32;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("no finality provider registered for {0}")]
    NotRegistered(Buf32),

    /// Height past the end of the committed randomness range. Votes are
    /// refused until the next commit lands.
    #[error("randomness exhausted: height {height} outside committed range ending at {end}")]
    RandomnessExhausted { height: u64, end: u64 },

    /// The on-chain commit covers this height but no local proof exists;
    /// the proof store is corrupted.
    #[error("inclusion proof missing for height {0}")]
    ProofMissing(u64),

    /// Re-derived randomness does not hash to the root the chain holds.
    /// The signing key or the chain state changed under us.
    #[error("on-chain commit at {start} does not match locally derived randomness")]
    CommitMismatch { start: u64 },

    /// A nonce refused reuse during the vote pipeline. The affected votes
    /// were dropped and must never be retried.
    #[error("equivocation detected at height {0}")]
    EquivocationDetected(u64),

    #[error("client: {0}")]
    Client(#[from] ClientError),

    #[error("db: {0}")]
    Db(#[from] DbError),

    #[error("eots manager: {0}")]
    Eots(#[from] EotsManagerError),
}

/// Errors from app-level operations (registration, startup).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("client: {0}")]
    Client(#[from] ClientError),

    #[error("db: {0}")]
    Db(#[from] DbError),
}

impl InstanceError {
    /// Whether the error must pause the provider rather than be retried on
    /// the next tick.
    pub fn is_critical(&self) -> bool {
        match self {
            InstanceError::EquivocationDetected(_) | InstanceError::ProofMissing(_) => true,
            InstanceError::CommitMismatch { .. } => true,
            InstanceError::Eots(EotsManagerError::Equivocation(_)) => true,
            InstanceError::Eots(EotsManagerError::NonceMissing(_)) => true,
            InstanceError::Eots(EotsManagerError::KeyLocked(_)) => true,
            // Store conflicts mean local state disagrees with what the
            // chain was already told; operator intervention required.
            InstanceError::Db(DbError::Conflict(_)) => true,
            InstanceError::Db(DbError::AlreadyExists(_)) => true,
            _ => false,
        }
    }
}
