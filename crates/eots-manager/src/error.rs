use fp_db::DbError;
use fp_primitives::Buf32;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EotsManagerError {
    #[error("no key registered for pubkey {0}")]
    KeyNotFound(Buf32),

    #[error("key {0} is not unlocked")]
    KeyLocked(Buf32),

    #[error("keystore entry `{0}` already exists")]
    KeyNameExists(String),

    #[error("keystore entry `{0}` is missing")]
    KeyFileMissing(String),

    #[error("passphrase does not open the sealed key")]
    BadPassphrase,

    #[error("keystore entry does not derive pubkey {0}")]
    KeyMismatch(Buf32),

    #[error("invalid hd path `{0}`")]
    InvalidHdPath(String),

    /// The on-chain commit covers this height but the local nonce entry is
    /// gone; local state is corrupted.
    #[error("nonce missing for height {0}")]
    NonceMissing(u64),

    /// The nonce was already consumed for a different message. No signature
    /// is produced and the caller must not retry.
    #[error("equivocation attempt at height {0}")]
    Equivocation(u64),

    #[error("keystore io: {0}")]
    Io(#[from] std::io::Error),

    #[error("kdf failure: {0}")]
    Kdf(argon2::Error),

    #[error("crypto: {0}")]
    Crypto(#[from] fp_eots::EotsError),

    #[error("db: {0}")]
    Db(DbError),
}

impl From<DbError> for EotsManagerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::EquivocationAttempt(height) => Self::Equivocation(height),
            other => Self::Db(other),
        }
    }
}
