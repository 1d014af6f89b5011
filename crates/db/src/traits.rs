use fp_primitives::Buf32;

use crate::types::{EotsKeyRecord, FinalityProvider, NonceEntry, RandKey};
use crate::DbResult;

/// Store for per-height secret nonces, the single-use side of EOTS.
///
/// Implementations must be safe for concurrent use across providers; the
/// consume path is a compare-and-set.
pub trait NonceDatabase {
    /// Writes the nonces for `num` consecutive heights starting at
    /// `start_height`. Re-inserting a byte-identical unconsumed entry is a
    /// no-op (deterministic re-derivation after a crash lands here); a
    /// colliding key with different bytes fails with `AlreadyExists`.
    fn insert_nonces(
        &self,
        btc_pk: &Buf32,
        chain_id: &str,
        start_height: u64,
        secrets: &[Buf32],
    ) -> DbResult<()>;

    /// Gets the nonce entry at a key, if present.
    fn get_nonce(&self, key: &RandKey) -> DbResult<Option<NonceEntry>>;

    /// Atomically marks the nonce consumed for `msg_digest`.
    ///
    /// Unconsumed: records the digest. Consumed with the same digest: ok,
    /// idempotent. Consumed with a different digest: `EquivocationAttempt`,
    /// and the entry is left untouched.
    fn mark_consumed(&self, key: &RandKey, msg_digest: &Buf32) -> DbResult<()>;
}

/// Store for merkle inclusion proofs of committed public randomness.
pub trait PubRandProofDatabase {
    /// Writes proofs for `proofs.len()` consecutive heights starting at
    /// `start_height`. Idempotent when the stored bytes equal the incoming
    /// bytes; otherwise `Conflict`.
    fn insert_proofs(
        &self,
        btc_pk: &Buf32,
        chain_id: &str,
        start_height: u64,
        proofs: &[Vec<u8>],
    ) -> DbResult<()>;

    /// Gets the proof bytes at a key, if present.
    fn get_proof(&self, key: &RandKey) -> DbResult<Option<Vec<u8>>>;

    /// Returns `(height, proof)` pairs for heights in `from..=to`, ascending.
    fn get_proofs(
        &self,
        btc_pk: &Buf32,
        chain_id: &str,
        from: u64,
        to: u64,
    ) -> DbResult<Vec<(u64, Vec<u8>)>>;
}

/// Store for registered finality provider records.
pub trait FinalityProviderDatabase {
    /// Creates the record. Fails with `AlreadyExists` for a registered key.
    fn put_finality_provider(&self, fp: &FinalityProvider) -> DbResult<()>;

    /// Looks up a record by its BTC public key.
    fn get_finality_provider(&self, btc_pk: &Buf32) -> DbResult<Option<FinalityProvider>>;

    /// All registered records, in key order.
    fn list_finality_providers(&self) -> DbResult<Vec<FinalityProvider>>;

    /// Advances `last_voted_height`. Only `height > current` is accepted.
    fn set_last_voted_height(&self, btc_pk: &Buf32, height: u64) -> DbResult<()>;
}

/// Registry of EOTS keys created through the manager.
pub trait EotsKeyDatabase {
    /// Records a freshly created key. Fails with `AlreadyExists` if the
    /// public key is already registered.
    fn put_eots_key(&self, btc_pk: &Buf32, record: &EotsKeyRecord) -> DbResult<()>;

    /// Looks up the registry entry for a public key.
    fn get_eots_key(&self, btc_pk: &Buf32) -> DbResult<Option<EotsKeyRecord>>;

    /// All registered keys, in key order.
    fn list_eots_keys(&self) -> DbResult<Vec<(Buf32, EotsKeyRecord)>>;
}
