use std::sync::Arc;

use fp_db::traits::PubRandProofDatabase;
use fp_db::types::RandKey;
use fp_db::{DbError, DbResult};
use fp_primitives::Buf32;
use rocksdb::DB;

use crate::define_table_with_borsh_value_codec;
use crate::schema::{self, rand_key_prefix, KeyCodec};

define_table_with_borsh_value_codec!(
    /// Merkle inclusion proofs for committed public randomness.
    (ProofSchema, "pub_rand_proof") RandKey => Vec<u8>
);

pub struct ProofDb {
    db: Arc<DB>,
}

impl ProofDb {
    pub fn new(db: Arc<DB>) -> Self {
        Self { db }
    }
}

impl PubRandProofDatabase for ProofDb {
    fn insert_proofs(
        &self,
        btc_pk: &Buf32,
        chain_id: &str,
        start_height: u64,
        proofs: &[Vec<u8>],
    ) -> DbResult<()> {
        let mut items = Vec::with_capacity(proofs.len());
        for (i, proof) in proofs.iter().enumerate() {
            let key = RandKey::new(*btc_pk, chain_id, start_height + i as u64);
            match schema::get::<ProofSchema>(&self.db, &key)? {
                Some(existing) if existing == *proof => continue,
                Some(_) => return Err(DbError::Conflict(key.height)),
                None => items.push((key, proof.clone())),
            }
        }
        schema::write_batch::<ProofSchema>(&self.db, &items)
    }

    fn get_proof(&self, key: &RandKey) -> DbResult<Option<Vec<u8>>> {
        schema::get::<ProofSchema>(&self.db, key)
    }

    fn get_proofs(
        &self,
        btc_pk: &Buf32,
        chain_id: &str,
        from: u64,
        to: u64,
    ) -> DbResult<Vec<(u64, Vec<u8>)>> {
        let start = RandKey::new(*btc_pk, chain_id, from);
        let prefix = rand_key_prefix(btc_pk, chain_id);
        let entries = schema::scan_while::<ProofSchema>(&self.db, &start, |key| {
            key.encode_key().starts_with(&prefix) && key.height <= to
        })?;
        Ok(entries
            .into_iter()
            .map(|(key, proof)| (key.height, proof))
            .collect())
    }
}
