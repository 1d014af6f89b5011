use std::sync::{Arc, Mutex};

use fp_db::traits::NonceDatabase;
use fp_db::types::{NonceEntry, RandKey};
use fp_db::{DbError, DbResult};
use fp_primitives::Buf32;
use rocksdb::DB;
use tracing::warn;

use crate::define_table_with_borsh_value_codec;
use crate::schema::{self, Schema};

define_table_with_borsh_value_codec!(
    /// Per-height secret nonces and their consumption witness.
    (NonceSchema, "nonce_entry") RandKey => NonceEntry
);

pub struct NonceDb {
    db: Arc<DB>,
    // Serializes the read-check-write in `mark_consumed`; rocksdb gives us
    // atomic writes but not compare-and-set.
    consume_lock: Mutex<()>,
}

impl NonceDb {
    pub fn new(db: Arc<DB>) -> Self {
        Self {
            db,
            consume_lock: Mutex::new(()),
        }
    }
}

impl NonceDatabase for NonceDb {
    fn insert_nonces(
        &self,
        btc_pk: &Buf32,
        chain_id: &str,
        start_height: u64,
        secrets: &[Buf32],
    ) -> DbResult<()> {
        let mut items = Vec::with_capacity(secrets.len());
        for (i, secret) in secrets.iter().enumerate() {
            let key = RandKey::new(*btc_pk, chain_id, start_height + i as u64);
            match schema::get::<NonceSchema>(&self.db, &key)? {
                Some(existing) if existing.sec_rand == *secret => {
                    // Deterministic re-derivation of a batch we already
                    // hold; nothing to do for this height.
                    continue;
                }
                Some(_) => {
                    warn!(height = key.height, "nonce insert collided with different bytes");
                    return Err(DbError::AlreadyExists(NonceSchema::COLUMN_FAMILY_NAME));
                }
                None => items.push((key, NonceEntry::fresh(*secret))),
            }
        }
        schema::write_batch::<NonceSchema>(&self.db, &items)
    }

    fn get_nonce(&self, key: &RandKey) -> DbResult<Option<NonceEntry>> {
        schema::get::<NonceSchema>(&self.db, key)
    }

    fn mark_consumed(&self, key: &RandKey, msg_digest: &Buf32) -> DbResult<()> {
        let _guard = self.consume_lock.lock().expect("nonce consume lock poisoned");

        let mut entry = schema::get::<NonceSchema>(&self.db, key)?
            .ok_or(DbError::NotFound(NonceSchema::COLUMN_FAMILY_NAME))?;
        match entry.consumed {
            None => {
                entry.consumed = Some(*msg_digest);
                schema::put::<NonceSchema>(&self.db, key, &entry)
            }
            Some(existing) if existing == *msg_digest => Ok(()),
            Some(_) => Err(DbError::EquivocationAttempt(key.height)),
        }
    }
}
