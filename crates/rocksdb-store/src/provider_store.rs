use std::sync::{Arc, Mutex};

use fp_db::traits::FinalityProviderDatabase;
use fp_db::types::FinalityProvider;
use fp_db::{DbError, DbResult};
use fp_primitives::Buf32;
use rocksdb::DB;

use crate::define_table_with_borsh_value_codec;
use crate::schema::{self, Schema};

define_table_with_borsh_value_codec!(
    /// Registered finality provider records, keyed by BTC public key.
    (FinalityProviderSchema, "finality_provider") Buf32 => FinalityProvider
);

pub struct FinalityProviderDb {
    db: Arc<DB>,
    // Serializes the monotonicity check in `set_last_voted_height`.
    update_lock: Mutex<()>,
}

impl FinalityProviderDb {
    pub fn new(db: Arc<DB>) -> Self {
        Self {
            db,
            update_lock: Mutex::new(()),
        }
    }
}

impl FinalityProviderDatabase for FinalityProviderDb {
    fn put_finality_provider(&self, fp: &FinalityProvider) -> DbResult<()> {
        if schema::get::<FinalityProviderSchema>(&self.db, &fp.btc_pk)?.is_some() {
            return Err(DbError::AlreadyExists(
                FinalityProviderSchema::COLUMN_FAMILY_NAME,
            ));
        }
        schema::put::<FinalityProviderSchema>(&self.db, &fp.btc_pk, fp)
    }

    fn get_finality_provider(&self, btc_pk: &Buf32) -> DbResult<Option<FinalityProvider>> {
        schema::get::<FinalityProviderSchema>(&self.db, btc_pk)
    }

    fn list_finality_providers(&self) -> DbResult<Vec<FinalityProvider>> {
        Ok(schema::scan_all::<FinalityProviderSchema>(&self.db)?
            .into_iter()
            .map(|(_, fp)| fp)
            .collect())
    }

    fn set_last_voted_height(&self, btc_pk: &Buf32, height: u64) -> DbResult<()> {
        let _guard = self.update_lock.lock().expect("provider update lock poisoned");

        let mut fp = schema::get::<FinalityProviderSchema>(&self.db, btc_pk)?
            .ok_or(DbError::NotFound(FinalityProviderSchema::COLUMN_FAMILY_NAME))?;
        if height <= fp.last_voted_height {
            return Err(DbError::NonMonotonicHeight(fp.last_voted_height, height));
        }
        fp.last_voted_height = height;
        schema::put::<FinalityProviderSchema>(&self.db, btc_pk, &fp)
    }
}
