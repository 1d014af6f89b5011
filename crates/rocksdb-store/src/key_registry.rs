use std::sync::Arc;

use fp_db::traits::EotsKeyDatabase;
use fp_db::types::EotsKeyRecord;
use fp_db::{DbError, DbResult};
use fp_primitives::Buf32;
use rocksdb::DB;

use crate::define_table_with_borsh_value_codec;
use crate::schema::{self, Schema};

define_table_with_borsh_value_codec!(
    /// EOTS public key to keystore name mapping.
    (EotsKeySchema, "eots_key_registry") Buf32 => EotsKeyRecord
);

pub struct EotsKeyDb {
    db: Arc<DB>,
}

impl EotsKeyDb {
    pub fn new(db: Arc<DB>) -> Self {
        Self { db }
    }
}

impl EotsKeyDatabase for EotsKeyDb {
    fn put_eots_key(&self, btc_pk: &Buf32, record: &EotsKeyRecord) -> DbResult<()> {
        if schema::get::<EotsKeySchema>(&self.db, btc_pk)?.is_some() {
            return Err(DbError::AlreadyExists(EotsKeySchema::COLUMN_FAMILY_NAME));
        }
        schema::put::<EotsKeySchema>(&self.db, btc_pk, record)
    }

    fn get_eots_key(&self, btc_pk: &Buf32) -> DbResult<Option<EotsKeyRecord>> {
        schema::get::<EotsKeySchema>(&self.db, btc_pk)
    }

    fn list_eots_keys(&self) -> DbResult<Vec<(Buf32, EotsKeyRecord)>> {
        schema::scan_all::<EotsKeySchema>(&self.db)
    }
}
