//! Rocksdb-backed implementations of the store traits, one column family
//! per table, borsh-encoded values and big-endian height keys so range
//! scans come out in height order.

pub mod macros;
pub mod schema;

pub mod key_registry;
pub mod nonce_store;
pub mod proof_store;
pub mod provider_store;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

use std::path::Path;
use std::sync::Arc;

use fp_db::{DbError, DbResult};
use rocksdb::{ColumnFamilyDescriptor, Options, DB};

use crate::key_registry::EotsKeySchema;
use crate::nonce_store::NonceSchema;
use crate::proof_store::ProofSchema;
use crate::provider_store::FinalityProviderSchema;
use crate::schema::Schema;

pub use key_registry::EotsKeyDb;
pub use nonce_store::NonceDb;
pub use proof_store::ProofDb;
pub use provider_store::FinalityProviderDb;

pub const STORE_COLUMN_FAMILIES: &[&str] = &[
    NonceSchema::COLUMN_FAMILY_NAME,
    ProofSchema::COLUMN_FAMILY_NAME,
    FinalityProviderSchema::COLUMN_FAMILY_NAME,
    EotsKeySchema::COLUMN_FAMILY_NAME,
];

/// Opens (creating if needed) the database with all store column families.
pub fn open_rocksdb_database(datadir: &Path) -> DbResult<Arc<DB>> {
    let mut database_dir = datadir.to_path_buf();
    database_dir.push("rocksdb");

    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);

    let cfs = STORE_COLUMN_FAMILIES
        .iter()
        .map(|cf| ColumnFamilyDescriptor::new(*cf, Options::default()));

    let db = DB::open_cf_descriptors(&opts, &database_dir, cfs)
        .map_err(|e| DbError::Rocksdb(e.to_string()))?;
    Ok(Arc::new(db))
}
