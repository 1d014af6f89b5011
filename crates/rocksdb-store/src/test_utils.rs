use std::sync::Arc;

use rocksdb::{ColumnFamilyDescriptor, Options, DB};

use crate::STORE_COLUMN_FAMILIES;

/// Opens a throwaway database under the OS temp dir with all column
/// families. The directory is left for the OS to clean up.
pub fn get_rocksdb_tmp_instance() -> Arc<DB> {
    let dir = tempfile::Builder::new()
        .prefix("fpd-rocksdb-test")
        .tempdir()
        .expect("test: create tempdir");

    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);

    let cfs = STORE_COLUMN_FAMILIES
        .iter()
        .map(|cf| ColumnFamilyDescriptor::new(*cf, Options::default()));

    let db = DB::open_cf_descriptors(&opts, dir.into_path(), cfs).expect("test: open rocksdb");
    Arc::new(db)
}
