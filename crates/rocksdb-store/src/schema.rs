//! Minimal typed schema layer over raw rocksdb column families.

use fp_db::types::RandKey;
use fp_db::{DbError, DbResult};
use fp_primitives::Buf32;
use rocksdb::{ColumnFamily, Direction, IteratorMode, WriteBatch, DB};

/// A typed table bound to one column family.
pub trait Schema {
    const COLUMN_FAMILY_NAME: &'static str;
    type Key: KeyCodec;
    type Value: ValueCodec;
}

/// Key encoding. Encodings must preserve the ordering range scans rely on.
pub trait KeyCodec: Sized {
    fn encode_key(&self) -> Vec<u8>;
    fn decode_key(buf: &[u8]) -> DbResult<Self>;
}

/// Value encoding, borsh in practice (see `impl_borsh_value_codec!`).
pub trait ValueCodec: Sized {
    fn encode_value(&self) -> DbResult<Vec<u8>>;
    fn decode_value(buf: &[u8]) -> DbResult<Self>;
}

impl KeyCodec for Buf32 {
    fn encode_key(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn decode_key(buf: &[u8]) -> DbResult<Self> {
        Buf32::try_from(buf).map_err(|e| DbError::Codec(e.to_string()))
    }
}

// `btc_pk || len(chain_id) be || chain_id || height be`. The length prefix
// keeps distinct chain ids from aliasing; the big-endian height makes
// lexicographic key order equal height order within one (pk, chain) group.
impl KeyCodec for RandKey {
    fn encode_key(&self) -> Vec<u8> {
        let chain = self.chain_id.as_bytes();
        let mut buf = Vec::with_capacity(32 + 4 + chain.len() + 8);
        buf.extend_from_slice(self.btc_pk.as_bytes());
        buf.extend_from_slice(&(chain.len() as u32).to_be_bytes());
        buf.extend_from_slice(chain);
        buf.extend_from_slice(&self.height.to_be_bytes());
        buf
    }

    fn decode_key(buf: &[u8]) -> DbResult<Self> {
        let too_short = || DbError::Codec("rand key too short".to_string());
        if buf.len() < 32 + 4 + 8 {
            return Err(too_short());
        }
        let btc_pk = Buf32::try_from(&buf[..32]).map_err(|e| DbError::Codec(e.to_string()))?;
        let chain_len = u32::from_be_bytes(buf[32..36].try_into().expect("checked len")) as usize;
        if buf.len() != 32 + 4 + chain_len + 8 {
            return Err(too_short());
        }
        let chain_id = std::str::from_utf8(&buf[36..36 + chain_len])
            .map_err(|e| DbError::Codec(e.to_string()))?
            .to_string();
        let height = u64::from_be_bytes(buf[36 + chain_len..].try_into().expect("checked len"));
        Ok(RandKey {
            btc_pk,
            chain_id,
            height,
        })
    }
}

/// Prefix shared by every height under one (pk, chain) group.
pub(crate) fn rand_key_prefix(btc_pk: &Buf32, chain_id: &str) -> Vec<u8> {
    let chain = chain_id.as_bytes();
    let mut buf = Vec::with_capacity(32 + 4 + chain.len());
    buf.extend_from_slice(btc_pk.as_bytes());
    buf.extend_from_slice(&(chain.len() as u32).to_be_bytes());
    buf.extend_from_slice(chain);
    buf
}

pub(crate) fn cf_handle<'a, S: Schema>(db: &'a DB) -> DbResult<&'a ColumnFamily> {
    db.cf_handle(S::COLUMN_FAMILY_NAME).ok_or_else(|| {
        DbError::Rocksdb(format!(
            "missing column family {}",
            S::COLUMN_FAMILY_NAME
        ))
    })
}

pub(crate) fn get<S: Schema>(db: &DB, key: &S::Key) -> DbResult<Option<S::Value>> {
    let cf = cf_handle::<S>(db)?;
    match db
        .get_cf(cf, key.encode_key())
        .map_err(|e| DbError::Rocksdb(e.to_string()))?
    {
        Some(bytes) => Ok(Some(S::Value::decode_value(&bytes)?)),
        None => Ok(None),
    }
}

pub(crate) fn put<S: Schema>(db: &DB, key: &S::Key, value: &S::Value) -> DbResult<()> {
    let cf = cf_handle::<S>(db)?;
    db.put_cf(cf, key.encode_key(), value.encode_value()?)
        .map_err(|e| DbError::Rocksdb(e.to_string()))
}

pub(crate) fn write_batch<S: Schema>(db: &DB, items: &[(S::Key, S::Value)]) -> DbResult<()> {
    let cf = cf_handle::<S>(db)?;
    let mut batch = WriteBatch::default();
    for (key, value) in items {
        batch.put_cf(cf, key.encode_key(), value.encode_value()?);
    }
    db.write(batch).map_err(|e| DbError::Rocksdb(e.to_string()))
}

/// Scans forward from `start`, decoding entries until `keep` declines one.
pub(crate) fn scan_while<S: Schema>(
    db: &DB,
    start: &S::Key,
    mut keep: impl FnMut(&S::Key) -> bool,
) -> DbResult<Vec<(S::Key, S::Value)>> {
    let cf = cf_handle::<S>(db)?;
    let start_key = start.encode_key();
    let iter = db.iterator_cf(cf, IteratorMode::From(&start_key, Direction::Forward));

    let mut out = Vec::new();
    for item in iter {
        let (key_bytes, value_bytes) = item.map_err(|e| DbError::Rocksdb(e.to_string()))?;
        let key = S::Key::decode_key(&key_bytes)?;
        if !keep(&key) {
            break;
        }
        out.push((key, S::Value::decode_value(&value_bytes)?));
    }
    Ok(out)
}

/// Decodes every entry in the column family, in key order.
pub(crate) fn scan_all<S: Schema>(db: &DB) -> DbResult<Vec<(S::Key, S::Value)>> {
    let cf = cf_handle::<S>(db)?;
    let mut out = Vec::new();
    for item in db.iterator_cf(cf, IteratorMode::Start) {
        let (key_bytes, value_bytes) = item.map_err(|e| DbError::Rocksdb(e.to_string()))?;
        out.push((
            S::Key::decode_key(&key_bytes)?,
            S::Value::decode_value(&value_bytes)?,
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rand_key_roundtrip() {
        let key = RandKey::new(Buf32::from([5; 32]), "test-chain", 0xdead_beef);
        let enc = key.encode_key();
        assert_eq!(RandKey::decode_key(&enc).unwrap(), key);
    }

    #[test]
    fn test_rand_key_orders_by_height() {
        let low = RandKey::new(Buf32::from([5; 32]), "c", 0x0100).encode_key();
        let high = RandKey::new(Buf32::from([5; 32]), "c", 0x01_0000).encode_key();
        assert!(low < high);
    }

    #[test]
    fn test_rand_key_prefix_matches_encoding() {
        let key = RandKey::new(Buf32::from([5; 32]), "chain", 42);
        let prefix = rand_key_prefix(&key.btc_pk, &key.chain_id);
        assert!(key.encode_key().starts_with(&prefix));
    }
}
