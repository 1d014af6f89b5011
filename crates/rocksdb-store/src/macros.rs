//! Table definition macros, so each store declares its schema in one line.

/// Defines a table struct and its [`Schema`](crate::schema::Schema) binding
/// without committing to codecs.
#[macro_export]
macro_rules! define_table_without_codec {
    ($(#[$docs:meta])+ ($table_name:ident, $cf_name:literal) $key:ty => $value:ty) => {
        $(#[$docs])+
        #[derive(Clone, Copy, Debug, Default)]
        pub struct $table_name;

        impl $crate::schema::Schema for $table_name {
            const COLUMN_FAMILY_NAME: &'static str = $cf_name;
            type Key = $key;
            type Value = $value;
        }
    };
}

/// Implements [`ValueCodec`](crate::schema::ValueCodec) through borsh.
#[macro_export]
macro_rules! impl_borsh_value_codec {
    ($value:ty) => {
        impl $crate::schema::ValueCodec for $value {
            fn encode_value(&self) -> ::fp_db::DbResult<Vec<u8>> {
                ::borsh::to_vec(self).map_err(|e| ::fp_db::DbError::Codec(e.to_string()))
            }

            fn decode_value(buf: &[u8]) -> ::fp_db::DbResult<Self> {
                ::borsh::from_slice(buf).map_err(|e| ::fp_db::DbError::Codec(e.to_string()))
            }
        }
    };
}

/// Defines a table whose values are borsh-encoded. The key type must already
/// implement [`KeyCodec`](crate::schema::KeyCodec).
#[macro_export]
macro_rules! define_table_with_borsh_value_codec {
    ($(#[$docs:meta])+ ($table_name:ident, $cf_name:literal) $key:ty => $value:ty) => {
        $crate::define_table_without_codec!($(#[$docs])+ ($table_name, $cf_name) $key => $value);
        $crate::impl_borsh_value_codec!($value);
    };
}
