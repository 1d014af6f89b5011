//! Collection of generic internal data types that are used widely.

pub mod buf;
pub mod hash;
pub mod types;

pub use buf::{Buf32, Buf64};
pub use types::{BlockInfo, PubRandCommit, TxResponse};
