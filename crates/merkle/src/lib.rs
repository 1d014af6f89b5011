//! RFC-6962 style merkle tree over byte slices, wire-compatible with the
//! CometBFT tree the consumer chain verifies commitments against.

mod error;
mod hash;
mod proof;
mod tree;

pub use error::MerkleError;
pub use proof::{proofs_from_byte_slices, Proof};
pub use tree::root_from_byte_slices;
