//! Common wrapper around whatever we choose our native hash function to be.

use sha2::{Digest, Sha256};

use crate::buf::Buf32;

/// Direct untagged hash.
pub fn raw(buf: &[u8]) -> Buf32 {
    Buf32::from(<[u8; 32]>::from(Sha256::digest(buf)))
}

/// Digest that a finality vote signs over: `sha256(height_be || block_hash)`.
///
/// The encoding is fixed by the on-chain verifier and must not change.
pub fn vote_digest(height: u64, block_hash: &Buf32) -> Buf32 {
    let mut hasher = Sha256::new();
    hasher.update(height.to_be_bytes());
    hasher.update(block_hash.as_bytes());
    Buf32::from(<[u8; 32]>::from(hasher.finalize()))
}

/// Message signed over a public randomness commitment:
/// `start_height_be || num_pub_rand_be || commitment_root`.
///
/// Returned unhashed; the BIP-340 signer and the on-chain verifier both
/// consume the raw message.
pub fn commit_message(start_height: u64, num_pub_rand: u64, commitment: &Buf32) -> Vec<u8> {
    let mut msg = Vec::with_capacity(16 + 32);
    msg.extend_from_slice(&start_height.to_be_bytes());
    msg.extend_from_slice(&num_pub_rand.to_be_bytes());
    msg.extend_from_slice(commitment.as_bytes());
    msg
}
