use borsh::{BorshDeserialize, BorshSerialize};

use crate::error::MerkleError;
use crate::hash::{inner_hash, leaf_hash, HASH_SIZE};
use crate::tree::split_point;

/// Proof of a leaf's existence in a merkle tree.
///
/// The convention, shared with the on-chain verifier, is to include the leaf
/// hash but exclude the root hash. Aunts are ordered bottom-up.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct Proof {
    pub total: u64,
    pub index: u64,
    pub leaf_hash: Vec<u8>,
    pub aunts: Vec<Vec<u8>>,
}

impl Proof {
    pub const MAX_AUNTS: usize = 100;

    /// Performs basic structural validation: hash sizes and aunt count.
    pub fn validate_basic(&self) -> Result<(), MerkleError> {
        if self.leaf_hash.len() != HASH_SIZE {
            return Err(MerkleError::BadHashSize {
                expected: HASH_SIZE,
                got: self.leaf_hash.len(),
            });
        }
        if self.aunts.len() > Self::MAX_AUNTS {
            return Err(MerkleError::TooManyAunts(self.aunts.len()));
        }
        for aunt in &self.aunts {
            if aunt.len() != HASH_SIZE {
                return Err(MerkleError::BadHashSize {
                    expected: HASH_SIZE,
                    got: aunt.len(),
                });
            }
        }
        Ok(())
    }

    /// Verifies that this proof links `leaf` to `root_hash`.
    pub fn verify(&self, root_hash: &[u8], leaf: &[u8]) -> Result<(), MerkleError> {
        if root_hash.is_empty() {
            return Err(MerkleError::EmptyRoot);
        }
        self.validate_basic()?;
        if self.leaf_hash != leaf_hash(leaf) {
            return Err(MerkleError::LeafHashMismatch);
        }
        let computed = compute_hash_from_aunts(self.index, self.total, &self.leaf_hash, &self.aunts)?;
        if computed != root_hash {
            return Err(MerkleError::RootHashMismatch);
        }
        Ok(())
    }
}

/// Computes proofs for every leaf at once, along with the root hash.
///
/// The returned proofs are in leaf order and verify against the returned
/// root. Panics on an empty item list; callers always commit at least one
/// randomness value.
pub fn proofs_from_byte_slices(items: &[impl AsRef<[u8]>]) -> (Vec<u8>, Vec<Proof>) {
    assert!(!items.is_empty(), "merkle: no items to prove");
    let total = items.len() as u64;
    let (trails, root) = trails_from_byte_slices(items);
    let proofs = trails
        .into_iter()
        .enumerate()
        .map(|(i, (leaf, aunts))| Proof {
            total,
            index: i as u64,
            leaf_hash: leaf,
            aunts,
        })
        .collect();
    (root, proofs)
}

/// Recursively builds, for each leaf, the list of aunt hashes bottom-up.
fn trails_from_byte_slices(items: &[impl AsRef<[u8]>]) -> (Vec<(Vec<u8>, Vec<Vec<u8>>)>, Vec<u8>) {
    match items.len() {
        1 => {
            let hash = leaf_hash(items[0].as_ref());
            (vec![(hash.clone(), Vec::new())], hash)
        }
        n => {
            let k = split_point(n as u64) as usize;
            let (mut lefts, left_root) = trails_from_byte_slices(&items[..k]);
            let (mut rights, right_root) = trails_from_byte_slices(&items[k..]);
            for (_, aunts) in lefts.iter_mut() {
                aunts.push(right_root.clone());
            }
            for (_, aunts) in rights.iter_mut() {
                aunts.push(left_root.clone());
            }
            lefts.append(&mut rights);
            let root = inner_hash(&left_root, &right_root);
            (lefts, root)
        }
    }
}

/// Folds the leaf hash and the aunts back up to the root.
fn compute_hash_from_aunts(
    index: u64,
    total: u64,
    leaf_hash: &[u8],
    inner_hashes: &[Vec<u8>],
) -> Result<Vec<u8>, MerkleError> {
    if index >= total || total == 0 {
        return Err(MerkleError::InvalidIndex { index, total });
    }
    match total {
        1 => {
            if !inner_hashes.is_empty() {
                return Err(MerkleError::UnexpectedInnerHashes);
            }
            Ok(leaf_hash.to_vec())
        }
        _ => {
            let Some((top, rest)) = inner_hashes.split_last() else {
                return Err(MerkleError::MissingInnerHashes);
            };
            let num_left = split_point(total);
            if index < num_left {
                let left = compute_hash_from_aunts(index, num_left, leaf_hash, rest)?;
                Ok(inner_hash(&left, top))
            } else {
                let right =
                    compute_hash_from_aunts(index - num_left, total - num_left, leaf_hash, rest)?;
                Ok(inner_hash(top, &right))
            }
        }
    }
}
