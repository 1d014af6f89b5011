//! Chain-facing data types shared across the agent.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::buf::Buf32;

/// A consumer chain block as reported by the chain client.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    pub hash: Buf32,
}

impl BlockInfo {
    pub fn new(height: u64, hash: Buf32) -> Self {
        Self { height, hash }
    }
}

/// A public randomness commitment as recorded on the consumer chain.
///
/// The commitment is the merkle root over `num_pub_rand` x-only public
/// randomness values covering heights `[start_height, start_height + num_pub_rand)`.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct PubRandCommit {
    pub start_height: u64,
    pub num_pub_rand: u64,
    pub commitment: Buf32,
}

impl PubRandCommit {
    /// Height of the last randomness value covered by this commit.
    pub fn end_height(&self) -> u64 {
        self.start_height + self.num_pub_rand - 1
    }

    /// Whether `height` falls inside the committed range.
    pub fn in_range(&self, height: u64) -> bool {
        self.start_height <= height && height <= self.end_height()
    }
}

/// Acknowledgement for a submitted chain transaction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TxResponse {
    pub txid: String,
}
