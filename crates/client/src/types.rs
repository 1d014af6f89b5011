use fp_primitives::{BlockInfo, Buf32};
use serde::{Deserialize, Serialize};

/// One block's worth of a batched finality signature submission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FinalitySigItem {
    pub block: BlockInfo,
    /// X-only public randomness committed for this height.
    pub pub_rand: Buf32,
    /// Borsh-encoded merkle inclusion proof for `pub_rand`.
    pub proof: Vec<u8>,
    /// The EOTS signature scalar.
    pub sig: Buf32,
}
