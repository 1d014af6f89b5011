use borsh::{BorshDeserialize, BorshSerialize};
use fp_primitives::Buf32;

/// Key of a per-height randomness entry (nonce or inclusion proof).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RandKey {
    pub btc_pk: Buf32,
    pub chain_id: String,
    pub height: u64,
}

impl RandKey {
    pub fn new(btc_pk: Buf32, chain_id: impl Into<String>, height: u64) -> Self {
        Self {
            btc_pk,
            chain_id: chain_id.into(),
            height,
        }
    }
}

/// A stored secret nonce and its consumption witness.
///
/// `consumed` records the digest of the one message this nonce has signed.
/// Once set it never changes; a consume attempt with a different digest is
/// an equivocation attempt.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct NonceEntry {
    pub sec_rand: Buf32,
    pub consumed: Option<Buf32>,
}

impl NonceEntry {
    pub fn fresh(sec_rand: Buf32) -> Self {
        Self {
            sec_rand,
            consumed: None,
        }
    }
}

/// The registered finality provider record.
///
/// Created at registration and never deleted. `last_voted_height` only moves
/// forward, and only after a signature submission was acknowledged.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct FinalityProvider {
    pub btc_pk: Buf32,
    pub addr: String,
    pub chain_id: String,
    pub description: String,
    pub commission_bps: u16,
    pub last_voted_height: u64,
}

/// Registry entry tying an EOTS public key to its named keystore file and
/// the derivation path that produced it.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct EotsKeyRecord {
    pub name: String,
    pub hd_path: String,
}
