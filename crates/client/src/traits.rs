use async_trait::async_trait;
use fp_primitives::{BlockInfo, Buf32, Buf64, PubRandCommit, TxResponse};

use crate::types::FinalitySigItem;
use crate::ClientResult;

/// Client for the consumer chain the provider votes on.
#[async_trait]
pub trait ConsumerController: Send + Sync + 'static {
    /// First height at which finality voting is enabled.
    async fn query_finality_activation_height(&self) -> ClientResult<u64>;

    /// The latest finalized block, if any block is finalized yet.
    async fn query_latest_finalized_block(&self) -> ClientResult<Option<BlockInfo>>;

    /// Current chain tip height.
    async fn query_latest_block_height(&self) -> ClientResult<u64>;

    /// Whether the provider has voting power at the given height.
    async fn query_finality_provider_has_power(
        &self,
        btc_pk: &Buf32,
        height: u64,
    ) -> ClientResult<bool>;

    /// Highest height the chain has recorded a vote from this provider at;
    /// 0 when it has never voted.
    async fn query_finality_provider_highest_voted_height(
        &self,
        btc_pk: &Buf32,
    ) -> ClientResult<u64>;

    /// The provider's latest public randomness commitment, if any.
    async fn query_last_pub_rand_commit(
        &self,
        btc_pk: &Buf32,
    ) -> ClientResult<Option<PubRandCommit>>;

    /// Blocks with heights in `start..=end`, ascending, at most `limit`.
    async fn query_blocks(&self, start: u64, end: u64, limit: u32)
        -> ClientResult<Vec<BlockInfo>>;

    /// Publishes a public randomness commitment.
    async fn commit_pub_rand_list(
        &self,
        btc_pk: &Buf32,
        start_height: u64,
        num_pub_rand: u64,
        commitment: &Buf32,
        signature: &Buf64,
    ) -> ClientResult<TxResponse>;

    /// Submits a batch of finality signatures.
    async fn submit_batch_finality_sigs(
        &self,
        btc_pk: &Buf32,
        batch: &[FinalitySigItem],
    ) -> ClientResult<TxResponse>;
}

/// Client for the Babylon control plane.
///
/// Kept apart from [`ConsumerController`]: one agent may serve several
/// consumer chains anchored to the same control plane.
#[async_trait]
pub trait BabylonController: Send + Sync + 'static {
    /// Registers the finality provider with the control plane.
    async fn register_finality_provider(
        &self,
        btc_pk: &Buf32,
        chain_id: &str,
        commission_bps: u16,
        description: &str,
    ) -> ClientResult<TxResponse>;

    /// Updates the provider's commission and/or description.
    async fn update_finality_provider(
        &self,
        btc_pk: &Buf32,
        commission_bps: Option<u16>,
        description: Option<&str>,
    ) -> ClientResult<TxResponse>;

    /// Spendable balance of the provider's control plane account.
    async fn query_balance(&self, addr: &str) -> ClientResult<u64>;
}
