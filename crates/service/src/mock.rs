//! In-memory controllers for service-level tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use fp_client::{
    BabylonController, ClientError, ClientResult, ConsumerController, FinalitySigItem,
};
use fp_primitives::{hash, BlockInfo, Buf32, Buf64, PubRandCommit, TxResponse};

/// Deterministic per-height block hash for tests.
pub fn test_block_hash(height: u64) -> Buf32 {
    hash::raw(&height.to_le_bytes())
}

pub fn test_block(height: u64) -> BlockInfo {
    BlockInfo::new(height, test_block_hash(height))
}

/// A consumer chain reduced to the state the agent observes and mutates.
pub struct MockConsumer {
    pub activation_height: AtomicU64,
    pub tip: AtomicU64,
    pub highest_voted: AtomicU64,
    pub last_finalized: Mutex<Option<BlockInfo>>,
    pub has_power: std::sync::atomic::AtomicBool,
    pub last_commit: Mutex<Option<PubRandCommit>>,
    /// Every accepted commit, in order: (start, num, root, sig).
    pub commits: Mutex<Vec<(u64, u64, Buf32, Buf64)>>,
    /// Every accepted vote batch, in order.
    pub submissions: Mutex<Vec<Vec<FinalitySigItem>>>,
    /// Remaining vote submissions to fail with a transient error.
    pub failing_submissions: AtomicU64,
}

impl MockConsumer {
    pub fn new(activation_height: u64, tip: u64) -> Self {
        Self {
            activation_height: AtomicU64::new(activation_height),
            tip: AtomicU64::new(tip),
            highest_voted: AtomicU64::new(0),
            last_finalized: Mutex::new(None),
            has_power: std::sync::atomic::AtomicBool::new(true),
            last_commit: Mutex::new(None),
            commits: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            failing_submissions: AtomicU64::new(0),
        }
    }

    pub fn set_tip(&self, tip: u64) {
        self.tip.store(tip, Ordering::SeqCst);
    }

    pub fn set_last_commit(&self, commit: PubRandCommit) {
        *self.last_commit.lock().unwrap() = Some(commit);
    }

    pub fn set_highest_voted(&self, height: u64) {
        self.highest_voted.store(height, Ordering::SeqCst);
    }

    pub fn set_last_finalized(&self, block: BlockInfo) {
        *self.last_finalized.lock().unwrap() = Some(block);
    }

    pub fn set_has_power(&self, has_power: bool) {
        self.has_power.store(has_power, Ordering::SeqCst);
    }

    pub fn fail_next_submissions(&self, count: u64) {
        self.failing_submissions.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConsumerController for MockConsumer {
    async fn query_finality_activation_height(&self) -> ClientResult<u64> {
        Ok(self.activation_height.load(Ordering::SeqCst))
    }

    async fn query_latest_finalized_block(&self) -> ClientResult<Option<BlockInfo>> {
        Ok(self.last_finalized.lock().unwrap().clone())
    }

    async fn query_latest_block_height(&self) -> ClientResult<u64> {
        Ok(self.tip.load(Ordering::SeqCst))
    }

    async fn query_finality_provider_has_power(
        &self,
        _btc_pk: &Buf32,
        _height: u64,
    ) -> ClientResult<bool> {
        Ok(self.has_power.load(Ordering::SeqCst))
    }

    async fn query_finality_provider_highest_voted_height(
        &self,
        _btc_pk: &Buf32,
    ) -> ClientResult<u64> {
        Ok(self.highest_voted.load(Ordering::SeqCst))
    }

    async fn query_last_pub_rand_commit(
        &self,
        _btc_pk: &Buf32,
    ) -> ClientResult<Option<PubRandCommit>> {
        Ok(self.last_commit.lock().unwrap().clone())
    }

    async fn query_blocks(
        &self,
        start: u64,
        end: u64,
        limit: u32,
    ) -> ClientResult<Vec<BlockInfo>> {
        let tip = self.tip.load(Ordering::SeqCst);
        Ok((start..=end.min(tip))
            .take(limit as usize)
            .map(test_block)
            .collect())
    }

    async fn commit_pub_rand_list(
        &self,
        _btc_pk: &Buf32,
        start_height: u64,
        num_pub_rand: u64,
        commitment: &Buf32,
        signature: &Buf64,
    ) -> ClientResult<TxResponse> {
        let mut last = self.last_commit.lock().unwrap();
        if let Some(existing) = &*last {
            if start_height <= existing.end_height() {
                return Err(ClientError::Duplicate(format!(
                    "commit overlaps range ending at {}",
                    existing.end_height()
                )));
            }
        }
        *last = Some(PubRandCommit {
            start_height,
            num_pub_rand,
            commitment: *commitment,
        });
        self.commits.lock().unwrap().push((
            start_height,
            num_pub_rand,
            *commitment,
            *signature,
        ));
        Ok(TxResponse {
            txid: format!("commit-{start_height}"),
        })
    }

    async fn submit_batch_finality_sigs(
        &self,
        _btc_pk: &Buf32,
        batch: &[FinalitySigItem],
    ) -> ClientResult<TxResponse> {
        if self.failing_submissions.load(Ordering::SeqCst) > 0 {
            self.failing_submissions.fetch_sub(1, Ordering::SeqCst);
            return Err(ClientError::Transient("mempool unavailable".into()));
        }

        let max_height = batch.iter().map(|i| i.block.height).max().unwrap_or(0);
        self.highest_voted.fetch_max(max_height, Ordering::SeqCst);
        self.submissions.lock().unwrap().push(batch.to_vec());
        Ok(TxResponse {
            txid: format!("votes-{max_height}"),
        })
    }
}

/// Control plane stub that records registrations.
pub struct MockBabylon {
    pub registered: Mutex<Vec<(Buf32, String)>>,
}

impl MockBabylon {
    pub fn new() -> Self {
        Self {
            registered: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl BabylonController for MockBabylon {
    async fn register_finality_provider(
        &self,
        btc_pk: &Buf32,
        chain_id: &str,
        _commission_bps: u16,
        _description: &str,
    ) -> ClientResult<TxResponse> {
        let mut registered = self.registered.lock().unwrap();
        if registered.iter().any(|(pk, _)| pk == btc_pk) {
            return Err(ClientError::Duplicate("provider already registered".into()));
        }
        registered.push((*btc_pk, chain_id.to_string()));
        Ok(TxResponse {
            txid: "register".into(),
        })
    }

    async fn update_finality_provider(
        &self,
        _btc_pk: &Buf32,
        _commission_bps: Option<u16>,
        _description: Option<&str>,
    ) -> ClientResult<TxResponse> {
        Ok(TxResponse {
            txid: "update".into(),
        })
    }

    async fn query_balance(&self, _addr: &str) -> ClientResult<u64> {
        Ok(1_000_000)
    }
}
