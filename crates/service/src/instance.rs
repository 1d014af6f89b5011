use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fp_client::retry::{call_with_timeout, retry_with_backoff, ExponentialBackoff};
use fp_client::{ClientResult, ConsumerController, FinalitySigItem};
use fp_db::traits::{FinalityProviderDatabase, PubRandProofDatabase};
use fp_db::types::RandKey;
use fp_db::DbError;
use fp_eots_manager::{EotsManager, EotsManagerError};
use fp_merkle::proofs_from_byte_slices;
use fp_primitives::{hash, BlockInfo, Buf32, PubRandCommit, TxResponse};
use fp_tasks::ShutdownGuard;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::critical::{CriticalError, CriticalSender};
use crate::error::InstanceError;
use crate::poller::ChainPoller;

type SharedFpDb = Arc<dyn FinalityProviderDatabase + Send + Sync>;
type SharedProofDb = Arc<dyn PubRandProofDatabase + Send + Sync>;

/// Consecutive failed ticks tolerated before a provider gives up and
/// escalates to the supervisor.
const MAX_CONSECUTIVE_TICK_FAILURES: u32 = 10;

/// One finality provider's state machine.
///
/// The control loop is strictly serial: resolve the start height once, then
/// per tick commit randomness if the runway is short, poll the next block
/// batch, and vote on it. All chain effects are idempotent, so the loop can
/// be killed and restarted at any await point.
pub struct FinalityProviderInstance {
    btc_pk: Buf32,
    chain_id: String,
    cfg: Arc<Config>,
    em: Arc<EotsManager>,
    fp_db: SharedFpDb,
    proof_db: SharedProofDb,
    consumer: Arc<dyn ConsumerController>,
    critical_tx: CriticalSender,
    last_voted_height: AtomicU64,
}

impl FinalityProviderInstance {
    pub fn new(
        btc_pk: Buf32,
        cfg: Arc<Config>,
        em: Arc<EotsManager>,
        fp_db: SharedFpDb,
        proof_db: SharedProofDb,
        consumer: Arc<dyn ConsumerController>,
        critical_tx: CriticalSender,
    ) -> Result<Self, InstanceError> {
        let record = fp_db
            .get_finality_provider(&btc_pk)?
            .ok_or(InstanceError::NotRegistered(btc_pk))?;

        Ok(Self {
            btc_pk,
            chain_id: record.chain_id,
            cfg,
            em,
            fp_db,
            proof_db,
            consumer,
            critical_tx,
            last_voted_height: AtomicU64::new(record.last_voted_height),
        })
    }

    pub fn btc_pk(&self) -> &Buf32 {
        &self.btc_pk
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn last_voted_height(&self) -> u64 {
        self.last_voted_height.load(Ordering::Acquire)
    }

    async fn rpc<T>(
        &self,
        name: &'static str,
        fut: impl Future<Output = ClientResult<T>>,
    ) -> ClientResult<T> {
        call_with_timeout(name, Duration::from_millis(self.cfg.rpc.timeout_ms), fut).await
    }

    fn submission_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.cfg.rpc.retry_base_delay_ms, 15, 10)
    }

    /// Picks the first height to process after a (re)start.
    ///
    /// The maximum of the four candidates guarantees we never vote twice on
    /// a height (even if the local store lags the chain after a crash),
    /// never touch already-finalized heights, and never go below the
    /// chain's activation height.
    pub async fn determine_start_height(&self) -> Result<u64, InstanceError> {
        if let Some(height) = self.cfg.poller.static_start_height {
            return Ok(height);
        }

        let activation = self
            .rpc(
                "query_finality_activation_height",
                self.consumer.query_finality_activation_height(),
            )
            .await?;
        let highest_voted = self
            .rpc(
                "query_highest_voted_height",
                self.consumer
                    .query_finality_provider_highest_voted_height(&self.btc_pk),
            )
            .await?;
        let last_finalized = self
            .rpc(
                "query_latest_finalized_block",
                self.consumer.query_latest_finalized_block(),
            )
            .await?
            .map(|b| b.height)
            .unwrap_or(0);
        let last_voted_local = self.last_voted_height();

        Ok(activation
            .max(highest_voted + 1)
            .max(last_finalized + 1)
            .max(last_voted_local + 1))
    }

    /// Commits a fresh randomness batch when the uncommitted runway ahead
    /// of the tip has shrunk below the configured minimum.
    ///
    /// Returns `Ok(None)` when no commit was needed or when the chain
    /// already held it (idempotent replay after a crash).
    pub async fn commit_pub_rand(
        &self,
        tip_height: u64,
    ) -> Result<Option<TxResponse>, InstanceError> {
        let last_commit = self
            .rpc(
                "query_last_pub_rand_commit",
                self.consumer.query_last_pub_rand_commit(&self.btc_pk),
            )
            .await?;

        if let Some(commit) = &last_commit {
            self.ensure_local_proofs(commit)?;
        }

        // One-past-the-end of the committed range; the activation height
        // doubles as the start of the very first batch.
        let last_end = match &last_commit {
            Some(commit) => commit.start_height + commit.num_pub_rand,
            None => {
                self.rpc(
                    "query_finality_activation_height",
                    self.consumer.query_finality_activation_height(),
                )
                .await?
            }
        };

        let rand_cfg = &self.cfg.randomness;
        if tip_height + rand_cfg.timestamping_delay + rand_cfg.min_pub_rand_runway <= last_end {
            return Ok(None);
        }

        let next_start = last_end;
        let num = rand_cfg.num_pub_rand;
        let publics =
            self.em
                .derive_pub_rand_list(&self.btc_pk, &self.chain_id, next_start, num)?;

        let leaves: Vec<[u8; 32]> = publics.iter().map(|p| p.into_inner()).collect();
        let (root, proofs) = proofs_from_byte_slices(&leaves);
        let root = Buf32::try_from(root.as_slice()).expect("sha256 root is 32 bytes");

        let msg = hash::commit_message(next_start, num, &root);
        let sig = self.em.sign_schnorr(&self.btc_pk, &msg)?;

        let backoff = self.submission_backoff();
        let submit_res = retry_with_backoff(
            "commit_pub_rand_list",
            self.cfg.rpc.max_submission_retries,
            &backoff,
            || {
                self.rpc(
                    "commit_pub_rand_list",
                    self.consumer
                        .commit_pub_rand_list(&self.btc_pk, next_start, num, &root, &sig),
                )
            },
        )
        .await;

        let tx = match submit_res {
            Ok(tx) => Some(tx),
            Err(err) if err.is_duplicate() => {
                info!(start = next_start, "chain already holds this commit");
                None
            }
            Err(err) => return Err(err.into()),
        };

        // The chain now references this range, so the proofs must land in
        // the local store before any vote is attempted against them.
        let encoded: Vec<Vec<u8>> = proofs
            .iter()
            .map(|p| borsh::to_vec(p).expect("proof encodes"))
            .collect();
        self.proof_db
            .insert_proofs(&self.btc_pk, &self.chain_id, next_start, &encoded)?;

        info!(start = next_start, num, %root, "committed public randomness");
        Ok(tx)
    }

    /// Signs and submits finality votes for the given in-order blocks.
    ///
    /// Blocks at or below `last_voted_height` or without voting power are
    /// skipped. Blocks past the committed randomness range are left in
    /// `blocks` for a later call (after the next commit extends the range).
    /// A nonce that refuses reuse drops its vote permanently and surfaces
    /// as [`InstanceError::EquivocationDetected`] after the healthy votes
    /// were submitted.
    pub async fn submit_batch_finality_sigs(
        &self,
        blocks: &mut Vec<BlockInfo>,
    ) -> Result<Option<TxResponse>, InstanceError> {
        if blocks.is_empty() {
            return Ok(None);
        }

        let commit = self
            .rpc(
                "query_last_pub_rand_commit",
                self.consumer.query_last_pub_rand_commit(&self.btc_pk),
            )
            .await?
            .ok_or(InstanceError::RandomnessExhausted {
                height: blocks[0].height,
                end: 0,
            })?;

        let tail: Vec<BlockInfo> = blocks
            .iter()
            .filter(|b| b.height > commit.end_height())
            .cloned()
            .collect();

        let mut items: Vec<FinalitySigItem> = Vec::new();
        let mut equivocated: Option<u64> = None;
        for block in blocks.iter() {
            if block.height <= self.last_voted_height() {
                debug!(height = block.height, "already voted, skipping");
                continue;
            }

            let has_power = self
                .rpc(
                    "query_finality_provider_has_power",
                    self.consumer
                        .query_finality_provider_has_power(&self.btc_pk, block.height),
                )
                .await?;
            if !has_power {
                debug!(height = block.height, "no voting power, skipping");
                continue;
            }

            if block.height > commit.end_height() {
                // In-order feed: everything from here on is past the range.
                break;
            }
            if block.height < commit.start_height {
                // The chain only retains its latest commit; randomness for
                // this height is no longer provable on-chain.
                warn!(
                    height = block.height,
                    commit_start = commit.start_height,
                    "height below committed randomness range, vote refused"
                );
                continue;
            }

            let key = RandKey::new(self.btc_pk, &self.chain_id, block.height);
            let proof = self
                .proof_db
                .get_proof(&key)?
                .ok_or(InstanceError::ProofMissing(block.height))?;

            let digest = hash::vote_digest(block.height, &block.hash);
            let sig = match self
                .em
                .sign_eots(&self.btc_pk, &self.chain_id, block.height, &digest)
            {
                Ok(sig) => sig,
                Err(EotsManagerError::Equivocation(height)) => {
                    error!(height, "nonce refused reuse, dropping vote");
                    equivocated.get_or_insert(height);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let pub_rand = self.em.get_pub_rand(&self.btc_pk, &self.chain_id, block.height)?;

            items.push(FinalitySigItem {
                block: block.clone(),
                pub_rand,
                proof,
                sig,
            });
        }

        if items.is_empty() && equivocated.is_none() && !tail.is_empty() {
            // Nothing signable until a new commit extends the range.
            return Err(InstanceError::RandomnessExhausted {
                height: tail[0].height,
                end: commit.end_height(),
            });
        }

        let tx = if items.is_empty() {
            None
        } else {
            let max_height = items.last().expect("nonempty").block.height;
            let backoff = self.submission_backoff();
            let submit_res = retry_with_backoff(
                "submit_batch_finality_sigs",
                self.cfg.rpc.max_submission_retries,
                &backoff,
                || {
                    self.rpc(
                        "submit_batch_finality_sigs",
                        self.consumer.submit_batch_finality_sigs(&self.btc_pk, &items),
                    )
                },
            )
            .await;

            match submit_res {
                Ok(tx) => {
                    self.update_last_voted(max_height)?;
                    Some(tx)
                }
                Err(err) if err.is_duplicate() => {
                    // The chain already counted these votes.
                    self.update_last_voted(max_height)?;
                    None
                }
                Err(err) => return Err(err.into()),
            }
        };

        // Only the not-yet-votable suffix survives for the next call.
        *blocks = tail;

        if let Some(height) = equivocated {
            return Err(InstanceError::EquivocationDetected(height));
        }
        Ok(tx)
    }

    /// Rebuilds the inclusion proofs for the on-chain commit if the local
    /// store lost them (crash between the submission ack and the proof
    /// write). Proof batches are written atomically, so the presence of
    /// the last height implies the whole range is present.
    fn ensure_local_proofs(&self, commit: &PubRandCommit) -> Result<(), InstanceError> {
        let end_key = RandKey::new(self.btc_pk, &self.chain_id, commit.end_height());
        if self.proof_db.get_proof(&end_key)?.is_some() {
            return Ok(());
        }
        warn!(
            start = commit.start_height,
            num = commit.num_pub_rand,
            "local proofs missing for on-chain commit, rebuilding"
        );

        let publics = self.em.derive_pub_rand_list(
            &self.btc_pk,
            &self.chain_id,
            commit.start_height,
            commit.num_pub_rand,
        )?;
        let leaves: Vec<[u8; 32]> = publics.iter().map(|p| p.into_inner()).collect();
        let (root, proofs) = proofs_from_byte_slices(&leaves);
        if root.as_slice() != commit.commitment.as_bytes() {
            return Err(InstanceError::CommitMismatch {
                start: commit.start_height,
            });
        }

        let encoded: Vec<Vec<u8>> = proofs
            .iter()
            .map(|p| borsh::to_vec(p).expect("proof encodes"))
            .collect();
        self.proof_db
            .insert_proofs(&self.btc_pk, &self.chain_id, commit.start_height, &encoded)?;
        Ok(())
    }

    fn update_last_voted(&self, height: u64) -> Result<(), InstanceError> {
        match self.fp_db.set_last_voted_height(&self.btc_pk, height) {
            Ok(()) => {}
            // Another path already recorded an equal or higher height.
            Err(DbError::NonMonotonicHeight(current, _)) if current >= height => {}
            Err(err) => return Err(err.into()),
        }
        self.last_voted_height.fetch_max(height, Ordering::AcqRel);
        Ok(())
    }

    /// The provider control loop. Exits on shutdown, or after surfacing a
    /// critical error to the supervisor (pausing this provider only).
    pub async fn run(self: Arc<Self>, shutdown: ShutdownGuard) {
        let start_height = loop {
            if shutdown.should_shutdown() {
                return;
            }
            match self.determine_start_height().await {
                Ok(height) => break height,
                Err(err) => {
                    warn!(%err, "failed to resolve start height, retrying");
                    tokio::time::sleep(Duration::from_millis(self.cfg.poller.poll_interval_ms))
                        .await;
                }
            }
        };
        info!(btc_pk = %self.btc_pk, chain_id = %self.chain_id, start_height, "provider loop starting");

        let mut poller = ChainPoller::new(
            self.consumer.clone(),
            start_height,
            self.cfg.poller.batch_size,
        );
        let mut pending: Vec<BlockInfo> = Vec::new();

        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.cfg.poller.poll_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut consecutive_failures = 0u32;
        loop {
            tokio::select! {
                _ = shutdown.wait_for_shutdown() => {
                    info!(btc_pk = %self.btc_pk, "provider loop shutting down");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match self.tick(&mut poller, &mut pending).await {
                Ok(()) => consecutive_failures = 0,
                Err(err) => {
                    consecutive_failures += 1;
                    if err.is_critical() || consecutive_failures >= MAX_CONSECUTIVE_TICK_FAILURES {
                        error!(btc_pk = %self.btc_pk, %err, "critical failure, pausing provider");
                        let _ = self.critical_tx.send(CriticalError {
                            btc_pk: self.btc_pk,
                            err,
                        });
                        return;
                    }
                    warn!(btc_pk = %self.btc_pk, %err, "tick failed, will retry");
                }
            }
        }
    }

    async fn tick(
        &self,
        poller: &mut ChainPoller,
        pending: &mut Vec<BlockInfo>,
    ) -> Result<(), InstanceError> {
        let tip = self
            .rpc(
                "query_latest_block_height",
                self.consumer.query_latest_block_height(),
            )
            .await?;

        self.commit_pub_rand(tip).await?;

        if pending.is_empty() {
            *pending = poller.poll().await?;
        }
        if !pending.is_empty() {
            self.submit_batch_finality_sigs(pending).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fp_client::ClientError;
    use fp_db::traits::{FinalityProviderDatabase as _, PubRandProofDatabase as _};
    use fp_db::types::FinalityProvider;
    use fp_eots::{new_pub_rand, new_sig, PublicKey};
    use fp_eots_manager::{Keystore, DEFAULT_HD_PATH};
    use fp_merkle::Proof;
    use fp_primitives::PubRandCommit;
    use fp_rocksdb_store::test_utils::get_rocksdb_tmp_instance;
    use fp_rocksdb_store::{EotsKeyDb, FinalityProviderDb, NonceDb, ProofDb};
    use k256::ecdsa::signature::Verifier;
    use k256::schnorr::{Signature as SchnorrSignature, VerifyingKey};

    use super::*;
    use crate::critical::{critical_channel, CriticalReceiver};
    use crate::mock::{test_block, test_block_hash, MockConsumer};

    const PASSPHRASE: &str = "test passphrase";
    const CHAIN_ID: &str = "test-chain";

    struct Harness {
        consumer: Arc<MockConsumer>,
        em: Arc<EotsManager>,
        fp_db: Arc<FinalityProviderDb>,
        proof_db: Arc<ProofDb>,
        pk: Buf32,
    }

    fn test_config() -> Config {
        let mut cfg = Config::default();
        cfg.rpc.retry_base_delay_ms = 1;
        cfg.rpc.max_submission_retries = 2;
        cfg
    }

    fn setup(consumer: Arc<MockConsumer>) -> Harness {
        let db = get_rocksdb_tmp_instance();
        let keystore_dir = tempfile::Builder::new()
            .prefix("fpd-service-test")
            .tempdir()
            .unwrap()
            .into_path();

        let em = Arc::new(EotsManager::new(
            Keystore::new(keystore_dir).unwrap(),
            Arc::new(EotsKeyDb::new(db.clone())),
            Arc::new(NonceDb::new(db.clone())),
        ));
        let pk = em.create_key("default", PASSPHRASE, DEFAULT_HD_PATH).unwrap();

        let fp_db = Arc::new(FinalityProviderDb::new(db.clone()));
        fp_db
            .put_finality_provider(&FinalityProvider {
                btc_pk: pk,
                addr: "bbn1qtest".to_string(),
                chain_id: CHAIN_ID.to_string(),
                description: "test provider".to_string(),
                commission_bps: 0,
                last_voted_height: 0,
            })
            .unwrap();

        Harness {
            consumer,
            em,
            fp_db,
            proof_db: Arc::new(ProofDb::new(db)),
            pk,
        }
    }

    impl Harness {
        fn instance(&self, cfg: Config) -> (FinalityProviderInstance, CriticalReceiver) {
            let (critical_tx, critical_rx) = critical_channel();
            let instance = FinalityProviderInstance::new(
                self.pk,
                Arc::new(cfg),
                self.em.clone(),
                self.fp_db.clone(),
                self.proof_db.clone(),
                self.consumer.clone(),
                critical_tx,
            )
            .unwrap();
            (instance, critical_rx)
        }
    }

    #[tokio::test]
    async fn test_start_height_fresh_provider() {
        let harness = setup(Arc::new(MockConsumer::new(100, 0)));
        let (instance, _rx) = harness.instance(test_config());
        assert_eq!(instance.determine_start_height().await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_start_height_takes_all_signals() {
        let consumer = Arc::new(MockConsumer::new(100, 0));
        consumer.set_highest_voted(150);
        consumer.set_last_finalized(test_block(140));
        let harness = setup(consumer);
        harness.fp_db.set_last_voted_height(&harness.pk, 120).unwrap();

        let (instance, _rx) = harness.instance(test_config());
        assert_eq!(instance.determine_start_height().await.unwrap(), 151);
    }

    #[tokio::test]
    async fn test_start_height_floor_is_one() {
        let harness = setup(Arc::new(MockConsumer::new(0, 0)));
        let (instance, _rx) = harness.instance(test_config());
        assert!(instance.determine_start_height().await.unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_start_height_static_override() {
        let harness = setup(Arc::new(MockConsumer::new(100, 0)));
        let mut cfg = test_config();
        cfg.poller.static_start_height = Some(42);
        let (instance, _rx) = harness.instance(cfg);
        assert_eq!(instance.determine_start_height().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_start_height_after_unrecorded_vote() {
        // Crash after the chain accepted a vote at 1300 but before the
        // local store was updated: the chain-side signal wins.
        let consumer = Arc::new(MockConsumer::new(100, 0));
        consumer.set_highest_voted(1300);
        let harness = setup(consumer);
        let (instance, _rx) = harness.instance(test_config());
        assert_eq!(instance.determine_start_height().await.unwrap(), 1301);
        assert_eq!(instance.last_voted_height(), 0);
    }

    #[tokio::test]
    async fn test_commit_runway_boundary() {
        let consumer = Arc::new(MockConsumer::new(1, 0));
        let harness = setup(consumer.clone());
        let (instance, _rx) = harness.instance(test_config());

        // First commit ever starts at the activation height.
        consumer.activation_height.store(200, Ordering::SeqCst);
        let tx = instance.commit_pub_rand(0).await.unwrap();
        assert!(tx.is_some());
        {
            let commit = consumer.last_commit.lock().unwrap().clone().unwrap();
            assert_eq!(commit.start_height, 200);
            assert_eq!(commit.num_pub_rand, 1000);
        }

        // tip 900: 900 + 200 + 100 <= 1200, runway sufficient.
        assert!(instance.commit_pub_rand(900).await.unwrap().is_none());
        assert_eq!(consumer.commits.lock().unwrap().len(), 1);

        // tip 950: runway short, the next contiguous batch goes out.
        let tx = instance.commit_pub_rand(950).await.unwrap();
        assert!(tx.is_some());
        let (start, num, root, sig) = consumer.commits.lock().unwrap()[1].clone();
        assert_eq!(start, 1200);
        assert_eq!(num, 1000);

        // The commitment signature is plain BIP-340 over
        // start || num || root and verifies against the provider key.
        let vk = VerifyingKey::from_bytes(harness.pk.as_bytes()).unwrap();
        let msg = hash::commit_message(start, num, &root);
        let sig = SchnorrSignature::try_from(sig.as_bytes()).unwrap();
        vk.verify(&msg, &sig).unwrap();

        // Proofs cover exactly [1200, 2200).
        let key = |h| RandKey::new(harness.pk, CHAIN_ID, h);
        assert!(harness.proof_db.get_proof(&key(1200)).unwrap().is_some());
        assert!(harness.proof_db.get_proof(&key(2199)).unwrap().is_some());
        assert!(harness.proof_db.get_proof(&key(2200)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_replay_is_noop() {
        let consumer = Arc::new(MockConsumer::new(100, 0));
        let harness = setup(consumer.clone());
        let (instance, _rx) = harness.instance(test_config());

        instance.commit_pub_rand(0).await.unwrap().unwrap();
        let commits_after_first = consumer.commits.lock().unwrap().len();

        // Replaying with the same tip changes nothing on either side.
        assert!(instance.commit_pub_rand(0).await.unwrap().is_none());
        assert_eq!(consumer.commits.lock().unwrap().len(), commits_after_first);
    }

    #[tokio::test]
    async fn test_commit_rebuilds_lost_proofs() {
        let consumer = Arc::new(MockConsumer::new(100, 0));
        let harness = setup(consumer.clone());
        let (instance, _rx) = harness.instance(test_config());

        // The chain holds a commit whose proofs never reached the local
        // store (crash between ack and write). Derive what the chain saw.
        let publics = harness
            .em
            .derive_pub_rand_list(&harness.pk, CHAIN_ID, 100, 50)
            .unwrap();
        let leaves: Vec<[u8; 32]> = publics.iter().map(|p| p.into_inner()).collect();
        let (root, _) = fp_merkle::proofs_from_byte_slices(&leaves);
        consumer.set_last_commit(PubRandCommit {
            start_height: 100,
            num_pub_rand: 50,
            commitment: Buf32::try_from(root.as_slice()).unwrap(),
        });

        // The repair runs before the runway check, so the proofs for the
        // existing range come back regardless of what else the call does.
        instance.commit_pub_rand(0).await.unwrap();

        let key = |h| RandKey::new(harness.pk, CHAIN_ID, h);
        assert!(harness.proof_db.get_proof(&key(100)).unwrap().is_some());
        assert!(harness.proof_db.get_proof(&key(149)).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_commit_mismatched_root_is_critical() {
        let consumer = Arc::new(MockConsumer::new(100, 0));
        let harness = setup(consumer.clone());
        let (instance, _rx) = harness.instance(test_config());

        consumer.set_last_commit(PubRandCommit {
            start_height: 100,
            num_pub_rand: 50,
            commitment: Buf32::from([0xde; 32]),
        });

        let err = instance.commit_pub_rand(0).await.unwrap_err();
        assert!(matches!(err, InstanceError::CommitMismatch { start: 100 }));
        assert!(err.is_critical());
    }

    /// Commits the scenario range [1200, 2200) and returns its root.
    async fn commit_scenario_range(
        harness: &Harness,
        instance: &FinalityProviderInstance,
    ) -> Buf32 {
        // Seed the chain with a commit over [200, 1200) whose root matches
        // what this provider's key derives, as if a previous run made it.
        let publics = harness
            .em
            .derive_pub_rand_list(&harness.pk, CHAIN_ID, 200, 1000)
            .unwrap();
        let leaves: Vec<[u8; 32]> = publics.iter().map(|p| p.into_inner()).collect();
        let (root, _) = fp_merkle::proofs_from_byte_slices(&leaves);
        harness.consumer.set_last_commit(PubRandCommit {
            start_height: 200,
            num_pub_rand: 1000,
            commitment: Buf32::try_from(root.as_slice()).unwrap(),
        });

        instance.commit_pub_rand(950).await.unwrap();
        let commit = harness.consumer.last_commit.lock().unwrap().clone().unwrap();
        assert_eq!(commit.start_height, 1200);
        commit.commitment
    }

    #[tokio::test]
    async fn test_vote_submits_and_advances_state() {
        let consumer = Arc::new(MockConsumer::new(1, 0));
        let harness = setup(consumer.clone());
        harness.fp_db.set_last_voted_height(&harness.pk, 1204).unwrap();
        let (instance, _rx) = harness.instance(test_config());
        let root = commit_scenario_range(&harness, &instance).await;

        let mut blocks = vec![test_block(1205)];
        let tx = instance
            .submit_batch_finality_sigs(&mut blocks)
            .await
            .unwrap();
        assert!(tx.is_some());
        assert!(blocks.is_empty());
        assert_eq!(instance.last_voted_height(), 1205);
        let stored = harness
            .fp_db
            .get_finality_provider(&harness.pk)
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_voted_height, 1205);

        // The submitted item carries a proof that verifies against the
        // commitment root and an EOTS signature that verifies against the
        // committed randomness.
        let submissions = consumer.submissions.lock().unwrap();
        assert_eq!(submissions.len(), 1);
        let item = &submissions[0][0];
        assert_eq!(item.block.height, 1205);

        let proof: Proof = borsh::from_slice(&item.proof).unwrap();
        proof
            .verify(root.as_bytes(), item.pub_rand.as_bytes())
            .unwrap();

        let verifier = PublicKey::from_bytes(&harness.pk).unwrap();
        let digest = hash::vote_digest(1205, &test_block_hash(1205));
        assert!(verifier
            .verify(
                &new_pub_rand(&item.pub_rand).unwrap(),
                &digest,
                &new_sig(&item.sig).unwrap(),
            )
            .unwrap());
    }

    #[tokio::test]
    async fn test_vote_skips_already_voted_heights() {
        let consumer = Arc::new(MockConsumer::new(1, 0));
        let harness = setup(consumer.clone());
        harness.fp_db.set_last_voted_height(&harness.pk, 1204).unwrap();
        let (instance, _rx) = harness.instance(test_config());
        commit_scenario_range(&harness, &instance).await;

        let mut blocks = vec![test_block(1203), test_block(1204), test_block(1205)];
        instance
            .submit_batch_finality_sigs(&mut blocks)
            .await
            .unwrap();

        let submissions = consumer.submissions.lock().unwrap();
        assert_eq!(submissions[0].len(), 1);
        assert_eq!(submissions[0][0].block.height, 1205);
    }

    #[tokio::test]
    async fn test_vote_skips_without_power() {
        let consumer = Arc::new(MockConsumer::new(1, 0));
        let harness = setup(consumer.clone());
        let (instance, _rx) = harness.instance(test_config());
        commit_scenario_range(&harness, &instance).await;
        consumer.set_has_power(false);

        let mut blocks = vec![test_block(1205)];
        let tx = instance
            .submit_batch_finality_sigs(&mut blocks)
            .await
            .unwrap();
        assert!(tx.is_none());
        assert!(blocks.is_empty());
        assert!(consumer.submissions.lock().unwrap().is_empty());
        assert_eq!(instance.last_voted_height(), 0);
    }

    #[tokio::test]
    async fn test_vote_randomness_range_boundary() {
        let consumer = Arc::new(MockConsumer::new(1, 0));
        let harness = setup(consumer.clone());
        let (instance, _rx) = harness.instance(test_config());
        commit_scenario_range(&harness, &instance).await;

        // Last covered height is signable.
        let mut blocks = vec![test_block(2199)];
        assert!(instance
            .submit_batch_finality_sigs(&mut blocks)
            .await
            .unwrap()
            .is_some());

        // One past the range is refused until the next commit.
        let mut blocks = vec![test_block(2200)];
        let err = instance
            .submit_batch_finality_sigs(&mut blocks)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InstanceError::RandomnessExhausted { height: 2200, end: 2199 }
        ));
        assert!(!err.is_critical());
        assert_eq!(blocks.len(), 1);
    }

    #[tokio::test]
    async fn test_vote_failed_submission_retries_same_block() {
        let consumer = Arc::new(MockConsumer::new(1, 0));
        let harness = setup(consumer.clone());
        harness.fp_db.set_last_voted_height(&harness.pk, 1204).unwrap();
        let (instance, _rx) = harness.instance(test_config());
        commit_scenario_range(&harness, &instance).await;

        // Exhaust the retry budget (1 + 2 retries).
        consumer.fail_next_submissions(3);
        let mut blocks = vec![test_block(1205)];
        let err = instance
            .submit_batch_finality_sigs(&mut blocks)
            .await
            .unwrap_err();
        assert!(matches!(err, InstanceError::Client(ClientError::Transient(_))));
        assert_eq!(instance.last_voted_height(), 1204);

        // Same block, same message: the consumed nonce signs it again.
        let mut blocks = vec![test_block(1205)];
        instance
            .submit_batch_finality_sigs(&mut blocks)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(instance.last_voted_height(), 1205);
        assert_eq!(consumer.submissions.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_vote_reorged_block_is_equivocation() {
        let consumer = Arc::new(MockConsumer::new(1, 0));
        let harness = setup(consumer.clone());
        harness.fp_db.set_last_voted_height(&harness.pk, 1204).unwrap();
        let (instance, _rx) = harness.instance(test_config());
        commit_scenario_range(&harness, &instance).await;

        // First attempt signs (consuming the nonce) but the submission
        // never goes through.
        consumer.fail_next_submissions(3);
        let mut blocks = vec![test_block(1205)];
        instance
            .submit_batch_finality_sigs(&mut blocks)
            .await
            .unwrap_err();

        // The chain reorged: height 1205 now has a different hash. The
        // nonce refuses the new digest; no signature is emitted.
        let mut blocks = vec![BlockInfo::new(1205, Buf32::from([0xff; 32]))];
        let err = instance
            .submit_batch_finality_sigs(&mut blocks)
            .await
            .unwrap_err();
        assert!(matches!(err, InstanceError::EquivocationDetected(1205)));
        assert!(err.is_critical());
        assert!(consumer.submissions.lock().unwrap().is_empty());
        assert_eq!(instance.last_voted_height(), 1204);
    }

    #[tokio::test]
    async fn test_vote_missing_proof_is_critical() {
        let consumer = Arc::new(MockConsumer::new(1, 0));
        let harness = setup(consumer.clone());
        let (instance, _rx) = harness.instance(test_config());

        // The chain references a range but the proof store was never
        // populated (the vote path does not repair, only the commit path
        // does), so the lookup comes back empty.
        let publics = harness
            .em
            .derive_pub_rand_list(&harness.pk, CHAIN_ID, 100, 50)
            .unwrap();
        let leaves: Vec<[u8; 32]> = publics.iter().map(|p| p.into_inner()).collect();
        let (root, _) = fp_merkle::proofs_from_byte_slices(&leaves);
        consumer.set_last_commit(PubRandCommit {
            start_height: 100,
            num_pub_rand: 50,
            commitment: Buf32::try_from(root.as_slice()).unwrap(),
        });

        let mut blocks = vec![test_block(120)];
        let err = instance
            .submit_batch_finality_sigs(&mut blocks)
            .await
            .unwrap_err();
        assert!(matches!(err, InstanceError::ProofMissing(120)));
        assert!(err.is_critical());
    }
}
