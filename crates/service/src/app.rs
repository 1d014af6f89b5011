use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fp_client::{BabylonController, ConsumerController};
use fp_db::traits::{FinalityProviderDatabase, PubRandProofDatabase};
use fp_db::types::FinalityProvider;
use fp_eots_manager::EotsManager;
use fp_primitives::Buf32;
use fp_tasks::{ShutdownSignal, TaskExecutor};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::critical::critical_channel;
use crate::error::AppError;
use crate::instance::FinalityProviderInstance;

type SharedFpDb = Arc<dyn FinalityProviderDatabase + Send + Sync>;
type SharedProofDb = Arc<dyn PubRandProofDatabase + Send + Sync>;

/// The agent: owns the shared stores and the EOTS manager, registers
/// providers, and supervises one control loop per registered provider.
pub struct FinalityProviderApp {
    cfg: Arc<Config>,
    em: Arc<EotsManager>,
    fp_db: SharedFpDb,
    proof_db: SharedProofDb,
    consumer: Arc<dyn ConsumerController>,
    babylon: Arc<dyn BabylonController>,
    critical_seen: Arc<AtomicBool>,
}

impl FinalityProviderApp {
    pub fn new(
        cfg: Arc<Config>,
        em: Arc<EotsManager>,
        fp_db: SharedFpDb,
        proof_db: SharedProofDb,
        consumer: Arc<dyn ConsumerController>,
        babylon: Arc<dyn BabylonController>,
    ) -> Self {
        Self {
            cfg,
            em,
            fp_db,
            proof_db,
            consumer,
            babylon,
            critical_seen: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn eots_manager(&self) -> &Arc<EotsManager> {
        &self.em
    }

    /// Whether any provider was paused on a critical error; drives the
    /// daemon's exit code.
    pub fn had_critical_error(&self) -> bool {
        self.critical_seen.load(Ordering::SeqCst)
    }

    /// Registers the provider with the control plane and persists the
    /// local record. A control plane that already knows the key (crash
    /// between registration and the local write) is tolerated.
    pub async fn register_finality_provider(
        &self,
        btc_pk: Buf32,
        addr: String,
        chain_id: String,
        commission_bps: u16,
        description: String,
    ) -> Result<(), AppError> {
        match self
            .babylon
            .register_finality_provider(&btc_pk, &chain_id, commission_bps, &description)
            .await
        {
            Ok(tx) => info!(%btc_pk, txid = %tx.txid, "registered on control plane"),
            Err(err) if err.is_duplicate() => {
                warn!(%btc_pk, "control plane already knows this provider")
            }
            Err(err) => return Err(err.into()),
        }

        self.fp_db.put_finality_provider(&FinalityProvider {
            btc_pk,
            addr,
            chain_id,
            description,
            commission_bps,
            last_voted_height: 0,
        })?;
        info!(%btc_pk, "finality provider registered");
        Ok(())
    }

    /// Spawns one control loop per registered provider plus the critical
    /// error supervisor. Returns how many providers were started.
    ///
    /// Keys must have been unlocked on the EOTS manager beforehand; a
    /// locked key pauses its provider on the first tick.
    pub fn start(
        &self,
        executor: &TaskExecutor,
        shutdown_signal: ShutdownSignal,
    ) -> Result<usize, AppError> {
        let providers = self.fp_db.list_finality_providers()?;
        if providers.is_empty() {
            return Ok(0);
        }

        let (critical_tx, mut critical_rx) = critical_channel();

        let mut started = 0usize;
        for fp in &providers {
            let instance = match FinalityProviderInstance::new(
                fp.btc_pk,
                self.cfg.clone(),
                self.em.clone(),
                self.fp_db.clone(),
                self.proof_db.clone(),
                self.consumer.clone(),
                critical_tx.clone(),
            ) {
                Ok(instance) => Arc::new(instance),
                Err(err) => {
                    error!(btc_pk = %fp.btc_pk, %err, "failed to build provider instance");
                    continue;
                }
            };
            executor.spawn_critical("fp-instance", move |guard| instance.run(guard));
            started += 1;
        }
        drop(critical_tx);

        let total = started;
        let critical_seen = self.critical_seen.clone();
        executor.spawn_critical("critical-supervisor", move |guard| async move {
            let mut paused: HashSet<Buf32> = HashSet::new();
            loop {
                tokio::select! {
                    _ = guard.wait_for_shutdown() => return,
                    msg = critical_rx.recv() => match msg {
                        Some(critical) => {
                            error!(
                                btc_pk = %critical.btc_pk,
                                err = %critical.err,
                                "provider paused on critical error"
                            );
                            critical_seen.store(true, Ordering::SeqCst);
                            paused.insert(critical.btc_pk);
                            if paused.len() >= total {
                                error!("all providers paused, initiating shutdown");
                                shutdown_signal.send();
                                return;
                            }
                        }
                        None => return,
                    }
                }
            }
        });

        info!(providers = started, "finality provider app started");
        Ok(started)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fp_db::DbError;
    use fp_eots_manager::{Keystore, DEFAULT_HD_PATH};
    use fp_rocksdb_store::test_utils::get_rocksdb_tmp_instance;
    use fp_rocksdb_store::{EotsKeyDb, FinalityProviderDb, NonceDb, ProofDb};
    use fp_tasks::TaskManager;

    use super::*;
    use crate::config::Config;
    use crate::error::AppError;
    use crate::mock::{MockBabylon, MockConsumer};

    fn build_app(consumer: Arc<MockConsumer>) -> (FinalityProviderApp, Buf32) {
        let db = get_rocksdb_tmp_instance();
        let keystore_dir = tempfile::Builder::new()
            .prefix("fpd-app-test")
            .tempdir()
            .unwrap()
            .into_path();

        let em = Arc::new(EotsManager::new(
            Keystore::new(keystore_dir).unwrap(),
            Arc::new(EotsKeyDb::new(db.clone())),
            Arc::new(NonceDb::new(db.clone())),
        ));
        let pk = em.create_key("default", "pass", DEFAULT_HD_PATH).unwrap();

        let app = FinalityProviderApp::new(
            Arc::new(Config::default()),
            em,
            Arc::new(FinalityProviderDb::new(db.clone())),
            Arc::new(ProofDb::new(db)),
            consumer,
            Arc::new(MockBabylon::new()),
        );
        (app, pk)
    }

    #[tokio::test]
    async fn test_register_is_create_once() {
        let (app, pk) = build_app(Arc::new(MockConsumer::new(1, 0)));

        app.register_finality_provider(
            pk,
            "bbn1qtest".into(),
            "test-chain".into(),
            500,
            "provider".into(),
        )
        .await
        .unwrap();

        let err = app
            .register_finality_provider(
                pk,
                "bbn1qtest".into(),
                "test-chain".into(),
                500,
                "provider".into(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Db(DbError::AlreadyExists(_))));
    }

    #[test]
    fn test_start_and_shutdown() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (app, pk) = build_app(Arc::new(MockConsumer::new(1, 10)));
        runtime
            .block_on(app.register_finality_provider(
                pk,
                "bbn1qtest".into(),
                "test-chain".into(),
                0,
                "provider".into(),
            ))
            .unwrap();

        let manager = TaskManager::new(runtime.handle().clone());
        let started = app
            .start(&manager.executor(), manager.shutdown_signal())
            .unwrap();
        assert_eq!(started, 1);

        let signal = manager.shutdown_signal();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            signal.send();
        });

        manager.monitor(Some(Duration::from_secs(5))).unwrap();
        assert!(!app.had_critical_error());
    }

    #[test]
    fn test_start_with_no_providers() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (app, _pk) = build_app(Arc::new(MockConsumer::new(1, 0)));
        let manager = TaskManager::new(runtime.handle().clone());
        let started = app
            .start(&manager.executor(), manager.shutdown_signal())
            .unwrap();
        assert_eq!(started, 0);
    }
}
