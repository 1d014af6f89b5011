use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use fp_client::JsonRpcClient;
use fp_db::traits::FinalityProviderDatabase;
use fp_eots_manager::{EotsManager, Keystore, DEFAULT_HD_PATH};
use fp_primitives::Buf32;
use fp_rocksdb_store::{open_rocksdb_database, EotsKeyDb, FinalityProviderDb, NonceDb, ProofDb};
use fp_service::{Config, FinalityProviderApp};
use fp_tasks::TaskManager;
use tracing::info;

use crate::args::{Command, TopLevel};

mod args;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Exit code for a shutdown forced by a critical error (equivocation or
/// store corruption detected).
const EXIT_CRITICAL: i32 = 2;

fn main() {
    let args: TopLevel = argh::from_env();
    init_logging();

    match main_inner(args) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("FATAL ERROR: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_logging() {
    let filt = tracing_subscriber::EnvFilter::from_default_env();
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filt)
        .init();
}

fn main_inner(args: TopLevel) -> anyhow::Result<i32> {
    let config = match &args.config {
        Some(path) => Config::load(path).context("init: load config")?,
        None => Config::default(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("fpd-rt")
        .build()
        .context("init: build rt")?;

    // Open the database and wire up the shared stores.
    let rbdb = open_rocksdb_database(&config.datadir).context("init: open rocksdb")?;
    let nonce_db = Arc::new(NonceDb::new(rbdb.clone()));
    let key_db = Arc::new(EotsKeyDb::new(rbdb.clone()));
    let fp_db = Arc::new(FinalityProviderDb::new(rbdb.clone()));
    let proof_db = Arc::new(ProofDb::new(rbdb));

    let keystore = Keystore::new(config.keystore_dir()).context("init: open keystore")?;
    let em = Arc::new(EotsManager::new(keystore, key_db, nonce_db));

    match args.cmd {
        Command::CreateKey(cmd) => {
            let hd_path = cmd.hd_path.as_deref().unwrap_or(DEFAULT_HD_PATH);
            let btc_pk = em
                .create_key(&cmd.name, &cmd.passphrase, hd_path)
                .context("create-key")?;
            println!("{btc_pk}");
            Ok(0)
        }

        Command::Register(cmd) => {
            let btc_pk: Buf32 = cmd.btc_pk.parse().context("register: parse btc pk")?;
            let app = build_app(&config, em, fp_db, proof_db);
            runtime
                .block_on(app.register_finality_provider(
                    btc_pk,
                    cmd.addr,
                    cmd.chain_id,
                    cmd.commission_bps,
                    cmd.description,
                ))
                .context("register")?;
            println!("registered {btc_pk}");
            Ok(0)
        }

        Command::Start(cmd) => {
            let providers = fp_db.list_finality_providers().context("init: list providers")?;
            if providers.is_empty() {
                anyhow::bail!("no finality providers registered, run `fpd register` first");
            }
            for fp in &providers {
                em.unlock_key(&fp.btc_pk, &cmd.passphrase)
                    .with_context(|| format!("init: unlock key {}", fp.btc_pk))?;
            }

            let app = build_app(&config, em, fp_db, proof_db);
            let task_manager = TaskManager::new(runtime.handle().clone());
            app.start(&task_manager.executor(), task_manager.shutdown_signal())
                .context("init: start app")?;
            task_manager.start_signal_listener();

            info!("fpd started");
            let monitor_res = task_manager.monitor(Some(SHUTDOWN_TIMEOUT));

            if app.had_critical_error() || monitor_res.is_err() {
                Ok(EXIT_CRITICAL)
            } else {
                Ok(0)
            }
        }
    }
}

fn build_app(
    config: &Config,
    em: Arc<EotsManager>,
    fp_db: Arc<FinalityProviderDb>,
    proof_db: Arc<ProofDb>,
) -> FinalityProviderApp {
    let consumer = Arc::new(JsonRpcClient::new(config.chain.consumer_rpc_url.clone()));
    let babylon = Arc::new(JsonRpcClient::new(config.chain.babylon_rpc_url.clone()));
    FinalityProviderApp::new(
        Arc::new(config.clone()),
        em,
        fp_db,
        proof_db,
        consumer,
        babylon,
    )
}
