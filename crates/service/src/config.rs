use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const DEFAULT_DATADIR: &str = "fpd-data";
const DEFAULT_NUM_PUB_RAND: u64 = 1000;
const DEFAULT_TIMESTAMPING_DELAY: u64 = 200;
const DEFAULT_MIN_PUB_RAND_RUNWAY: u64 = 100;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_POLL_BATCH_SIZE: u32 = 100;
const DEFAULT_RPC_TIMEOUT_MS: u64 = 5000;
const DEFAULT_MAX_SUBMISSION_RETRIES: u16 = 5;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_datadir")]
    pub datadir: PathBuf,

    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub randomness: RandomnessConfig,

    #[serde(default)]
    pub poller: PollerConfig,

    #[serde(default)]
    pub rpc: RpcConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            datadir: default_datadir(),
            chain: ChainConfig::default(),
            randomness: RandomnessConfig::default(),
            poller: PollerConfig::default(),
            rpc: RpcConfig::default(),
        }
    }
}

/// Endpoints of the two control planes the agent talks to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainConfig {
    #[serde(default = "default_consumer_rpc_url")]
    pub consumer_rpc_url: String,

    #[serde(default = "default_babylon_rpc_url")]
    pub babylon_rpc_url: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            consumer_rpc_url: default_consumer_rpc_url(),
            babylon_rpc_url: default_babylon_rpc_url(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Directory holding the sealed EOTS key files.
    pub fn keystore_dir(&self) -> PathBuf {
        self.datadir.join("keystore")
    }
}

/// Sizing of public randomness commitments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomnessConfig {
    /// Randomness values per commitment batch.
    #[serde(default = "default_num_pub_rand")]
    pub num_pub_rand: u64,

    /// Blocks the BTC timestamping of a commit is conservatively assumed
    /// to lag behind the tip.
    #[serde(default = "default_timestamping_delay")]
    pub timestamping_delay: u64,

    /// Minimum uncommitted-randomness runway kept ahead of the tip; a new
    /// batch is committed once the runway dips below this.
    #[serde(default = "default_min_pub_rand_runway")]
    pub min_pub_rand_runway: u64,
}

impl Default for RandomnessConfig {
    fn default() -> Self {
        Self {
            num_pub_rand: DEFAULT_NUM_PUB_RAND,
            timestamping_delay: DEFAULT_TIMESTAMPING_DELAY,
            min_pub_rand_runway: DEFAULT_MIN_PUB_RAND_RUNWAY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Blocks fetched per poll.
    #[serde(default = "default_poll_batch_size")]
    pub batch_size: u32,

    /// Fixed first height to process, overriding the start-height
    /// resolver. Meant for tests and recovery tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_start_height: Option<u64>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            batch_size: DEFAULT_POLL_BATCH_SIZE,
            static_start_height: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_submission_retries")]
    pub max_submission_retries: u16,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_RPC_TIMEOUT_MS,
            max_submission_retries: DEFAULT_MAX_SUBMISSION_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }
}

fn default_datadir() -> PathBuf {
    DEFAULT_DATADIR.into()
}

fn default_consumer_rpc_url() -> String {
    "http://127.0.0.1:8651".to_string()
}

fn default_babylon_rpc_url() -> String {
    "http://127.0.0.1:8652".to_string()
}

fn default_num_pub_rand() -> u64 {
    DEFAULT_NUM_PUB_RAND
}

fn default_timestamping_delay() -> u64 {
    DEFAULT_TIMESTAMPING_DELAY
}

fn default_min_pub_rand_runway() -> u64 {
    DEFAULT_MIN_PUB_RAND_RUNWAY
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_poll_batch_size() -> u32 {
    DEFAULT_POLL_BATCH_SIZE
}

fn default_rpc_timeout_ms() -> u64 {
    DEFAULT_RPC_TIMEOUT_MS
}

fn default_max_submission_retries() -> u16 {
    DEFAULT_MAX_SUBMISSION_RETRIES
}

fn default_retry_base_delay_ms() -> u64 {
    DEFAULT_RETRY_BASE_DELAY_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_load_full() {
        let raw = r#"
            datadir = "/var/lib/fpd"

            [chain]
            consumer_rpc_url = "http://10.0.0.5:8651"
            babylon_rpc_url = "http://10.0.0.5:8652"

            [randomness]
            num_pub_rand = 5000
            timestamping_delay = 300
            min_pub_rand_runway = 200

            [poller]
            poll_interval_ms = 500
            batch_size = 50

            [rpc]
            timeout_ms = 2000
            max_submission_retries = 10
            retry_base_delay_ms = 1000
        "#;

        let config: Config = toml::from_str(raw).expect("full config should parse");
        assert_eq!(config.chain.consumer_rpc_url, "http://10.0.0.5:8651");
        assert_eq!(config.randomness.num_pub_rand, 5000);
        assert_eq!(config.poller.batch_size, 50);
        assert_eq!(config.rpc.timeout_ms, 2000);
        assert_eq!(config.poller.static_start_height, None);
    }

    #[test]
    fn test_config_defaults() {
        let config: Config = toml::from_str("").expect("empty config should parse");
        assert_eq!(config, Config::default());
        assert_eq!(config.keystore_dir(), PathBuf::from("fpd-data/keystore"));
    }
}
