//! JSON-RPC controller over HTTP, for nodes exposing the finality
//! provider endpoints directly.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use fp_primitives::{BlockInfo, Buf32, Buf64, PubRandCommit, TxResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::traits::{BabylonController, ConsumerController};
use crate::types::FinalitySigItem;
use crate::{ClientError, ClientResult};

/// Error code a node answers with when the submitted state already exists.
const CODE_DUPLICATE: i32 = -32001;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc error code {}: {}", self.code, self.message)
    }
}

#[derive(Debug, Deserialize)]
struct Response<R> {
    result: Option<R>,
    error: Option<RpcError>,
    #[allow(unused)]
    id: u64,
}

/// A JSON-RPC connection to one endpoint.
pub struct JsonRpcClient {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
            next_id: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::AcqRel)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> ClientResult<T> {
        let id = self.next_id();
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await;

        let resp = match response {
            Ok(resp) => resp,
            Err(err) => {
                warn!(%method, %err, "rpc transport failure");
                // Connection-level trouble is worth retrying; anything
                // structural about the request is not.
                return if err.is_connect() || err.is_timeout() || err.is_request() {
                    Err(ClientError::Transient(err.to_string()))
                } else {
                    Err(ClientError::Rejected(err.to_string()))
                };
            }
        };

        let data: Response<T> = resp
            .json()
            .await
            .map_err(|e| ClientError::Rejected(format!("{method}: bad response: {e}")))?;

        if let Some(err) = data.error {
            return if err.code == CODE_DUPLICATE {
                Err(ClientError::Duplicate(err.message))
            } else {
                Err(ClientError::Rejected(err.to_string()))
            };
        }
        data.result
            .ok_or_else(|| ClientError::Rejected(format!("{method}: empty result")))
    }
}

#[async_trait]
impl ConsumerController for JsonRpcClient {
    async fn query_finality_activation_height(&self) -> ClientResult<u64> {
        self.call("query_finality_activation_height", json!([])).await
    }

    async fn query_latest_finalized_block(&self) -> ClientResult<Option<BlockInfo>> {
        self.call("query_latest_finalized_block", json!([])).await
    }

    async fn query_latest_block_height(&self) -> ClientResult<u64> {
        self.call("query_latest_block_height", json!([])).await
    }

    async fn query_finality_provider_has_power(
        &self,
        btc_pk: &Buf32,
        height: u64,
    ) -> ClientResult<bool> {
        self.call("query_finality_provider_has_power", json!([btc_pk, height]))
            .await
    }

    async fn query_finality_provider_highest_voted_height(
        &self,
        btc_pk: &Buf32,
    ) -> ClientResult<u64> {
        self.call(
            "query_finality_provider_highest_voted_height",
            json!([btc_pk]),
        )
        .await
    }

    async fn query_last_pub_rand_commit(
        &self,
        btc_pk: &Buf32,
    ) -> ClientResult<Option<PubRandCommit>> {
        self.call("query_last_pub_rand_commit", json!([btc_pk])).await
    }

    async fn query_blocks(
        &self,
        start: u64,
        end: u64,
        limit: u32,
    ) -> ClientResult<Vec<BlockInfo>> {
        self.call("query_blocks", json!([start, end, limit])).await
    }

    async fn commit_pub_rand_list(
        &self,
        btc_pk: &Buf32,
        start_height: u64,
        num_pub_rand: u64,
        commitment: &Buf32,
        signature: &Buf64,
    ) -> ClientResult<TxResponse> {
        self.call(
            "commit_pub_rand_list",
            json!([btc_pk, start_height, num_pub_rand, commitment, signature]),
        )
        .await
    }

    async fn submit_batch_finality_sigs(
        &self,
        btc_pk: &Buf32,
        batch: &[FinalitySigItem],
    ) -> ClientResult<TxResponse> {
        self.call("submit_batch_finality_sigs", json!([btc_pk, batch]))
            .await
    }
}

#[async_trait]
impl BabylonController for JsonRpcClient {
    async fn register_finality_provider(
        &self,
        btc_pk: &Buf32,
        chain_id: &str,
        commission_bps: u16,
        description: &str,
    ) -> ClientResult<TxResponse> {
        self.call(
            "register_finality_provider",
            json!([btc_pk, chain_id, commission_bps, description]),
        )
        .await
    }

    async fn update_finality_provider(
        &self,
        btc_pk: &Buf32,
        commission_bps: Option<u16>,
        description: Option<&str>,
    ) -> ClientResult<TxResponse> {
        self.call(
            "update_finality_provider",
            json!([btc_pk, commission_bps, description]),
        )
        .await
    }

    async fn query_balance(&self, addr: &str) -> ClientResult<u64> {
        self.call("query_balance", json!([addr])).await
    }
}
