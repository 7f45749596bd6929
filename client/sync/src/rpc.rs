//! Chain JSON-RPC client: `eth_getLogs` plus the generic request path the
//! signer builds on.
//!
//! Failures are returned to the caller as-is. Nothing here retries; the sync
//! engine decides how a failed request surfaces.

use alloy_primitives::{Address, Bytes, B256, U64};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::{ClientError, Result};
use crate::events::Log;

// ─────────────────────────────────────────────────────────
// Filters
// ─────────────────────────────────────────────────────────

/// One position of a log topic filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Topic {
    /// Wildcard, serialised as `null`.
    Any,
    One(B256),
    /// OR-match over several values.
    OneOf(Vec<B256>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    pub from_block: String,
    pub to_block: String,
    pub topics: Vec<Topic>,
}

impl LogFilter {
    /// Genesis to latest for `address`.
    pub fn full_range(address: Address, topics: Vec<Topic>) -> Self {
        Self {
            address: Some(address),
            from_block: "0x0".to_string(),
            to_block: "latest".to_string(),
            topics,
        }
    }
}

/// The subset of a chain node the sync core reads from.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>>;
}

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    pub block_number: Option<U64>,
    #[serde(default)]
    pub removed: bool,
}

impl RawLog {
    fn decode(self) -> Result<Log> {
        let block_number = self
            .block_number
            .ok_or_else(|| ClientError::EventParse("pending log has no block number".into()))?;
        Ok(Log {
            address: self.address,
            topics: self.topics,
            data: self.data,
            block_number: block_number.to::<u64>(),
        })
    }
}

// ─────────────────────────────────────────────────────────
// HTTP transport
// ─────────────────────────────────────────────────────────

pub struct HttpRpc {
    client: Client,
    url: String,
}

impl HttpRpc {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Issue one JSON-RPC 2.0 call and decode its `result`.
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await?
            .error_for_status()?;

        let body: RpcResponse<T> = response.json().await?;
        if let Some(err) = body.error {
            return Err(ClientError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        body.result.ok_or_else(|| ClientError::Rpc {
            code: 0,
            message: format!("empty result from {method}"),
        })
    }
}

#[async_trait]
impl ChainRpc for HttpRpc {
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>> {
        let raw: Vec<RawLog> = self.request("eth_getLogs", json!([filter])).await?;
        debug!("eth_getLogs returned {} logs", raw.len());

        raw.into_iter()
            .filter(|log| !log.removed)
            .map(RawLog::decode)
            .collect()
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
