//! Wallet capability: address, message signing and contract calls.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

use crate::errors::{ClientError, Result};
use crate::rpc::HttpRpc;

/// A prepared contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractCall {
    pub to: Address,
    pub data: Bytes,
}

#[async_trait]
pub trait Signer: Send + Sync {
    async fn get_address(&self) -> Result<Address>;

    async fn sign_message(&self, message: &str) -> Result<String>;

    /// Submit `call` and return the transaction hash.
    async fn send_transaction(&self, call: &ContractCall) -> Result<String>;
}

/// Signs through a node-managed account (`eth_accounts`, `personal_sign`,
/// `eth_sendTransaction`).
pub struct RpcSigner {
    rpc: Arc<HttpRpc>,
    account: Address,
}

impl RpcSigner {
    pub fn new(rpc: Arc<HttpRpc>, account: Address) -> Self {
        Self { rpc, account }
    }

    /// Resolve the node's first unlocked account.
    pub async fn connect(rpc: Arc<HttpRpc>) -> Result<Self> {
        let accounts: Vec<Address> = rpc.request("eth_accounts", json!([])).await?;
        let account = accounts
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Signer("node exposes no accounts".to_string()))?;
        Ok(Self::new(rpc, account))
    }
}

#[async_trait]
impl Signer for RpcSigner {
    async fn get_address(&self) -> Result<Address> {
        Ok(self.account)
    }

    async fn sign_message(&self, message: &str) -> Result<String> {
        let payload = format!("0x{}", hex::encode(message.as_bytes()));
        self.rpc
            .request("personal_sign", json!([payload, self.account]))
            .await
    }

    async fn send_transaction(&self, call: &ContractCall) -> Result<String> {
        self.rpc
            .request(
                "eth_sendTransaction",
                json!([{ "from": self.account, "to": call.to, "data": call.data }]),
            )
            .await
    }
}
