//! Connection context threaded through every sync call.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, U256};

use crate::events::ProjectId;
use crate::rpc::ChainRpc;
use crate::signer::Signer;

/// Chains whose `eth_getLogs` drops results when an address constraint is
/// combined with topic filters (Fantom opera and Fantom testnet).
pub const LOG_FILTER_DEFECT_CHAINS: [u64; 2] = [250, 4002];

pub fn has_log_filter_defect(chain_id: u64) -> bool {
    LOG_FILTER_DEFECT_CHAINS.contains(&chain_id)
}

/// The connected account on one chain, plus the handles used to reach it.
#[derive(Clone)]
pub struct ConnectionContext {
    pub chain_id: u64,
    pub account: Address,
    /// Project registry deployed on `chain_id`.
    pub registry: Address,
    pub rpc: Arc<dyn ChainRpc>,
    pub signer: Option<Arc<dyn Signer>>,
}

impl ConnectionContext {
    pub fn project_id(&self, number: U256) -> ProjectId {
        ProjectId::new(self.chain_id, self.registry, number)
    }

    /// Key for state that belongs to this account on this chain.
    pub fn scope(&self) -> String {
        format!("{}:{:#x}", self.chain_id, self.account)
    }
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("chain_id", &self.chain_id)
            .field("account", &self.account)
            .field("registry", &self.registry)
            .field("signer", &self.signer.is_some())
            .finish()
    }
}
