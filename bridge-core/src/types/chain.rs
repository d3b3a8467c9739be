use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::{Address, ChainClient};

/// Static per-chain data, built once at startup and shared read-only.
#[derive(Clone)]
pub struct ChainContext {
    /// Human readable name
    pub name: String,
    /// EVM chain id
    pub chain_id: u64,
    /// RPC client of the chain
    pub client: Arc<dyn ChainClient>,
    /// Address of the bridge contract
    pub bridge_contract: Address,
    /// Block the bridge contract was deployed at
    pub bridge_block: u64,
}

impl Debug for ChainContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainContext")
            .field("name", &self.name)
            .field("chain_id", &self.chain_id)
            .field("bridge_contract", &self.bridge_contract)
            .field("bridge_block", &self.bridge_block)
            .finish()
    }
}
