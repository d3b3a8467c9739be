use crate::Address;

/// Next unprocessed block of a bridge contract on one chain.
///
/// Keyed by `(chain_id, contract)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockCursor {
    /// Chain the contract lives on
    pub chain_id: u64,
    /// Address of the watched contract
    pub contract: Address,
    /// First block that was not fully handled yet
    pub next_block: u64,
}

impl BlockCursor {
    /// Cursor pointing right after the block of a handled event
    pub fn after(chain_id: u64, contract: Address, handled_block: u64) -> Self {
        Self {
            chain_id,
            contract,
            next_block: handled_block.saturating_add(1),
        }
    }
}
