use std::sync::Arc;

use bridge_core::{CursorStore, PriceStore, TxStore};

use crate::{MemoryStore, RocksStore};

/// Handles to the stores used by the agents
#[derive(Debug, Clone)]
pub struct Stores {
    /// Transaction records
    pub txs: Arc<dyn TxStore>,
    /// Block cursors
    pub cursors: Arc<dyn CursorStore>,
    /// Vault prices
    pub prices: Arc<dyn PriceStore>,
}

impl From<MemoryStore> for Stores {
    fn from(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            txs: store.clone(),
            cursors: store.clone(),
            prices: store,
        }
    }
}

impl From<RocksStore> for Stores {
    fn from(store: RocksStore) -> Self {
        let store = Arc::new(store);
        Self {
            txs: store.clone(),
            cursors: store.clone(),
            prices: store,
        }
    }
}
