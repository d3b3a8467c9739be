use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use bridge_core::{
    Address, BlockCursor, CursorStore, PriceRecord, PriceStore, SignedTx, StoreError, StoreResult,
    TransactionReceipt, TxId, TxRecord, TxStatus, TxStore,
};

/// Process local implementation of every relayer store. Nothing survives
/// a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    txs: RwLock<HashMap<TxId, TxRecord>>,
    cursors: RwLock<HashMap<(u64, Address), BlockCursor>>,
    prices: RwLock<HashMap<(u64, Address), PriceRecord>>,
}

impl MemoryStore {
    fn update_tx(&self, id: &TxId, update: impl FnOnce(&mut TxRecord)) -> StoreResult<()> {
        let mut txs = self.txs.write();
        let record = txs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("tx {id}")))?;
        update(record);
        Ok(())
    }
}

#[async_trait]
impl TxStore for MemoryStore {
    async fn store_tx(&self, tx: &TxRecord) -> StoreResult<()> {
        self.txs.write().insert(tx.id, tx.clone());
        Ok(())
    }

    async fn get_tx(&self, id: &TxId) -> StoreResult<Option<TxRecord>> {
        Ok(self.txs.read().get(id).cloned())
    }

    async fn list_txs(&self, status: Option<TxStatus>) -> StoreResult<Vec<TxRecord>> {
        let mut txs = self
            .txs
            .read()
            .values()
            .filter(|tx| status.map_or(true, |status| tx.status == status))
            .cloned()
            .collect::<Vec<_>>();
        txs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(txs)
    }

    async fn update_tx_status(
        &self,
        id: &TxId,
        status: TxStatus,
        message: Option<String>,
        receipt: Option<TransactionReceipt>,
    ) -> StoreResult<()> {
        self.update_tx(id, |tx| tx.set_status(status, message, receipt))
    }

    async fn update_raw_tx(&self, id: &TxId, signed: &SignedTx) -> StoreResult<()> {
        self.update_tx(id, |tx| tx.set_signed_tx(signed.clone()))
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn get_cursor(
        &self,
        chain_id: u64,
        contract: Address,
    ) -> StoreResult<Option<BlockCursor>> {
        Ok(self.cursors.read().get(&(chain_id, contract)).copied())
    }

    async fn upsert_cursor(&self, cursor: &BlockCursor) -> StoreResult<()> {
        self.cursors
            .write()
            .entry((cursor.chain_id, cursor.contract))
            .and_modify(|existing| {
                existing.next_block = existing.next_block.max(cursor.next_block)
            })
            .or_insert(*cursor);
        Ok(())
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn get_price(&self, chain_id: u64, vault: Address) -> StoreResult<Option<PriceRecord>> {
        Ok(self.prices.read().get(&(chain_id, vault)).cloned())
    }

    async fn upsert_price(&self, price: &PriceRecord) -> StoreResult<()> {
        let mut prices = self.prices.write();
        let key = (price.chain_id, price.vault);
        let price = match prices.get(&key) {
            Some(existing) => price.clone().merge_into(existing),
            None => price.clone(),
        };
        prices.insert(key, price);
        Ok(())
    }

    async fn list_prices(&self, chain_id: Option<u64>) -> StoreResult<Vec<PriceRecord>> {
        Ok(self
            .prices
            .read()
            .values()
            .filter(|price| chain_id.map_or(true, |chain_id| price.chain_id == chain_id))
            .cloned()
            .collect())
    }
}
