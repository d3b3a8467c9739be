use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::instrument;

use bridge_core::{
    Address, BlockCursor, CursorStore, PriceRecord, PriceStore, SignedTx, StoreError, StoreResult,
    TransactionReceipt, TxId, TxRecord, TxStatus, TxStore,
};

use super::{DbResult, TypedDB, DB};

// these keys MUST not be given multiple uses in case multiple agents are
// started with the same database.

const TX_BY_ID: &str = "tx_by_id_";
const TX_ID_BY_STATUS: &str = "tx_id_by_status_";
const CURSOR_BY_CHAIN_CONTRACT: &str = "cursor_by_chain_contract_";
const PRICE_BY_CHAIN_VAULT: &str = "price_by_chain_vault_";

fn chain_address_key(chain_id: u64, address: Address) -> Vec<u8> {
    let mut key = chain_id.to_be_bytes().to_vec();
    key.extend_from_slice(address.as_bytes());
    key
}

fn status_key(status: TxStatus, id: &TxId) -> Vec<u8> {
    let parts: [&[u8]; 3] = [status.as_str().as_bytes(), b"_", id.as_bytes()];
    parts.concat()
}

/// DB handle implementing every relayer store.
///
/// Read-modify-write updates are serialized by a process local lock; the
/// database must not be shared by concurrently running agents.
#[derive(Debug)]
pub struct RocksStore {
    db: TypedDB,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Store scoped to `entity`, usually the agent name
    pub fn new(entity: &str, db: DB) -> Self {
        Self {
            db: TypedDB::new(entity.to_owned(), db),
            write_lock: Mutex::new(()),
        }
    }

    fn retrieve_tx(&self, id: &TxId) -> DbResult<Option<TxRecord>> {
        self.db.retrieve_value(TX_BY_ID, id.as_bytes())
    }

    fn store_tx_record(&self, tx: &TxRecord) -> DbResult<()> {
        self.db.store_value(TX_BY_ID, tx.id.as_bytes(), tx)
    }

    /// Records with `status`, found through the status index
    fn txs_with_status(&self, status: TxStatus) -> DbResult<Vec<TxRecord>> {
        let prefix = format!("{}_", status.as_str());
        let mut txs = vec![];
        for id in self.db.retrieve_values::<TxId>(TX_ID_BY_STATUS, prefix)? {
            if let Some(tx) = self.retrieve_tx(&id)? {
                if tx.status == status {
                    txs.push(tx);
                }
            }
        }
        Ok(txs)
    }

    fn update_tx(&self, id: &TxId, update: impl FnOnce(&mut TxRecord)) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let mut record = self
            .retrieve_tx(id)?
            .ok_or_else(|| StoreError::NotFound(format!("tx {id}")))?;
        let before = record.status;
        update(&mut record);
        self.store_tx_record(&record)?;
        if record.status != before {
            self.db
                .store_value(TX_ID_BY_STATUS, status_key(record.status, id), id)?;
            self.db
                .delete_value(TX_ID_BY_STATUS, status_key(before, id))?;
        }
        Ok(())
    }
}

#[async_trait]
impl TxStore for RocksStore {
    async fn store_tx(&self, tx: &TxRecord) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        self.store_tx_record(tx)?;
        Ok(self
            .db
            .store_value(TX_ID_BY_STATUS, status_key(tx.status, &tx.id), &tx.id)?)
    }

    async fn get_tx(&self, id: &TxId) -> StoreResult<Option<TxRecord>> {
        Ok(self.retrieve_tx(id)?)
    }

    async fn list_txs(&self, status: Option<TxStatus>) -> StoreResult<Vec<TxRecord>> {
        let mut txs = match status {
            Some(status) => self.txs_with_status(status)?,
            None => self.db.retrieve_values::<TxRecord>(TX_BY_ID, b"")?,
        };
        txs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(txs)
    }

    #[instrument(err, skip(self, receipt))]
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
impl CursorStore for RocksStore {
    async fn get_cursor(
        &self,
        chain_id: u64,
        contract: Address,
    ) -> StoreResult<Option<BlockCursor>> {
        Ok(self.db.retrieve_value(
            CURSOR_BY_CHAIN_CONTRACT,
            chain_address_key(chain_id, contract),
        )?)
    }

    async fn upsert_cursor(&self, cursor: &BlockCursor) -> StoreResult<()> {
        let key = chain_address_key(cursor.chain_id, cursor.contract);
        let _guard = self.write_lock.lock();
        let existing: Option<BlockCursor> =
            self.db.retrieve_value(CURSOR_BY_CHAIN_CONTRACT, &key)?;
        if existing.map_or(false, |existing| existing.next_block >= cursor.next_block) {
            return Ok(());
        }
        Ok(self.db.store_value(CURSOR_BY_CHAIN_CONTRACT, key, cursor)?)
    }
}

#[async_trait]
impl PriceStore for RocksStore {
    async fn get_price(&self, chain_id: u64, vault: Address) -> StoreResult<Option<PriceRecord>> {
        Ok(self
            .db
            .retrieve_value(PRICE_BY_CHAIN_VAULT, chain_address_key(chain_id, vault))?)
    }

    async fn upsert_price(&self, price: &PriceRecord) -> StoreResult<()> {
        let key = chain_address_key(price.chain_id, price.vault);
        let _guard = self.write_lock.lock();
        let existing: Option<PriceRecord> = self.db.retrieve_value(PRICE_BY_CHAIN_VAULT, &key)?;
        let price = match existing {
            Some(existing) => price.clone().merge_into(&existing),
            None => price.clone(),
        };
        Ok(self.db.store_value(PRICE_BY_CHAIN_VAULT, key, &price)?)
    }

    async fn list_prices(&self, chain_id: Option<u64>) -> StoreResult<Vec<PriceRecord>> {
        let key_prefix = chain_id
            .map(|chain_id| chain_id.to_be_bytes().to_vec())
            .unwrap_or_default();
        Ok(self.db.retrieve_values(PRICE_BY_CHAIN_VAULT, key_prefix)?)
    }
}
