use std::fmt::Debug;

use async_trait::async_trait;
use auto_impl::auto_impl;

use crate::{
    Address, BlockCursor, PriceRecord, SignedTx, StoreResult, TransactionReceipt, TxId, TxRecord,
    TxStatus,
};

/// Durable transaction records of the transaction manager.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait TxStore: Send + Sync + Debug {
    /// Insert a new record
    async fn store_tx(&self, tx: &TxRecord) -> StoreResult<()>;

    /// Retrieve a record by id
    async fn get_tx(&self, id: &TxId) -> StoreResult<Option<TxRecord>>;

    /// All records, optionally filtered by status, oldest first
    async fn list_txs(&self, status: Option<TxStatus>) -> StoreResult<Vec<TxRecord>>;

    /// Move a record to `status`. `receipt` is only written when given.
    async fn update_tx_status(
        &self,
        id: &TxId,
        status: TxStatus,
        message: Option<String>,
        receipt: Option<TransactionReceipt>,
    ) -> StoreResult<()>;

    /// Overwrite the last signed attempt of a record
    async fn update_raw_tx(&self, id: &TxId, signed: &SignedTx) -> StoreResult<()>;
}

/// Last handled block per `(chain, contract)`.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait CursorStore: Send + Sync + Debug {
    /// Cursor of a contract, `None` if nothing was handled yet
    async fn get_cursor(&self, chain_id: u64, contract: Address)
        -> StoreResult<Option<BlockCursor>>;

    /// Insert or move the cursor forward. A cursor is never moved back.
    async fn upsert_cursor(&self, cursor: &BlockCursor) -> StoreResult<()>;
}

/// Latest prices per `(chain, vault)`.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait PriceStore: Send + Sync + Debug {
    /// Price of a vault
    async fn get_price(&self, chain_id: u64, vault: Address) -> StoreResult<Option<PriceRecord>>;

    /// Insert or replace the price of `(price.chain_id, price.vault)`
    async fn upsert_price(&self, price: &PriceRecord) -> StoreResult<()>;

    /// All prices, optionally restricted to a chain
    async fn list_prices(&self, chain_id: Option<u64>) -> StoreResult<Vec<PriceRecord>>;
}
