use std::fmt::Debug;

use async_trait::async_trait;
use auto_impl::auto_impl;
use futures::stream::BoxStream;

use crate::{Address, Bytes, ChainResult, Filter, Log, TransactionReceipt, H256, U256};

/// Live logs of a subscription. The stream ends when the subscription is
/// closed by the node; it cannot be restarted.
pub type LogStream = BoxStream<'static, ChainResult<Log>>;

/// The subset of an EVM JSON-RPC client the relayer needs.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait ChainClient: Send + Sync + Debug {
    /// Chain id this client is connected to
    fn chain_id(&self) -> u64;

    /// Broadcast an RLP encoded signed transaction
    async fn send_transaction(&self, raw: Bytes) -> ChainResult<H256>;

    /// Gas price suggested by the node
    async fn suggest_gas_price(&self) -> ChainResult<U256>;

    /// Receipt of a mined transaction, `None` while it is not mined
    async fn transaction_receipt(&self, hash: H256) -> ChainResult<Option<TransactionReceipt>>;

    /// Next nonce of `account`, including transactions in the mempool
    async fn pending_nonce_at(&self, account: Address) -> ChainResult<U256>;

    /// Historical logs matching `filter`
    async fn filter_logs(&self, filter: &Filter) -> ChainResult<Vec<Log>>;

    /// Subscribe to new logs matching `filter`
    async fn subscribe_logs(&self, filter: &Filter) -> ChainResult<LogStream>;

    /// Number of the latest block
    async fn latest_block_number(&self) -> ChainResult<u64>;
}
