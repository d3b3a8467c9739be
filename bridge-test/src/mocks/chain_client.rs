#![allow(non_snake_case)]

use async_trait::async_trait;
use mockall::*;

use bridge_core::*;

mock! {
    pub ChainClient {
        pub fn _chain_id(&self) -> u64 {}

        pub fn _send_transaction(&self, raw: Bytes) -> ChainResult<H256> {}

        pub fn _suggest_gas_price(&self) -> ChainResult<U256> {}

        pub fn _transaction_receipt(&self, hash: H256) -> ChainResult<Option<TransactionReceipt>> {}

        pub fn _pending_nonce_at(&self, account: Address) -> ChainResult<U256> {}

        pub fn _filter_logs(&self, filter: &Filter) -> ChainResult<Vec<Log>> {}

        pub fn _subscribe_logs(&self, filter: &Filter) -> ChainResult<LogStream> {}

        pub fn _latest_block_number(&self) -> ChainResult<u64> {}
    }
}

impl std::fmt::Debug for MockChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockChainClient")
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn chain_id(&self) -> u64 {
        self._chain_id()
    }

    async fn send_transaction(&self, raw: Bytes) -> ChainResult<H256> {
        self._send_transaction(raw)
    }

    async fn suggest_gas_price(&self) -> ChainResult<U256> {
        self._suggest_gas_price()
    }

    async fn transaction_receipt(&self, hash: H256) -> ChainResult<Option<TransactionReceipt>> {
        self._transaction_receipt(hash)
    }

    async fn pending_nonce_at(&self, account: Address) -> ChainResult<U256> {
        self._pending_nonce_at(account)
    }

    async fn filter_logs(&self, filter: &Filter) -> ChainResult<Vec<Log>> {
        self._filter_logs(filter)
    }

    async fn subscribe_logs(&self, filter: &Filter) -> ChainResult<LogStream> {
        self._subscribe_logs(filter)
    }

    async fn latest_block_number(&self) -> ChainResult<u64> {
        self._latest_block_number()
    }
}
