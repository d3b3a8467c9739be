use std::sync::Arc;

use async_trait::async_trait;
use ethers::providers::{Middleware, Provider, Ws};
use ethers::types::BlockNumber;
use futures_util::{stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};
use url::Url;

use bridge_core::{
    Address, Bytes, ChainClient, ChainCommunicationError, ChainResult, Filter, Log, LogStream,
    TransactionReceipt, H256, U256,
};

use crate::{classify_provider_error, EthereumProviderConnectionError};

/// Buffered live logs per subscription before the forwarder waits for the
/// consumer.
const SUBSCRIPTION_BUFFER: usize = 64;

/// `ChainClient` over an ethers websocket provider
#[derive(Debug, Clone)]
pub struct EthereumClient {
    provider: Arc<Provider<Ws>>,
    chain_id: u64,
}

impl EthereumClient {
    /// Connect to `url` and check the node serves `chain_id`
    #[instrument(err, fields(url = %url))]
    pub async fn connect(url: &Url, chain_id: u64) -> Result<Self, EthereumProviderConnectionError> {
        let ws = Ws::connect(url.as_str())
            .await
            .map_err(|source| EthereumProviderConnectionError::Connect {
                url: url.to_string(),
                source,
            })?;
        let client = Self::new(Provider::new(ws), chain_id);

        let actual = client.provider.get_chainid().await?.as_u64();
        if actual != chain_id {
            return Err(EthereumProviderConnectionError::ChainIdMismatch {
                expected: chain_id,
                actual,
            });
        }
        let block = client.provider.get_block_number().await?;
        info!(chain_id, %block, "connected to chain");
        Ok(client)
    }

    /// Wrap an already connected provider
    pub fn new(provider: Provider<Ws>, chain_id: u64) -> Self {
        Self {
            provider: Arc::new(provider),
            chain_id,
        }
    }
}

#[async_trait]
impl ChainClient for EthereumClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    #[instrument(err, skip(self, raw), fields(chain_id = self.chain_id))]
    async fn send_transaction(&self, raw: Bytes) -> ChainResult<H256> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(classify_provider_error)?;
        Ok(pending.tx_hash())
    }

    async fn suggest_gas_price(&self) -> ChainResult<U256> {
        self.provider
            .get_gas_price()
            .await
            .map_err(classify_provider_error)
    }

    async fn transaction_receipt(&self, hash: H256) -> ChainResult<Option<TransactionReceipt>> {
        self.provider
            .get_transaction_receipt(hash)
            .await
            .map_err(classify_provider_error)
    }

    async fn pending_nonce_at(&self, account: Address) -> ChainResult<U256> {
        self.provider
            .get_transaction_count(account, Some(BlockNumber::Pending.into()))
            .await
            .map_err(classify_provider_error)
    }

    #[instrument(err, skip(self), fields(chain_id = self.chain_id))]
    async fn filter_logs(&self, filter: &Filter) -> ChainResult<Vec<Log>> {
        self.provider
            .get_logs(filter)
            .await
            .map_err(classify_provider_error)
    }

    /// Logs are forwarded by a task owning a provider handle. Dropping the
    /// returned stream ends the task and unsubscribes.
    #[instrument(err, skip(self), fields(chain_id = self.chain_id))]
    async fn subscribe_logs(&self, filter: &Filter) -> ChainResult<LogStream> {
        let provider = self.provider.clone();
        let filter = filter.clone();
        let chain_id = self.chain_id;
        let (ready_tx, ready_rx) = oneshot::channel();
        let (logs_tx, logs_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        tokio::spawn(async move {
            let mut subscription = match provider.subscribe_logs(&filter).await {
                Ok(subscription) => {
                    let _ = ready_tx.send(Ok(()));
                    subscription
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = logs_tx.closed() => break,
                    next = subscription.next() => match next {
                        Some(log) => {
                            if logs_tx.send(Ok(log)).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            warn!(chain_id, "log subscription closed by the node");
                            break;
                        }
                    }
                }
            }
            debug!(chain_id, "log subscription forwarder finished");
        });

        ready_rx
            .await
            .map_err(|_| ChainCommunicationError::SubscriptionClosed)?
            .map_err(classify_provider_error)?;

        Ok(Box::pin(stream::unfold(logs_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }

    async fn latest_block_number(&self) -> ChainResult<u64> {
        self.provider
            .get_block_number()
            .await
            .map(|block| block.as_u64())
            .map_err(classify_provider_error)
    }
}
