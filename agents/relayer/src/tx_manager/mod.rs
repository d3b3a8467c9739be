//! Durable, nonce-safe transaction submission.
//!
//! Callers hand in "send this call data on chain X" requests with
//! [`TxManager::send_tx_async`]; the request is persisted as a `Pending`
//! [`TxRecord`] and picked up by a single background loop that signs,
//! broadcasts and bumps the gas price until a receipt is found or the
//! attempt budget runs out. Records are processed strictly one at a time:
//! the relayer signs for every chain with one account and nonce allocation
//! is not safe to parallelise.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use prometheus::IntCounterVec;
use tokio::time::{sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use bridge_base::{CoreMetrics, TxManagerSettings};
use bridge_core::{
    receipt_reverted, Address, Bytes, ChainClient, ChainCommunicationError, ChainResult,
    SignedTx, SignerProvider, StoreError, TransactionReceipt, TransactionRequest, TxId, TxRecord,
    TxSigner, TxStatus, TxStore, TypedTransaction, H256, U256,
};

pub use escalator::*;

mod escalator;

/// Broadcast attempts per record before it is given up as `Errored`
pub const MAX_ATTEMPTS: u32 = 5;

/// Timing of the transaction manager
#[derive(Debug, Clone, Copy)]
pub struct TxManagerConf {
    /// Period of the loop looking for `Pending` records
    pub process_interval: Duration,
    /// Store polling period of `wait_tx` and `wait_tx_completed`
    pub poll_interval: Duration,
    /// How long one attempt waits for a receipt before bumping
    pub bump_interval: Duration,
    /// Receipt polling period while waiting
    pub block_time: Duration,
}

impl Default for TxManagerConf {
    fn default() -> Self {
        Self {
            process_interval: Duration::from_millis(500),
            poll_interval: Duration::from_millis(500),
            bump_interval: Duration::from_secs(36),
            block_time: Duration::from_secs(12),
        }
    }
}

impl From<&TxManagerSettings> for TxManagerConf {
    fn from(settings: &TxManagerSettings) -> Self {
        Self {
            bump_interval: Duration::from_secs(settings.bump_interval_secs),
            block_time: Duration::from_secs(settings.block_time_secs),
            ..Default::default()
        }
    }
}

/// Errors of the transaction manager. The `Display` output of the variants
/// a record ends with is persisted as the record's message.
#[derive(Debug, thiserror::Error)]
pub enum TxManagerError {
    /// No receipt after `MAX_ATTEMPTS` attempts
    #[error("tx not confirmed after several attempts")]
    NotConfirmed,
    /// The node reported a replacement but no earlier attempt is mined
    #[error("tx already mined but no previous tx found")]
    MissingPreviousTx,
    /// The node rejected the transaction for a reason that is not retried
    #[error("failed to send tx: {0}")]
    Broadcast(#[source] ChainCommunicationError),
    /// The record reached a final status without a signed attempt
    #[error("tx {id} ended without being signed: {message}")]
    NeverSigned {
        /// Record id
        id: TxId,
        /// Status message of the record
        message: String,
    },
    /// The manager was stopped while waiting
    #[error("tx manager stopped")]
    Cancelled,
    /// RPC failure
    #[error(transparent)]
    Chain(#[from] ChainCommunicationError),
    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
struct TxManagerMetrics {
    transactions: IntCounterVec,
    broadcasts: IntCounterVec,
}

/// Signs, broadcasts and tracks transactions on every configured chain.
pub struct TxManager {
    clients: HashMap<u64, Arc<dyn ChainClient>>,
    signers: Arc<dyn SignerProvider>,
    store: Arc<dyn TxStore>,
    conf: TxManagerConf,
    metrics: TxManagerMetrics,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Debug for TxManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxManager")
            .field("chains", &self.clients.keys().collect::<Vec<_>>())
            .field("sender", &self.signers.address())
            .field("conf", &self.conf)
            .finish()
    }
}

impl TxManager {
    /// Create a stopped manager
    pub fn new(
        clients: HashMap<u64, Arc<dyn ChainClient>>,
        signers: Arc<dyn SignerProvider>,
        store: Arc<dyn TxStore>,
        conf: TxManagerConf,
        metrics: &CoreMetrics,
    ) -> Self {
        Self {
            clients,
            signers,
            store,
            conf,
            metrics: TxManagerMetrics {
                transactions: metrics.transactions(),
                broadcasts: metrics.transaction_broadcasts(),
            },
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Persist a `Pending` record for a call and return its id. Nothing is
    /// written when `chain_id` has no client.
    #[instrument(err, skip(self, data))]
    pub async fn send_tx_async(
        &self,
        chain_id: u64,
        to: Address,
        data: Bytes,
        gas_limit: u64,
    ) -> Result<TxId, TxManagerError> {
        self.client(chain_id)?;
        let tx = TxRecord::new(chain_id, to, data, gas_limit);
        self.store.store_tx(&tx).await?;
        debug!(id = %tx.id, "queued tx");
        Ok(tx.id)
    }

    /// Wait until the record has a signed attempt
    pub async fn wait_tx(&self, id: &TxId) -> Result<SignedTx, TxManagerError> {
        self.poll(id, |tx| match &tx.signed_tx {
            Some(signed) => Some(Ok(signed.clone())),
            None if tx.status.is_final() => Some(Err(TxManagerError::NeverSigned {
                id: tx.id,
                message: tx.message.clone().unwrap_or_default(),
            })),
            None => None,
        })
        .await
    }

    /// Wait until the record is `Succeed`, `Failed` or `Errored`
    pub async fn wait_tx_completed(&self, id: &TxId) -> Result<TxRecord, TxManagerError> {
        self.poll(id, |tx| tx.status.is_final().then(|| Ok(tx.clone())))
            .await
    }

    async fn poll<T>(
        &self,
        id: &TxId,
        mut ready: impl FnMut(&TxRecord) -> Option<Result<T, TxManagerError>>,
    ) -> Result<T, TxManagerError> {
        let mut ticker = tokio::time::interval(self.conf.poll_interval);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(TxManagerError::Cancelled),
                _ = ticker.tick() => {}
            }
            // a missing record may not be visible yet
            if let Some(tx) = self.store.get_tx(id).await? {
                if let Some(out) = ready(&tx) {
                    return out;
                }
            }
        }
    }

    /// Spawn the processing loop
    pub fn start(self: &Arc<Self>) {
        let manager = self.clone();
        self.tracker
            .spawn(async move { manager.run().await }.instrument(info_span!("tx_manager")));
    }

    /// Stop picking up records and wait for the record in flight to finish
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    async fn run(&self) {
        if let Err(err) = self.requeue_interrupted().await {
            error!(error = %err, "failed to requeue interrupted transactions");
        }

        info!(chains = ?self.clients.keys().collect::<Vec<_>>(), "tx manager started");
        let mut ticker = tokio::time::interval(self.conf.process_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(err) = self.process_txs().await {
                warn!(error = %err, "failed to process pending transactions");
            }
        }
        info!("tx manager stopped");
    }

    /// Records left `Processing` by a previous run go back to `Pending`.
    /// Their last signed attempt is kept and checked before resending.
    async fn requeue_interrupted(&self) -> Result<(), TxManagerError> {
        for tx in self.store.list_txs(Some(TxStatus::Processing)).await? {
            warn!(id = %tx.id, chain_id = tx.chain_id, "requeueing interrupted tx");
            self.store
                .update_tx_status(
                    &tx.id,
                    TxStatus::Pending,
                    Some("requeued after restart".into()),
                    None,
                )
                .await?;
        }
        Ok(())
    }

    async fn process_txs(&self) -> Result<(), TxManagerError> {
        let pending = self.store.list_txs(Some(TxStatus::Pending)).await?;
        for tx in pending {
            if self.cancel.is_cancelled() {
                break;
            }
            let id = tx.id;
            if let Err(err) = self.process_record(tx).await {
                error!(%id, error = %err, "failed to process tx");
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(id = %tx.id, chain_id = tx.chain_id))]
    async fn process_record(&self, tx: TxRecord) -> Result<(), TxManagerError> {
        self.store
            .update_tx_status(&tx.id, TxStatus::Processing, None, None)
            .await?;

        let (status, message, receipt) = match self.process_tx(&tx).await {
            Ok(receipt) if receipt_reverted(&receipt) => {
                warn!(hash = ?receipt.transaction_hash, "tx reverted");
                (TxStatus::Failed, None, Some(receipt))
            }
            Ok(receipt) => {
                info!(hash = ?receipt.transaction_hash, block = ?receipt.block_number, "tx mined");
                (TxStatus::Succeed, None, Some(receipt))
            }
            Err(err) => {
                error!(error = %err, "tx errored");
                (TxStatus::Errored, Some(err.to_string()), None)
            }
        };

        self.store
            .update_tx_status(&tx.id, status, message, receipt)
            .await?;
        self.metrics
            .transactions
            .with_label_values(&[tx.chain_id.to_string().as_str(), status.as_str()])
            .inc();
        Ok(())
    }

    async fn process_tx(&self, tx: &TxRecord) -> Result<TransactionReceipt, TxManagerError> {
        let client = self.client(tx.chain_id)?;
        let signer = self.signers.signer_for(tx.chain_id)?;
        let chain_label = tx.chain_id.to_string();

        // attempt signed before a restart
        let mut previous = tx.signed_tx.clone();
        if let Some(receipt) = previous_receipt(client, previous.as_ref()).await? {
            return Ok(receipt);
        }

        let mut nonce = client.pending_nonce_at(signer.address()).await?;
        if let Some(previous) = &previous {
            nonce = nonce.min(previous.nonce);
        }

        // price of the latest signed attempt, rejected ones included
        let mut last_gas_price = previous.as_ref().map(|previous| previous.gas_price);
        for attempt in 1..=MAX_ATTEMPTS {
            let suggested = client.suggest_gas_price().await?;
            let gas_price = escalate_gas_price(suggested, last_gas_price, attempt);
            let signed = sign(tx, signer.as_ref(), nonce, gas_price).await?;
            self.store.update_raw_tx(&tx.id, &signed).await?;
            last_gas_price = Some(gas_price);

            debug!(attempt, %nonce, %gas_price, hash = ?signed.hash, "broadcasting tx");
            self.metrics
                .broadcasts
                .with_label_values(&[chain_label.as_str()])
                .inc();
            match client.send_transaction(signed.raw.clone()).await {
                Ok(_) => {}
                Err(ChainCommunicationError::ReplacementUnderpriced(reason)) => {
                    debug!(%reason, "replacement underpriced, checking previous attempt");
                    return previous_receipt(client, previous.as_ref())
                        .await?
                        .ok_or(TxManagerError::MissingPreviousTx);
                }
                Err(ChainCommunicationError::NonceTooLow(reason)) => {
                    if let Some(receipt) = previous_receipt(client, previous.as_ref()).await? {
                        return Ok(receipt);
                    }
                    nonce = client.pending_nonce_at(signer.address()).await?;
                    warn!(%reason, %nonce, "nonce already used, retrying with a fresh nonce");
                    continue;
                }
                Err(err) => return Err(TxManagerError::Broadcast(err)),
            }

            if let Some(receipt) = self.wait_mined(client, signed.hash).await {
                return Ok(receipt);
            }
            info!(attempt, hash = ?signed.hash, "tx not mined within bump interval");
            previous = Some(signed);
        }

        Err(TxManagerError::NotConfirmed)
    }

    /// Poll for a receipt every block time until the bump interval elapses
    async fn wait_mined(&self, client: &dyn ChainClient, hash: H256) -> Option<TransactionReceipt> {
        let deadline = Instant::now() + self.conf.bump_interval;
        loop {
            match client.transaction_receipt(hash).await {
                Ok(Some(receipt)) => return Some(receipt),
                Ok(None) => {}
                Err(err) => warn!(error = %err, ?hash, "failed to fetch receipt"),
            }
            if Instant::now() + self.conf.block_time > deadline {
                return None;
            }
            sleep(self.conf.block_time).await;
        }
    }

    fn client(&self, chain_id: u64) -> ChainResult<&dyn ChainClient> {
        self.clients
            .get(&chain_id)
            .map(|client| client.as_ref())
            .ok_or(ChainCommunicationError::UnsupportedChain(chain_id))
    }
}

async fn previous_receipt(
    client: &dyn ChainClient,
    previous: Option<&SignedTx>,
) -> ChainResult<Option<TransactionReceipt>> {
    match previous {
        Some(previous) => client.transaction_receipt(previous.hash).await,
        None => Ok(None),
    }
}

async fn sign(
    tx: &TxRecord,
    signer: &dyn TxSigner,
    nonce: U256,
    gas_price: U256,
) -> ChainResult<SignedTx> {
    let unsigned: TypedTransaction = TransactionRequest::new()
        .from(signer.address())
        .to(tx.to)
        .data(tx.data.clone())
        .gas(tx.gas_limit)
        .gas_price(gas_price)
        .nonce(nonce)
        .chain_id(tx.chain_id)
        .into();
    let signature = signer.sign_transaction(&unsigned).await?;
    Ok(SignedTx {
        hash: unsigned.hash(&signature),
        raw: unsigned.rlp_signed(&signature),
        nonce,
        gas_price,
    })
}

#[cfg(test)]
mod tests;
