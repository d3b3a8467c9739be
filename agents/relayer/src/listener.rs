//! Resumable log ingestion for one `(chain, contract, topics)` triple.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use ethers::types::ValueOrArray;
use futures::StreamExt;
use parking_lot::Mutex;
use prometheus::IntCounter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use bridge_base::ListenerConf;
use bridge_core::{
    Address, ChainClient, ChainCommunicationError, ChainContext, CursorStore, Filter, Log,
    StoreError, H256, U256,
};

use crate::backoff::{self, BackoffError};

/// Widest block range requested from the node in one `eth_getLogs` call
pub const MAX_BLOCK_RANGE: u64 = 50_000;

/// Errors of the event listener
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// RPC failure, including a closed subscription
    #[error(transparent)]
    Chain(#[from] ChainCommunicationError),
    /// Failed to read the cursor
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Every listen attempt failed
    #[error("event listener gave up after {attempts} attempts: {last}")]
    BackoffExhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the last attempt
        last: Box<ListenerError>,
    },
}

/// Position of a log on its chain, logs are delivered in increasing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct LogPosition {
    block: u64,
    index: U256,
}

impl LogPosition {
    fn of(log: &Log) -> Option<Self> {
        Some(Self {
            block: log.block_number?.as_u64(),
            index: log.log_index?,
        })
    }
}

/// Replays historical logs from the persisted cursor, then follows the live
/// subscription. Failed attempts are retried with exponential backoff.
pub struct EventListener {
    chain_id: u64,
    client: Arc<dyn ChainClient>,
    cursors: Arc<dyn CursorStore>,
    address: Address,
    topics: Vec<H256>,
    start_block: u64,
    conf: ListenerConf,
    restarts: IntCounter,
    cancel: CancellationToken,
    /// Last log handed to the consumer, survives reconnects
    delivered: Mutex<Option<LogPosition>>,
}

impl Debug for EventListener {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListener")
            .field("chain_id", &self.chain_id)
            .field("address", &self.address)
            .field("topics", &self.topics)
            .field("start_block", &self.start_block)
            .finish()
    }
}

impl EventListener {
    /// Listen for `topics` emitted by the bridge contract of `chain`
    pub fn new(
        chain: &ChainContext,
        cursors: Arc<dyn CursorStore>,
        topics: Vec<H256>,
        conf: ListenerConf,
        restarts: IntCounter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            chain_id: chain.chain_id,
            client: chain.client.clone(),
            cursors,
            address: chain.bridge_contract,
            topics,
            start_block: chain.bridge_block,
            conf,
            restarts,
            cancel,
            delivered: Mutex::new(None),
        }
    }

    /// Push matching logs into `sender` until the listener is cancelled, the
    /// receiver is dropped or the attempt budget is exhausted.
    #[instrument(skip_all, fields(chain_id = self.chain_id, contract = ?self.address))]
    pub async fn listen_events(&self, sender: mpsc::Sender<Log>) -> Result<(), ListenerError> {
        let sender = &sender;
        let result = backoff::exponential(
            self.conf.attempts,
            self.conf.timeout(),
            &self.cancel,
            |attempt| async move {
                let result = self.listen(sender).await;
                if let Err(err) = &result {
                    self.restarts.inc();
                    error!(attempt, error = %err, "failed to listen");
                }
                result
            },
        )
        .await;

        match result {
            Ok(()) | Err(BackoffError::Cancelled) => Ok(()),
            Err(BackoffError::Exhausted { attempts, last }) => Err(ListenerError::BackoffExhausted {
                attempts,
                last: Box::new(last),
            }),
        }
    }

    async fn listen(&self, sender: &mpsc::Sender<Log>) -> Result<(), ListenerError> {
        let resume = self.resume_block().await?;
        info!(resume, "start listening events");

        let mut caught_up = None;
        if resume > 0 {
            let head = self.client.latest_block_number().await?;
            if !self.read_events(sender, resume, head, resume).await? {
                return Ok(());
            }
            caught_up = Some(head);
        }

        info!("subscribe for events");
        let mut live = self.client.subscribe_logs(&self.filter()).await?;

        // blocks produced between reading the head and subscribing
        if let Some(head) = caught_up {
            let latest = self.client.latest_block_number().await?;
            if latest > head {
                debug!(from = head + 1, to = latest, "backfilling subscription gap");
                if !self.read_events(sender, head + 1, latest, resume).await? {
                    return Ok(());
                }
                caught_up = Some(latest);
            }
        }

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("unsubscribe from events");
                    return Ok(());
                }
                next = live.next() => next,
            };
            let log = match next {
                Some(log) => log?,
                None => return Err(ChainCommunicationError::SubscriptionClosed.into()),
            };
            let backfilled = match (LogPosition::of(&log), caught_up) {
                (Some(position), Some(head)) => position.block <= head,
                _ => false,
            };
            if backfilled {
                continue;
            }
            if !self.forward(sender, log, resume).await {
                return Ok(());
            }
        }
    }

    /// `max(deployment block, persisted cursor)`
    async fn resume_block(&self) -> Result<u64, ListenerError> {
        let cursor = self
            .cursors
            .get_cursor(self.chain_id, self.address)
            .await?;
        Ok(cursor.map_or(self.start_block, |cursor| {
            cursor.next_block.max(self.start_block)
        }))
    }

    /// Page through `[from, to]`. Returns `false` once the consumer is gone.
    async fn read_events(
        &self,
        sender: &mpsc::Sender<Log>,
        from: u64,
        to: u64,
        floor: u64,
    ) -> Result<bool, ListenerError> {
        info!(from, to, "start reading events");
        let mut start = from;
        while start <= to {
            let end = start.saturating_add(MAX_BLOCK_RANGE - 1).min(to);
            let logs = self
                .client
                .filter_logs(&self.filter().from_block(start).to_block(end))
                .await?;
            debug!(from = start, to = end, events = logs.len(), "filtered logs");
            for log in logs {
                if !self.forward(sender, log, floor).await {
                    return Ok(false);
                }
            }
            match end.checked_add(1) {
                Some(next) => start = next,
                None => break,
            }
        }
        info!("finish reading events");
        Ok(true)
    }

    /// Hand `log` to the consumer unless it was delivered before or lies
    /// below `floor`. Returns `false` once the consumer is gone.
    async fn forward(&self, sender: &mpsc::Sender<Log>, log: Log, floor: u64) -> bool {
        let Some(position) = LogPosition::of(&log) else {
            debug!("skipping log without block number or log index");
            return true;
        };
        if log.removed == Some(true) || position.block < floor {
            debug!(block = position.block, "skipping log");
            return true;
        }
        if matches!(*self.delivered.lock(), Some(delivered) if position <= delivered) {
            return true;
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = sender.send(log) => {
                if sent.is_ok() {
                    *self.delivered.lock() = Some(position);
                }
                sent.is_ok()
            }
        }
    }

    fn filter(&self) -> Filter {
        Filter::new()
            .address(self.address)
            .topic0(ValueOrArray::Array(
                self.topics.iter().copied().map(Some).collect(),
            ))
    }
}
