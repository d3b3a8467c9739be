//! Per-chain pipelines turning bridge contract events into side effects.
//!
//! A [`ChainProcessor`] owns one [`EventListener`] and feeds every log it
//! yields to an [`EventHandler`]. The cursor only moves after the handler
//! returned successfully, so a crash in between replays the event: handlers
//! must tolerate seeing the same event twice.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use prometheus::{IntCounter, IntGauge};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use bridge_base::{CoreMetrics, ListenerConf};
use bridge_core::{
    Address, BlockCursor, BridgeProtocolError, ChainContext, CursorStore, Log, StoreError, H256,
    U256,
};

pub use bridge::*;
pub use pricer::*;

use crate::listener::{EventListener, ListenerError};
use crate::tx_manager::TxManagerError;

mod bridge;
mod pricer;

/// Logs buffered between the listener and the handler
const EVENT_BUFFER: usize = 32;

/// Errors raised while handling a single event, or by the listener feeding
/// a processor
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// `Msg` event for a chain without configuration
    #[error("destination chain ({0}) not found in config")]
    UnknownDestination(U256),
    /// Chain id larger than 64 bits
    #[error("invalid chain id {0}")]
    InvalidChainId(U256),
    /// The release transaction ended `Errored`
    #[error("failed to process tx, msg={0}")]
    TxErrored(String),
    /// The release transaction was mined but reverted
    #[error("tx failed")]
    TxFailed,
    /// Undecodable or unexpected log
    #[error(transparent)]
    Protocol(#[from] BridgeProtocolError),
    /// Submission failure
    #[error(transparent)]
    TxManager(#[from] TxManagerError),
    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The listener gave up
    #[error(transparent)]
    Listener(#[from] ListenerError),
    /// A processor task panicked
    #[error("processor task failed: {0}")]
    Join(#[from] JoinError),
}

/// A unit of work started and stopped by the [`Monitor`](crate::monitor::Monitor)
#[async_trait]
pub trait Processor: Send + Sync + Debug {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Run until stopped. Returns an error if the processor can no longer
    /// make progress.
    async fn start(&self) -> Result<(), ProcessorError>;

    /// Ask a running `start` to return
    fn stop(&self);
}

/// Turns one decoded log into a side effect
#[async_trait]
pub trait EventHandler: Send + Sync + Debug {
    /// Short label for logs and metrics, e.g. `bridge`
    fn kind(&self) -> &'static str;

    /// Event signatures the listener subscribes to
    fn topics(&self) -> Vec<H256>;

    /// Handle one log. Must be safe to call twice for the same log.
    async fn handle(&self, log: &Log) -> Result<(), ProcessorError>;
}

/// Narrow a chain id carried by an event
pub(crate) fn chain_id_from(value: U256) -> Option<u64> {
    (value <= U256::from(u64::MAX)).then(|| value.as_u64())
}

/// Topic of a log, which also rules out anonymous events
pub(crate) fn event_topic(log: &Log) -> Result<H256, BridgeProtocolError> {
    log.topics
        .first()
        .copied()
        .ok_or(BridgeProtocolError::AnonymousEvent)
}

struct ProcessorMetrics {
    handled: IntCounter,
    failed: IntCounter,
    cursor: IntGauge,
}

/// Listener, handler and cursor of one chain
pub struct ChainProcessor<H> {
    name: String,
    chain_id: u64,
    contract: Address,
    handler: H,
    listener: EventListener,
    cursors: Arc<dyn CursorStore>,
    metrics: ProcessorMetrics,
    cancel: CancellationToken,
    shutdown: CancellationToken,
}

impl<H: Debug> Debug for ChainProcessor<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainProcessor")
            .field("name", &self.name)
            .field("handler", &self.handler)
            .field("listener", &self.listener)
            .finish()
    }
}

impl<H: EventHandler> ChainProcessor<H> {
    /// Process events of the bridge contract on `chain`. A listener that
    /// gives up cancels `shutdown`.
    pub fn new(
        chain: &ChainContext,
        handler: H,
        cursors: Arc<dyn CursorStore>,
        listener_conf: ListenerConf,
        metrics: &CoreMetrics,
        shutdown: &CancellationToken,
    ) -> Self {
        let cancel = shutdown.child_token();
        let chain_label = chain.chain_id.to_string();
        let kind = handler.kind();
        let listener = EventListener::new(
            chain,
            cursors.clone(),
            handler.topics(),
            listener_conf,
            metrics
                .listener_restarts()
                .with_label_values(&[chain_label.as_str(), kind]),
            cancel.clone(),
        );
        let events = metrics.events();
        Self {
            name: format!("{kind}:{}", chain.name),
            chain_id: chain.chain_id,
            contract: chain.bridge_contract,
            metrics: ProcessorMetrics {
                handled: events.with_label_values(&[chain_label.as_str(), kind, "handled"]),
                failed: events.with_label_values(&[chain_label.as_str(), kind, "failed"]),
                cursor: metrics
                    .cursor_block()
                    .with_label_values(&[chain_label.as_str(), kind]),
            },
            handler,
            listener,
            cursors,
            cancel,
            shutdown: shutdown.clone(),
        }
    }

    /// Handle one log and move the cursor past its block on success
    #[instrument(skip_all, fields(processor = %self.name, block = ?log.block_number, tx = ?log.transaction_hash))]
    pub async fn process_event(&self, log: Log) {
        let Some(block) = log.block_number.map(|block| block.as_u64()) else {
            warn!("skipping log without block number");
            return;
        };

        if let Err(err) = self.handler.handle(&log).await {
            self.metrics.failed.inc();
            error!(error = %err, "failed to process event");
            return;
        }
        self.metrics.handled.inc();

        // the next block, so a restart does not handle this block again
        let cursor = BlockCursor::after(self.chain_id, self.contract, block);
        match self.cursors.upsert_cursor(&cursor).await {
            Ok(()) => self
                .metrics
                .cursor
                .set(i64::try_from(cursor.next_block).unwrap_or(i64::MAX)),
            Err(err) => error!(error = %err, "failed to store last handled block"),
        }
    }

    async fn process_events(&self, mut receiver: mpsc::Receiver<Log>) {
        loop {
            let log = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                log = receiver.recv() => match log {
                    Some(log) => log,
                    None => break,
                },
            };
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = self.process_event(log) => {}
            }
        }
    }
}

#[async_trait]
impl<H: EventHandler> Processor for ChainProcessor<H> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), ProcessorError> {
        info!(processor = %self.name, "processor started");
        let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
        let (listened, ()) = tokio::join!(
            self.listener.listen_events(sender),
            self.process_events(receiver)
        );

        match listened {
            Ok(()) => {
                info!(processor = %self.name, "processor stopped");
                Ok(())
            }
            Err(err) => {
                error!(processor = %self.name, error = %err, "event listener failed, shutting down");
                self.shutdown.cancel();
                Err(err.into())
            }
        }
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}
