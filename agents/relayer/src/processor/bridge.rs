use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use derive_new::new;
use tracing::info;

use bridge_core::{Address, BridgeCodec, BridgeMessage, BridgeProtocolError, Log, TxStatus, H256};

use super::{chain_id_from, event_topic, EventHandler, ProcessorError};
use crate::tx_manager::TxManager;

/// Gas limit of `release` calls
pub const RELEASE_GAS_LIMIT: u64 = 900_000;

/// Relays `Msg` events by calling `release` on the destination chain's
/// bridge and waiting for the transaction to complete.
///
/// Handling the same event twice sends a second `release`; the bridge
/// contract is expected to deduplicate.
#[derive(Debug, new)]
pub struct BridgeHandler {
    codec: Arc<dyn BridgeCodec>,
    /// Bridge contract per configured chain id
    destinations: HashMap<u64, Address>,
    tx_manager: Arc<TxManager>,
}

impl BridgeHandler {
    async fn handle_msg(&self, msg: BridgeMessage) -> Result<(), ProcessorError> {
        info!(
            destination_chain_id = %msg.destination_chain_id,
            destination_contract = ?msg.destination_contract,
            data = %msg.data,
            "handling msg"
        );

        let (chain_id, bridge) = chain_id_from(msg.destination_chain_id)
            .and_then(|id| self.destinations.get(&id).map(|bridge| (id, *bridge)))
            .ok_or(ProcessorError::UnknownDestination(msg.destination_chain_id))?;

        let data = self
            .codec
            .encode_release(msg.destination_contract, msg.data);
        let id = self
            .tx_manager
            .send_tx_async(chain_id, bridge, data, RELEASE_GAS_LIMIT)
            .await?;
        let tx = self.tx_manager.wait_tx_completed(&id).await?;

        if tx.status == TxStatus::Errored {
            return Err(ProcessorError::TxErrored(tx.message.unwrap_or_default()));
        }
        if tx.reverted() {
            return Err(ProcessorError::TxFailed);
        }
        info!(%id, hash = ?tx.receipt.map(|receipt| receipt.transaction_hash), "tx completed");
        Ok(())
    }
}

#[async_trait]
impl EventHandler for BridgeHandler {
    fn kind(&self) -> &'static str {
        "bridge"
    }

    fn topics(&self) -> Vec<H256> {
        vec![self.codec.msg_topic()]
    }

    async fn handle(&self, log: &Log) -> Result<(), ProcessorError> {
        let topic = event_topic(log)?;
        if topic != self.codec.msg_topic() {
            return Err(BridgeProtocolError::UnknownTopic(topic).into());
        }
        let msg = self.codec.decode_msg(log)?;
        self.handle_msg(msg).await
    }
}
