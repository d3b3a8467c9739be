use std::sync::Arc;

use async_trait::async_trait;
use derive_new::new;
use tracing::info;

use bridge_core::{BridgeCodec, BridgeProtocolError, Log, PriceRecord, PriceStore, H256};

use super::{chain_id_from, event_topic, EventHandler, ProcessorError};

/// Stores the prices announced by `Pricer` events, keyed by destination
/// chain and vault. Replays overwrite the record with the same values.
#[derive(Debug, new)]
pub struct PricerHandler {
    codec: Arc<dyn BridgeCodec>,
    prices: Arc<dyn PriceStore>,
}

#[async_trait]
impl EventHandler for PricerHandler {
    fn kind(&self) -> &'static str {
        "pricer"
    }

    fn topics(&self) -> Vec<H256> {
        vec![self.codec.pricer_topic()]
    }

    async fn handle(&self, log: &Log) -> Result<(), ProcessorError> {
        let topic = event_topic(log)?;
        if topic != self.codec.pricer_topic() {
            return Err(BridgeProtocolError::UnknownTopic(topic).into());
        }
        let update = self.codec.decode_pricer(log)?;
        let data = self.codec.decode_price_data(&update.data)?;
        let chain_id = chain_id_from(update.destination_chain_id)
            .ok_or(ProcessorError::InvalidChainId(update.destination_chain_id))?;

        info!(
            chain_id,
            asset = ?data.asset,
            asset_price = %data.asset_price,
            vault = ?data.share,
            share_price = %data.share_price,
            "handling pricer"
        );
        let price = PriceRecord::new(
            chain_id,
            data.asset,
            data.share,
            data.asset_price,
            data.share_price,
        );
        self.prices.upsert_price(&price).await?;
        Ok(())
    }
}
