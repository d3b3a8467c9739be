#![allow(clippy::enum_variant_names)]
#![allow(missing_docs)]

use ethers::abi::{self, ParamType, RawLog, Token};
use ethers::contract::{abigen, EthEvent, EthLogDecode};
use ethers::core::abi::AbiEncode;

use bridge_core::{
    Address, BridgeCodec, BridgeMessage, BridgeProtocolError, Bytes, Log, PriceData, PriceUpdate,
    H256,
};

abigen!(SuperBridge, "$CARGO_MANIFEST_DIR/abis/SuperBridge.abi.json");

/// ABI codec of the SuperBridge contract
#[derive(Debug, Default, Clone, Copy)]
pub struct SuperBridgeCodec;

fn decode_event<E: EthEvent + EthLogDecode>(
    log: &Log,
    name: &'static str,
) -> Result<E, BridgeProtocolError> {
    let topic = log.topics.first().ok_or(BridgeProtocolError::AnonymousEvent)?;
    if *topic != E::signature() {
        return Err(BridgeProtocolError::UnknownTopic(*topic));
    }
    let raw = RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    };
    <E as EthLogDecode>::decode_log(&raw).map_err(|e| BridgeProtocolError::Decode {
        event: name,
        reason: e.to_string(),
    })
}

impl BridgeCodec for SuperBridgeCodec {
    fn msg_topic(&self) -> H256 {
        MsgFilter::signature()
    }

    fn pricer_topic(&self) -> H256 {
        PricerFilter::signature()
    }

    fn decode_msg(&self, log: &Log) -> Result<BridgeMessage, BridgeProtocolError> {
        let event: MsgFilter = decode_event(log, "Msg")?;
        Ok(BridgeMessage {
            destination_chain_id: event.destination_chain_id,
            destination_contract: event.destination_contract,
            data: event.data,
        })
    }

    fn decode_pricer(&self, log: &Log) -> Result<PriceUpdate, BridgeProtocolError> {
        let event: PricerFilter = decode_event(log, "Pricer")?;
        Ok(PriceUpdate {
            destination_chain_id: event.destination_chain_id,
            destination_contract: event.destination_contract,
            data: event.data,
        })
    }

    fn decode_price_data(&self, data: &[u8]) -> Result<PriceData, BridgeProtocolError> {
        let invalid = |reason: String| BridgeProtocolError::Decode {
            event: "PriceData",
            reason,
        };
        let tokens = abi::decode(
            &[
                ParamType::Address,
                ParamType::Uint(256),
                ParamType::Address,
                ParamType::Uint(256),
            ],
            data,
        )
        .map_err(|e| invalid(e.to_string()))?;

        match tokens.as_slice() {
            [Token::Address(asset), Token::Uint(asset_price), Token::Address(share), Token::Uint(share_price)] => {
                Ok(PriceData {
                    asset: *asset,
                    asset_price: *asset_price,
                    share: *share,
                    share_price: *share_price,
                })
            }
            _ => Err(invalid(format!("unexpected tokens {tokens:?}"))),
        }
    }

    fn encode_release(&self, addr: Address, data: Bytes) -> Bytes {
        ReleaseCall { addr, data }.encode().into()
    }
}
