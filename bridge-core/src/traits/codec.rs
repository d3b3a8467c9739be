use std::fmt::Debug;

use auto_impl::auto_impl;

use crate::{Address, BridgeMessage, BridgeProtocolError, Bytes, Log, PriceData, PriceUpdate, H256};

/// Typed encode/decode over the bridge contract interface.
#[auto_impl(&, Box, Arc)]
pub trait BridgeCodec: Send + Sync + Debug {
    /// Signature topic of `Msg`
    fn msg_topic(&self) -> H256;

    /// Signature topic of `Pricer`
    fn pricer_topic(&self) -> H256;

    /// Decode a `Msg` log
    fn decode_msg(&self, log: &Log) -> Result<BridgeMessage, BridgeProtocolError>;

    /// Decode a `Pricer` log
    fn decode_pricer(&self, log: &Log) -> Result<PriceUpdate, BridgeProtocolError>;

    /// Decode the payload carried by a `Pricer` event
    fn decode_price_data(&self, data: &[u8]) -> Result<PriceData, BridgeProtocolError>;

    /// Call data of `release(address addr, bytes data)`
    fn encode_release(&self, addr: Address, data: Bytes) -> Bytes;
}
