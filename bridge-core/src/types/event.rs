use crate::{Address, Bytes, U256};

/// `Msg(uint256 indexed destinationChainId, address indexed destinationContract, bytes data)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeMessage {
    /// Chain the payload must be released on
    pub destination_chain_id: U256,
    /// Contract receiving the payload
    pub destination_contract: Address,
    /// Opaque payload
    pub data: Bytes,
}

/// `Pricer(uint256 indexed destinationChainId, address indexed destinationContract, bytes data)`
///
/// `data` is an ABI encoded [`PriceData`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceUpdate {
    /// Chain the price is reported for
    pub destination_chain_id: U256,
    /// Contract that requested the price
    pub destination_contract: Address,
    /// ABI encoded `(address,uint256,address,uint256)`
    pub data: Bytes,
}

/// Decoded payload of a [`PriceUpdate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceData {
    /// Underlying asset
    pub asset: Address,
    /// Asset price
    pub asset_price: U256,
    /// Vault share token
    pub share: Address,
    /// Share price
    pub share_price: U256,
}
