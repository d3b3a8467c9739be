use std::collections::HashMap;

use ethers::abi::{self, Token};
use ethers::signers::{LocalWallet, Signer};

use bridge_core::{Address, Log, TransactionReceipt, H256, U256, U64};
use bridge_ethereum::{ChainSigners, Signers};

/// Well known development key, never use it on a live chain
pub const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

/// Address of [`TEST_KEY`]
pub fn test_address() -> Address {
    test_wallet().address()
}

fn test_wallet() -> LocalWallet {
    TEST_KEY.parse().unwrap()
}

/// Local signers of [`TEST_KEY`] for `chain_ids`
pub fn test_signers(chain_ids: &[u64]) -> ChainSigners {
    let signers = chain_ids
        .iter()
        .map(|chain_id| {
            let signer: Signers = test_wallet().with_chain_id(*chain_id).into();
            (*chain_id, signer)
        })
        .collect::<HashMap<_, _>>();
    ChainSigners::new(signers).unwrap()
}

/// A log emitted by the bridge contract with the `Msg`/`Pricer` layout
pub fn bridge_log(
    contract: Address,
    topic: H256,
    destination_chain_id: u64,
    destination_contract: Address,
    data: Vec<u8>,
    block_number: u64,
) -> Log {
    Log {
        address: contract,
        topics: vec![
            topic,
            H256::from_low_u64_be(destination_chain_id),
            destination_contract.into(),
        ],
        data: abi::encode(&[Token::Bytes(data)]).into(),
        block_number: Some(U64::from(block_number)),
        transaction_hash: Some(H256::from_low_u64_be(block_number)),
        log_index: Some(U256::zero()),
        ..Default::default()
    }
}

/// ABI encoded `(asset, asset_price, share, share_price)`
pub fn price_payload(asset: Address, asset_price: u64, share: Address, share_price: u64) -> Vec<u8> {
    abi::encode(&[
        Token::Address(asset),
        Token::Uint(asset_price.into()),
        Token::Address(share),
        Token::Uint(share_price.into()),
    ])
}

/// The first log of a block, for listener tests
pub fn log_at(block_number: u64) -> Log {
    Log {
        block_number: Some(U64::from(block_number)),
        transaction_hash: Some(H256::from_low_u64_be(block_number)),
        log_index: Some(U256::zero()),
        ..Default::default()
    }
}

/// Receipt of a mined transaction
pub fn receipt(hash: H256, success: bool) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: hash,
        block_number: Some(U64::from(100)),
        status: Some(if success { U64::one() } else { U64::zero() }),
        ..Default::default()
    }
}
