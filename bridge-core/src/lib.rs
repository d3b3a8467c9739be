//! This crate contains the domain types, errors and the narrow
//! collaborator traits shared by the cross-chain relayer.
//!
//! Nothing in here talks to a chain or a database directly; concrete
//! implementations live in `bridge-ethereum` and `bridge-base`.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use ethers_core::types::{
    Address, Bytes, Filter, Log, Signature, TransactionReceipt, TransactionRequest, H160, H256,
    U256, U64,
};
pub use ethers_core::types::transaction::eip2718::TypedTransaction;

pub use error::*;
pub use traits::*;
pub use types::*;

mod error;
mod traits;
mod types;
