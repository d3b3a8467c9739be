//! Ethereum implementations of the relayer collaborators: the websocket
//! RPC client, the SuperBridge codec and the transaction signers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]

#[cfg(not(doctest))]
pub use bridge::*;
pub use client::*;
pub use error::*;
pub use signers::*;

/// SuperBridge abi
#[cfg(not(doctest))]
mod bridge;

mod client;
mod error;
mod signers;
