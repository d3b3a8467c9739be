//! The relayer watches the SuperBridge contract on every configured chain.
//! `Msg` events are relayed as `release` calls on their destination chain
//! through a nonce-safe transaction manager, `Pricer` events are stored as
//! vault prices.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod agent;
pub mod backoff;
pub mod listener;
pub mod monitor;
pub mod processor;
pub mod tx_manager;
