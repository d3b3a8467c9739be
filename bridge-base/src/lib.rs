//! This crate contains the shared infrastructure of the relayer agents:
//! settings, tracing, metrics, the health server and the store backends.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use db::*;
pub use memory::MemoryStore;
pub use metrics::CoreMetrics;
pub use server::Server;
pub use settings::*;
pub use stores::Stores;

/// rocksdb backed stores
pub mod db;
mod memory;
mod metrics;
mod server;
pub mod settings;
mod stores;
