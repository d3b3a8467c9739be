pub use chain_client::MockChainClient;

mod chain_client;
