//! Settings and configuration for relayer agents
//!
//! ## Introduction
//!
//! Every agent shares one configuration: the chains it connects to with the
//! bridge contract deployed on each of them, the signing key, the store
//! backend and the tunables of the listeners and the transaction manager.
//! On bootup, the agent loads the configuration, establishes RPC
//! connections, and passes the resulting values to the components it starts.
//!
//! ### Configuration
//!
//! Agents read settings from an optional config file (`-c <path>`, format
//! picked by extension) and from the environment.
//!
//! #### N.B.: Environment variable names correspond 1:1 with the config file's object hierarchy.
//!
//! Variables prefixed with `RELAYER_` override the file, with `__` separating
//! nesting levels. For example, if the config file is:
//!
//! ```json
//! {
//!   "log": { "level": "info" },
//!   "chains": {
//!     "sepolia": {
//!       "rpc": "wss://...",
//!       "chain_id": 11155111,
//!       "contracts": { "bridge_contract": "0x...", "bridge_block": 5000000 }
//!     }
//!   }
//! }
//! ```
//!
//! then `RELAYER_CHAINS__SEPOLIA__CONTRACTS__BRIDGE_BLOCK=5100000` moves the
//! deployment block of that chain.
//!
//! ### Configuration value precedence
//!
//! 1. The config file.
//! 2. Environment variables with the `RELAYER_` prefix.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use config::{Config, Environment, File};
use eyre::{bail, eyre, Context, Result};
use futures::future::try_join_all;
use tracing::info;
use url::Url;

use bridge_core::{Address, ChainContext};
use bridge_ethereum::{ChainSigners, EthereumClient};

pub use signers::*;
pub use trace::*;

use crate::{MemoryStore, RocksStore, Stores, DB};

mod signers;
mod trace;

const ENV_PREFIX: &str = "RELAYER";

/// Settings shared by every relayer agent
#[derive(Debug, serde::Deserialize)]
pub struct Settings {
    /// Logging configuration
    #[serde(default)]
    pub log: TracingConfig,
    /// Deployment environment name, reported in the startup logs
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Explicit signer configuration
    #[serde(default)]
    pub signer: Option<SignerConf>,
    /// Shorthand for a `hex_key` signer
    #[serde(default)]
    pub private_key: Option<HexKey>,
    /// Shorthand for an `aws` signer, takes precedence over `private_key`
    #[serde(default)]
    pub kms_private_key_id: Option<String>,
    /// Region of `kms_private_key_id`
    #[serde(default)]
    pub aws_region: Option<String>,
    /// Port of the `/health` and `/metrics` server
    #[serde(default = "default_healthcheck_server_port")]
    pub healthcheck_server_port: u16,
    /// Chains by name
    #[serde(default)]
    pub chains: HashMap<String, ChainConf>,
    /// Store backend
    #[serde(default)]
    pub db: DbConf,
    /// Event listener retry policy
    #[serde(default)]
    pub listener: ListenerConf,
    /// Transaction manager timing
    #[serde(default)]
    pub tx_manager: TxManagerSettings,
}

fn default_environment() -> String {
    "development".into()
}

fn default_healthcheck_server_port() -> u16 {
    6060
}

/// Connection and contract data of one chain
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChainConf {
    /// Name of the chain, defaults to its key in `chains`
    #[serde(default)]
    pub name: String,
    /// Websocket RPC endpoint
    pub rpc: Url,
    /// EVM chain id
    pub chain_id: u64,
    /// Bridge deployment
    pub contracts: ContractsConf,
}

/// Addresses of the contracts the relayer watches on a chain
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ContractsConf {
    /// SuperBridge address
    pub bridge_contract: Address,
    /// Block the SuperBridge was deployed at, where catch-up starts
    #[serde(default)]
    pub bridge_block: u64,
}

/// Store backend selection
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum DbConf {
    /// Process local maps, nothing survives a restart
    #[default]
    Memory,
    /// rocksdb database at `path`
    Rocksdb {
        /// Database directory
        path: PathBuf,
    },
}

/// Retry policy of the event listeners
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct ListenerConf {
    /// Listen attempts before the listener gives up
    #[serde(default = "default_listener_attempts")]
    pub attempts: u32,
    /// Delay after the first failed attempt, doubled after every failure
    #[serde(default = "default_listener_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_listener_attempts() -> u32 {
    3
}

fn default_listener_timeout_secs() -> u64 {
    15
}

impl Default for ListenerConf {
    fn default() -> Self {
        Self {
            attempts: default_listener_attempts(),
            timeout_secs: default_listener_timeout_secs(),
        }
    }
}

impl ListenerConf {
    /// Initial backoff delay
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Timing of the transaction manager
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct TxManagerSettings {
    /// How long a broadcast attempt waits for a receipt before the gas
    /// price is bumped
    #[serde(default = "default_bump_interval_secs")]
    pub bump_interval_secs: u64,
    /// Receipt polling interval
    #[serde(default = "default_block_time_secs")]
    pub block_time_secs: u64,
}

fn default_bump_interval_secs() -> u64 {
    36
}

fn default_block_time_secs() -> u64 {
    12
}

impl Default for TxManagerSettings {
    fn default() -> Self {
        Self {
            bump_interval_secs: default_bump_interval_secs(),
            block_time_secs: default_block_time_secs(),
        }
    }
}

impl Settings {
    /// Read the settings from `path` (if any) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read relayer configuration")?
            .try_deserialize()
            .context("invalid relayer configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            bail!("no chains configured");
        }
        let mut seen = HashMap::new();
        for (name, chain) in &self.chains {
            if let Some(other) = seen.insert(chain.chain_id, name) {
                bail!(
                    "chains {other} and {name} are both configured with chain id {}",
                    chain.chain_id
                );
            }
        }
        if self.listener.attempts == 0 {
            bail!("listener.attempts must be at least 1");
        }
        Ok(())
    }

    /// Ids of all configured chains
    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids = self
            .chains
            .values()
            .map(|chain| chain.chain_id)
            .collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }

    /// Signer to use: the explicit `signer` section, else a KMS key id, else
    /// a local private key
    pub fn signer_conf(&self) -> Result<SignerConf> {
        if let Some(signer) = &self.signer {
            return Ok(signer.clone());
        }
        if let Some(id) = &self.kms_private_key_id {
            return Ok(SignerConf::Aws {
                id: id.clone(),
                region: self
                    .aws_region
                    .clone()
                    .unwrap_or_else(|| DEFAULT_AWS_REGION.into()),
            });
        }
        self.private_key
            .clone()
            .map(|key| SignerConf::HexKey { key })
            .ok_or_else(|| eyre!("no signer configured, set private_key or kms_private_key_id"))
    }

    /// Build a signer for every configured chain
    pub async fn build_signers(&self) -> Result<ChainSigners> {
        self.signer_conf()?
            .build_chain_signers(self.chain_ids())
            .await
    }

    /// Connect to every configured chain
    pub async fn build_chains(&self) -> Result<HashMap<u64, ChainContext>> {
        let chains = try_join_all(self.chains.iter().map(|(key, conf)| async move {
            let name = if conf.name.is_empty() {
                key.clone()
            } else {
                conf.name.clone()
            };
            let client = EthereumClient::connect(&conf.rpc, conf.chain_id)
                .await
                .with_context(|| format!("failed to connect to chain {name}"))?;
            Ok::<_, eyre::Report>(ChainContext {
                name,
                chain_id: conf.chain_id,
                client: Arc::new(client),
                bridge_contract: conf.contracts.bridge_contract,
                bridge_block: conf.contracts.bridge_block,
            })
        }))
        .await?;
        Ok(chains
            .into_iter()
            .map(|chain| (chain.chain_id, chain))
            .collect())
    }

    /// Open the configured store backend
    pub fn build_stores(&self, agent_name: &str) -> Result<Stores> {
        match &self.db {
            DbConf::Memory => {
                info!("using in-memory stores, state is lost on restart");
                Ok(MemoryStore::default().into())
            }
            DbConf::Rocksdb { path } => {
                let db = DB::from_path(path).context("failed to open database")?;
                Ok(RocksStore::new(agent_name, db).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const CONFIG: &str = r#"{
        "log": { "fmt": "json", "level": "debug" },
        "private_key": "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
        "chains": {
            "one": {
                "rpc": "ws://localhost:8546",
                "chain_id": 1,
                "contracts": {
                    "bridge_contract": "0x00000000000000000000000000000000000000aa",
                    "bridge_block": 10
                }
            },
            "two": {
                "name": "Chain Two",
                "rpc": "ws://localhost:9546",
                "chain_id": 2,
                "contracts": {
                    "bridge_contract": "0x00000000000000000000000000000000000000bb"
                }
            }
        },
        "db": { "backend": "rocksdb", "path": "/tmp/relayer" }
    }"#;

    #[test]
    fn loads_file_with_defaults() {
        let file = write_config(CONFIG);
        let settings = Settings::load(Some(file.path())).unwrap();

        assert_eq!(settings.environment, "development");
        assert_eq!(settings.healthcheck_server_port, 6060);
        assert_eq!(settings.chain_ids(), vec![1, 2]);
        assert_eq!(settings.chains["one"].contracts.bridge_block, 10);
        assert_eq!(settings.chains["two"].contracts.bridge_block, 0);
        assert_eq!(settings.listener.attempts, 3);
        assert_eq!(settings.listener.timeout(), Duration::from_secs(15));
        assert_eq!(settings.tx_manager.bump_interval_secs, 36);
        assert!(matches!(settings.db, DbConf::Rocksdb { .. }));
        assert!(matches!(
            settings.signer_conf().unwrap(),
            SignerConf::HexKey { .. }
        ));
    }

    #[test]
    fn kms_key_takes_precedence_over_local_key() {
        let mut settings: Settings = serde_json::from_str(CONFIG).unwrap();
        settings.kms_private_key_id = Some("alias/relayer".into());

        match settings.signer_conf().unwrap() {
            SignerConf::Aws { id, region } => {
                assert_eq!(id, "alias/relayer");
                assert_eq!(region, DEFAULT_AWS_REGION);
            }
            other => panic!("unexpected signer {other:?}"),
        }

        settings.kms_private_key_id = None;
        settings.private_key = None;
        assert!(settings.signer_conf().is_err());
    }

    #[test]
    fn rejects_duplicate_chain_ids() {
        let file = write_config(&CONFIG.replace("\"chain_id\": 2", "\"chain_id\": 1"));
        let err = Settings::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("chain id 1"));
    }

    #[test]
    fn debug_output_hides_private_key() {
        let settings: Settings = serde_json::from_str(CONFIG).unwrap();
        let printed = format!("{settings:?}");
        assert!(!printed.contains("4c0883a6"));
    }
}
