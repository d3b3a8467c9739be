//! Wiring of the `bridge` and `pricer` agents.

use std::collections::HashMap;
use std::sync::Arc;

use eyre::{Result, WrapErr};
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bridge_base::{CoreMetrics, ListenerConf, Server, Settings, Stores};
use bridge_core::{BridgeCodec, ChainClient, ChainContext};
use bridge_ethereum::SuperBridgeCodec;

use crate::monitor::Monitor;
use crate::processor::{BridgeHandler, ChainProcessor, PricerHandler, Processor};
use crate::tx_manager::{TxManager, TxManagerConf};

/// The pipelines the binary can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    /// Relay `Msg` events through the transaction manager
    Bridge,
    /// Store `Pricer` updates
    Pricer,
}

impl AgentKind {
    /// Agent name, used for metrics and store namespaces
    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::Bridge => "bridge",
            AgentKind::Pricer => "pricer",
        }
    }
}

/// One bridge processor per chain, all submitting through `tx_manager`
pub fn bridge_processors(
    chains: &HashMap<u64, ChainContext>,
    codec: Arc<dyn BridgeCodec>,
    stores: &Stores,
    tx_manager: Arc<TxManager>,
    listener_conf: ListenerConf,
    metrics: &CoreMetrics,
    shutdown: &CancellationToken,
) -> Vec<Arc<dyn Processor>> {
    let destinations = chains
        .iter()
        .map(|(chain_id, chain)| (*chain_id, chain.bridge_contract))
        .collect::<HashMap<_, _>>();
    chains
        .values()
        .map(|chain| {
            let handler =
                BridgeHandler::new(codec.clone(), destinations.clone(), tx_manager.clone());
            Arc::new(ChainProcessor::new(
                chain,
                handler,
                stores.cursors.clone(),
                listener_conf,
                metrics,
                shutdown,
            )) as Arc<dyn Processor>
        })
        .collect()
}

/// One pricer processor per chain
pub fn pricer_processors(
    chains: &HashMap<u64, ChainContext>,
    codec: Arc<dyn BridgeCodec>,
    stores: &Stores,
    listener_conf: ListenerConf,
    metrics: &CoreMetrics,
    shutdown: &CancellationToken,
) -> Vec<Arc<dyn Processor>> {
    chains
        .values()
        .map(|chain| {
            let handler = PricerHandler::new(codec.clone(), stores.prices.clone());
            Arc::new(ChainProcessor::new(
                chain,
                handler,
                stores.cursors.clone(),
                listener_conf,
                metrics,
                shutdown,
            )) as Arc<dyn Processor>
        })
        .collect()
}

/// Run an agent until ctrl-c or until a processor fails
pub async fn run_agent(kind: AgentKind, settings: Settings) -> Result<()> {
    let metrics = Arc::new(CoreMetrics::new(kind.name(), Registry::new())?);
    let mut server = Arc::new(Server::new(
        settings.healthcheck_server_port,
        metrics.clone(),
    ))
    .run();

    let chains = settings.build_chains().await?;
    let stores = settings.build_stores(kind.name())?;
    let codec: Arc<dyn BridgeCodec> = Arc::new(SuperBridgeCodec);
    let shutdown = CancellationToken::new();

    let (processors, tx_manager) = match kind {
        AgentKind::Bridge => {
            let signers = settings
                .build_signers()
                .await
                .wrap_err("failed to build signers")?;
            let clients = chains
                .iter()
                .map(|(chain_id, chain)| (*chain_id, chain.client.clone()))
                .collect::<HashMap<u64, Arc<dyn ChainClient>>>();
            let tx_manager = Arc::new(TxManager::new(
                clients,
                Arc::new(signers),
                stores.txs.clone(),
                TxManagerConf::from(&settings.tx_manager),
                &metrics,
            ));
            let processors = bridge_processors(
                &chains,
                codec,
                &stores,
                tx_manager.clone(),
                settings.listener,
                &metrics,
                &shutdown,
            );
            (processors, Some(tx_manager))
        }
        AgentKind::Pricer => {
            let processors = pricer_processors(
                &chains,
                codec,
                &stores,
                settings.listener,
                &metrics,
                &shutdown,
            );
            (processors, None)
        }
    };

    if let Some(tx_manager) = &tx_manager {
        tx_manager.start();
    }
    let monitor = Arc::new(Monitor::new(processors));
    let running = tokio::spawn({
        let monitor = monitor.clone();
        async move { monitor.start().await }
    });

    let mut server_failure = None;
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.wrap_err("failed to listen for ctrl-c")?;
            info!("received ctrl-c, shutting down");
        }
        _ = shutdown.cancelled() => warn!("a processor failed, shutting down"),
        served = &mut server => {
            server_failure = Some(match served {
                Ok(Ok(())) => eyre::eyre!("health server exited"),
                Ok(Err(err)) => err,
                Err(err) => err.into(),
            });
        }
    }

    monitor.stop();
    let stopped = running.await;
    if let Some(tx_manager) = tx_manager {
        tx_manager.stop().await;
    }
    server.abort();
    info!(agent = kind.name(), "agent stopped");

    stopped.wrap_err("monitor task failed")??;
    match server_failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
