use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use prometheus::{
    labels, opts, register_int_counter_vec_with_registry, register_int_gauge_vec_with_registry,
    Encoder, IntCounterVec, IntGaugeVec, Registry,
};

const NAMESPACE: &str = "relayer";

/// Macro to prefix a string with the namespace.
macro_rules! namespaced {
    ($name:expr) => {
        format!("{}_{}", NAMESPACE, $name)
    };
}

/// Metrics shared by the relayer agents
pub struct CoreMetrics {
    /// Metrics registry for adding new metrics and gathering reports
    registry: Registry,
    agent_name: String,

    transactions: IntCounterVec,
    transaction_broadcasts: IntCounterVec,
    events: IntCounterVec,
    cursor_block: IntGaugeVec,
    listener_restarts: IntCounterVec,
}

impl CoreMetrics {
    /// Track metrics for a particular agent name.
    ///
    /// - `for_agent` name of the agent these metrics are tracking.
    /// - `registry` prometheus registry to attach the metrics to
    pub fn new(for_agent: &str, registry: Registry) -> prometheus::Result<Self> {
        let const_labels: HashMap<String, String> = labels! {
            namespaced!("version") => env!("CARGO_PKG_VERSION").into(),
            "agent".into() => for_agent.into(),
        };
        let const_labels_ref = const_labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect::<HashMap<_, _>>();

        let transactions = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("transactions_total"),
                "Transaction records that reached a final status",
                const_labels_ref
            ),
            &["chain", "status"],
            registry
        )?;

        let transaction_broadcasts = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("transaction_broadcasts_total"),
                "Signed transactions handed to a node, gas bumps included",
                const_labels_ref
            ),
            &["chain"],
            registry
        )?;

        let events = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("events_total"),
                "Bridge contract events seen by a processor, by outcome",
                const_labels_ref
            ),
            &["chain", "processor", "outcome"],
            registry
        )?;

        let cursor_block = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced!("cursor_block"),
                "Next unprocessed block of a processor",
                const_labels_ref
            ),
            &["chain", "processor"],
            registry
        )?;

        let listener_restarts = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("listener_restarts_total"),
                "Failed listen attempts that were retried with backoff",
                const_labels_ref
            ),
            &["chain", "processor"],
            registry
        )?;

        Ok(Self {
            registry,
            agent_name: for_agent.into(),
            transactions,
            transaction_broadcasts,
            events,
            cursor_block,
            listener_restarts,
        })
    }

    /// Name of the agent
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Transaction records by chain and final status.
    ///
    /// Labels:
    /// - `chain`: chain id.
    /// - `status`: final status of the record.
    pub fn transactions(&self) -> IntCounterVec {
        self.transactions.clone()
    }

    /// Broadcast attempts by chain.
    pub fn transaction_broadcasts(&self) -> IntCounterVec {
        self.transaction_broadcasts.clone()
    }

    /// Events by chain, processor and outcome (`handled` or `failed`).
    pub fn events(&self) -> IntCounterVec {
        self.events.clone()
    }

    /// Cursor position by chain and processor.
    pub fn cursor_block(&self) -> IntGaugeVec {
        self.cursor_block.clone()
    }

    /// Listener attempts that failed and were retried.
    pub fn listener_restarts(&self) -> IntCounterVec {
        self.listener_restarts.clone()
    }

    /// Gather available metrics into an encoded (plaintext, OpenMetrics
    /// format) report.
    pub fn gather(&self) -> prometheus::Result<Vec<u8>> {
        let collected_metrics = self.registry.gather();
        let mut out_buf = Vec::with_capacity(1024 * 64);
        let encoder = prometheus::TextEncoder::new();
        encoder.encode(&collected_metrics, &mut out_buf)?;
        Ok(out_buf)
    }
}

impl Debug for CoreMetrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CoreMetrics {{ agent_name: {} }}", self.agent_name)
    }
}
