use eyre::Result;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    prelude::*,
    Layer, Registry,
};

/// Log line layout
#[derive(Debug, Clone, Copy, Default, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    /// Multi-line, human readable
    Pretty,
    /// One JSON object per line
    Json,
    /// Abbreviated single line
    Compact,
    /// Single line with span context
    #[serde(other)]
    #[default]
    Full,
}

impl Style {
    fn layer(self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = tracing_subscriber::fmt::layer().with_target(true);
        match self {
            Style::Pretty => layer.pretty().boxed(),
            Style::Json => layer.json().boxed(),
            Style::Compact => layer.compact().boxed(),
            Style::Full => layer.boxed(),
        }
    }
}

/// Verbosity, ordered from quietest to noisiest
#[derive(Default, Debug, Clone, Copy, serde::Deserialize, PartialOrd, Ord, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// No output
    Off = 0,
    /// Failures only
    Error = 1,
    /// Failures and recoverable problems
    Warn = 2,
    /// Per request detail
    Debug = 4,
    /// Everything, including dependency internals
    Trace = 5,
    /// Lifecycle of events and transactions
    #[serde(other)]
    #[default]
    Info = 3,
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> LevelFilter {
        match level {
            Level::Off => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Info => LevelFilter::INFO,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
        }
    }
}

/// Noisy dependencies, capped at info unless tracing everything
const QUIET_TARGETS: [&str; 5] = [
    "hyper",
    "reqwest",
    "rusoto_core",
    "tungstenite",
    "tokio_tungstenite",
];

/// Configuration for the tracing subscriber installed by the relayer
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct TracingConfig {
    #[serde(default)]
    fmt: Style,
    #[serde(default)]
    level: Level,
}

impl TracingConfig {
    /// Install the global subscriber. Fails if one is already installed.
    pub fn start_tracing(&self) -> Result<()> {
        let mut targets = Targets::new().with_default(self.level);
        if self.level < Level::Trace {
            for target in QUIET_TARGETS {
                targets = targets.with_target(target, Level::Info);
            }
        }

        Registry::default()
            .with(self.fmt.layer())
            .with(targets)
            .with(tracing_error::ErrorLayer::default())
            .try_init()?;
        Ok(())
    }
}
