//! Entry point of the relayer agents.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing::{debug, info};

use bridge_base::Settings;
use relayer::agent::{run_agent, AgentKind};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "relayer", version, about = "Relays SuperBridge events between EVM chains")]
struct Cli {
    /// Config file, JSON, TOML or YAML by extension
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Relay `Msg` events to their destination chains
    #[command(visible_alias = "monitor")]
    Bridge,
    /// Store prices announced by `Pricer` events
    Pricer,
    /// Print version information
    Version,
}

fn git_rev() -> &'static str {
    option_env!("GIT_REV").unwrap_or("unknown")
}

async fn _main(config: Option<PathBuf>, kind: AgentKind) -> Result<()> {
    color_eyre::install()?;
    let settings = Settings::load(config.as_deref())?;
    settings.log.start_tracing()?;

    info!(
        agent = kind.name(),
        version = VERSION,
        git_rev = git_rev(),
        environment = %settings.environment,
        "starting relayer"
    );
    debug!(?settings, "loaded settings");

    run_agent(kind, settings).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let kind = match cli.command {
        Command::Bridge => AgentKind::Bridge,
        Command::Pricer => AgentKind::Pricer,
        Command::Version => {
            println!("relayer {VERSION} (git rev {})", git_rev());
            return Ok(());
        }
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(_main(cli.config, kind))
}
