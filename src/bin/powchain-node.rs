#![forbid(unsafe_code)]
//! powchain node: opens the chain store and optionally mines on it.

use clap::Parser;
use powchain::config::{load_config, validate};
use powchain::node::Node;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "powchain-node", version, about = "Proof-of-work chain node")]
struct Args {
    /// TOML configuration file; defaults are used when it does not exist
    #[arg(short, long, default_value = "powchain.toml")]
    config: PathBuf,

    /// Enable mining regardless of the configuration file
    #[arg(long)]
    mine: bool,

    /// Mining threads (0 = all processors, negative = none)
    #[arg(long, allow_hyphen_values = true)]
    threads: Option<i32>,

    /// Hex-encoded coinbase address
    #[arg(long)]
    coinbase: Option<String>,

    /// Keep the chain in memory only
    #[arg(long)]
    in_memory: bool,
}

fn main() {
    let filter = std::env::var("POWCHAIN_LOG").unwrap_or_else(|_| std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Err(e) = run(Args::parse()) {
        error!("Node failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> powchain::error::Result<()> {
    let mut config = load_config(&args.config)?;
    if args.mine {
        config.miner.enabled = true;
    }
    if let Some(threads) = args.threads {
        config.miner.threads = threads;
    }
    if let Some(coinbase) = args.coinbase {
        config.miner.coinbase = coinbase;
    }
    if args.in_memory {
        config.database.in_memory = true;
    }
    validate(&config)?;

    info!(config = %args.config.display(), "Starting powchain node");
    let node = Node::init(config)?;
    node.start()?;
    node.run();
    node.shutdown();
    Ok(())
}
