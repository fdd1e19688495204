//! tally daemon: entry point for running the chain validator.
//!
//! Startup is environment-driven: every core option is required and the
//! process refuses to start without it. Exit code is 0 only after a clean
//! signal-driven shutdown.

use clap::Parser;
use std::path::PathBuf;

use tally_node::{NodeConfig, Validator};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tally-daemon", about = "Chain-tailing balance validator")]
struct Cli {
    /// Directory for the local block store and log streams.
    #[arg(long, env = "DATA_DIR")]
    data_dir: PathBuf,

    /// Base URL of the remote node.
    #[arg(long, env = "SERVER_ADDR")]
    server_addr: String,

    /// Maximum parallel block fetches.
    #[arg(long, env = "BLOCK_CONCURRENCY")]
    block_concurrency: usize,

    /// Maximum parallel transaction fetches inside a block.
    #[arg(long, env = "TRANSACTION_CONCURRENCY")]
    transaction_concurrency: usize,

    /// Number of reconciler workers.
    #[arg(long, env = "ACCOUNT_CONCURRENCY")]
    account_concurrency: usize,

    /// Emit a log line per observed transaction.
    #[arg(long, env = "LOG_TRANSACTIONS", action = clap::ArgAction::Set)]
    log_transactions: bool,

    /// Emit per-block throughput log lines.
    #[arg(long, env = "LOG_BENCHMARKS", action = clap::ArgAction::Set)]
    log_benchmarks: bool,

    /// Blocks the local head must advance past a balance's block before it
    /// is compared against the remote node. Depth 0 assumes the source is
    /// deterministic at equal height.
    #[arg(long, env = "RECONCILE_SAFETY_DEPTH", default_value_t = 0)]
    safety_depth: i64,

    /// Refuse reorgs deeper than this many consecutive rollbacks.
    #[arg(long, env = "MAX_REORG_DEPTH", default_value_t = 64)]
    max_reorg_depth: u64,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = NodeConfig {
        data_dir: cli.data_dir,
        server_addr: cli.server_addr,
        block_concurrency: cli.block_concurrency,
        transaction_concurrency: cli.transaction_concurrency,
        account_concurrency: cli.account_concurrency,
        log_transactions: cli.log_transactions,
        log_benchmarks: cli.log_benchmarks,
        safety_depth: cli.safety_depth,
        max_reorg_depth: cli.max_reorg_depth,
    };

    tracing::info!(
        "starting validator against {} with data dir {}",
        config.server_addr,
        config.data_dir.display(),
    );

    Validator::new(config)?.run().await?;

    tracing::info!("tally daemon exited cleanly");
    Ok(())
}
