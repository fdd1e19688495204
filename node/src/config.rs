//! Validator configuration.

use std::path::PathBuf;

use crate::NodeError;

/// Configuration for a validator process. Every field maps onto one of the
/// required startup environment variables; the daemon performs the actual
/// parsing and refuses to start when a required value is missing.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Directory for the local block store and the event log streams.
    pub data_dir: PathBuf,

    /// Base URL of the remote node.
    pub server_addr: String,

    /// Maximum parallel block fetches against the remote node.
    pub block_concurrency: usize,

    /// Maximum parallel transaction fetches within one block.
    pub transaction_concurrency: usize,

    /// Number of reconciler workers.
    pub account_concurrency: usize,

    /// Emit a log line per observed transaction.
    pub log_transactions: bool,

    /// Emit per-block throughput log lines.
    pub log_benchmarks: bool,

    /// How many blocks past a balance's block the local head must reach
    /// before that balance is compared against the remote node. Depth 0
    /// compares as soon as the local chain contains the block, which assumes
    /// the source answers deterministically at equal height.
    pub safety_depth: i64,

    /// Upper bound on consecutive single-block rollbacks. A source that
    /// forces a deeper reorg is treated as faulty and the process exits.
    pub max_reorg_depth: u64,
}

impl NodeConfig {
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.server_addr.is_empty() {
            return Err(NodeError::Config("server address must not be empty".into()));
        }
        for (name, value) in [
            ("block concurrency", self.block_concurrency),
            ("transaction concurrency", self.transaction_concurrency),
            ("account concurrency", self.account_concurrency),
        ] {
            if value == 0 {
                return Err(NodeError::Config(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tally_data"),
            server_addr: "http://localhost:8080".to_string(),
            block_concurrency: 8,
            transaction_concurrency: 16,
            account_concurrency: 8,
            log_transactions: false,
            log_benchmarks: false,
            safety_depth: 0,
            max_reorg_depth: 64,
        }
    }
}
