//! Append-only event streams under `<data_dir>/logs/`.
//!
//! Three files, one line per event: `transactions.log` (gated by
//! `LOG_TRANSACTIONS`), `reconciliations.log`, and `benchmarks.log` (gated
//! by `LOG_BENCHMARKS`). Process diagnostics stay on `tracing`; these files
//! are the validator's durable record of what it observed and concluded.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use tally_types::{AccountIdentifier, Block, BlockIdentifier, Currency};

pub struct EventLogger {
    transactions: Option<Mutex<File>>,
    reconciliations: Mutex<File>,
    benchmarks: Option<Mutex<File>>,
}

fn open_append(dir: &Path, name: &str) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(name))
}

impl EventLogger {
    pub fn new(
        data_dir: &Path,
        log_transactions: bool,
        log_benchmarks: bool,
    ) -> std::io::Result<Self> {
        let dir = data_dir.join("logs");
        std::fs::create_dir_all(&dir)?;

        let transactions = if log_transactions {
            Some(Mutex::new(open_append(&dir, "transactions.log")?))
        } else {
            None
        };
        let reconciliations = Mutex::new(open_append(&dir, "reconciliations.log")?);
        let benchmarks = if log_benchmarks {
            Some(Mutex::new(open_append(&dir, "benchmarks.log")?))
        } else {
            None
        };

        Ok(Self {
            transactions,
            reconciliations,
            benchmarks,
        })
    }

    fn append(file: &Mutex<File>, line: &str) {
        // Event-log writes must never abort the validator.
        let mut guard = match file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(guard, "{line}") {
            tracing::warn!("failed to append event log line: {e}");
        }
    }

    /// One line per transaction in a freshly-committed block.
    pub fn block_transactions(&self, block: &Block) {
        let Some(file) = &self.transactions else {
            return;
        };
        for transaction in &block.transactions {
            Self::append(
                file,
                &format!(
                    "transaction {} in block {} with {} operations",
                    transaction.transaction_identifier.hash,
                    block.block_identifier,
                    transaction.operations.len(),
                ),
            );
        }
    }

    /// Per-block processing time.
    pub fn benchmark(&self, block: &Block, elapsed: Duration) {
        let Some(file) = &self.benchmarks else {
            return;
        };
        Self::append(
            file,
            &format!(
                "block {} with {} transactions processed in {}ms",
                block.block_identifier,
                block.transactions.len(),
                elapsed.as_millis(),
            ),
        );
    }

    pub fn reconciled(
        &self,
        account: &AccountIdentifier,
        currency: &Currency,
        value: &str,
        block: &BlockIdentifier,
    ) {
        Self::append(
            &self.reconciliations,
            &format!("RECONCILED {account} {currency} {value} at block {block}"),
        );
    }

    pub fn mismatch(
        &self,
        account: &AccountIdentifier,
        currency: &Currency,
        computed: &str,
        authoritative: &str,
        block: &BlockIdentifier,
    ) {
        Self::append(
            &self.reconciliations,
            &format!(
                "MISMATCH {account} {currency} computed {computed} but node returned \
                 {authoritative} at block {block}"
            ),
        );
    }

    pub fn reconcile_unavailable(
        &self,
        account: &AccountIdentifier,
        currency: &Currency,
        block: &BlockIdentifier,
        reason: &str,
    ) {
        Self::append(
            &self.reconciliations,
            &format!("RECONCILE_UNAVAILABLE {account} {currency} at block {block}: {reason}"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::{Transaction, TransactionIdentifier};

    fn block_with_tx() -> Block {
        Block {
            block_identifier: BlockIdentifier::new(2, "2"),
            parent_block_identifier: BlockIdentifier::new(1, "1"),
            timestamp: 1000,
            transactions: vec![Transaction {
                transaction_identifier: TransactionIdentifier {
                    hash: "tx1".to_string(),
                },
                operations: vec![],
            }],
        }
    }

    #[test]
    fn transaction_lines_are_gated_by_flag() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");

        let silent = EventLogger::new(dir.path(), false, false).expect("logger");
        silent.block_transactions(&block_with_tx());
        assert!(!dir.path().join("logs/transactions.log").exists());

        let logger = EventLogger::new(dir.path(), true, false).expect("logger");
        logger.block_transactions(&block_with_tx());
        let contents =
            std::fs::read_to_string(dir.path().join("logs/transactions.log")).expect("read");
        assert!(contents.contains("transaction tx1 in block 2:2"));
    }

    #[test]
    fn reconciliation_lines_always_append() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let logger = EventLogger::new(dir.path(), false, false).expect("logger");

        let account = AccountIdentifier::new("acct1");
        let currency = Currency::new("Blah", 2);
        let block = BlockIdentifier::new(2, "2");
        logger.reconciled(&account, &currency, "100", &block);
        logger.mismatch(&account, &currency, "100", "99", &block);
        logger.reconcile_unavailable(&account, &currency, &block, "timed out");

        let contents =
            std::fs::read_to_string(dir.path().join("logs/reconciliations.log")).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("RECONCILED acct1 Blah:2 100"));
        assert!(lines[1].contains("computed 100 but node returned 99"));
        assert!(lines[2].starts_with("RECONCILE_UNAVAILABLE"));
    }

    #[test]
    fn benchmark_lines_include_duration() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let logger = EventLogger::new(dir.path(), false, true).expect("logger");
        logger.benchmark(&block_with_tx(), Duration::from_millis(42));
        let contents =
            std::fs::read_to_string(dir.path().join("logs/benchmarks.log")).expect("read");
        assert!(contents.contains("processed in 42ms"));
    }
}
