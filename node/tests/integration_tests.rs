//! Integration tests exercising the full validator pipeline:
//! remote chain → syncer → LMDB persistence → reconciliation → readback.
//!
//! These tests wire together components that are normally only connected
//! inside `node.rs`, including a reorg served by the source while the
//! validator is live.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use tally_node::{
    BlockSource, NodeConfig, NodeError, SourceError, SyncError, Validator,
};
use tally_store::{currency_key, BlockStorage, StoreError};
use tally_types::{
    AccountIdentifier, Amount, Block, BlockIdentifier, Capability, Currency, NetworkStatus,
    Operation, OperationIdentifier, OperationStatus, Transaction, TransactionIdentifier,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn currency() -> Currency {
    Currency::new("Blah", 2)
}

fn transfer(hash: &str, account: &str, value: &str) -> Transaction {
    Transaction {
        transaction_identifier: TransactionIdentifier {
            hash: hash.to_string(),
        },
        operations: vec![Operation {
            operation_identifier: OperationIdentifier { index: 0 },
            op_type: "Transfer".to_string(),
            status: "Success".to_string(),
            account: Some(AccountIdentifier::new(account)),
            amount: Some(Amount::new(value, currency())),
        }],
    }
}

fn block(
    hash: &str,
    index: i64,
    parent_hash: &str,
    parent_index: i64,
    transactions: Vec<Transaction>,
) -> Block {
    Block {
        block_identifier: BlockIdentifier::new(index, hash),
        parent_block_identifier: BlockIdentifier::new(parent_index, parent_hash),
        timestamp: 1000 + index,
        transactions,
    }
}

/// Serves a scripted answer sequence per block index: each fetch pops the
/// next answer until one remains, which then repeats. This is how a reorg
/// looks from the validator's side: the same index answered differently
/// across fetches.
struct ScriptedSource {
    answers: Mutex<HashMap<i64, Vec<Block>>>,
    head_index: i64,
    head_hash: String,
    balances: HashMap<String, Vec<Amount>>,
}

impl ScriptedSource {
    fn new(schedule: Vec<(i64, Vec<Block>)>, head: (i64, &str)) -> Self {
        Self {
            answers: Mutex::new(schedule.into_iter().collect()),
            head_index: head.0,
            head_hash: head.1.to_string(),
            balances: HashMap::new(),
        }
    }

    fn with_balance(mut self, account: &str, amounts: Vec<Amount>) -> Self {
        self.balances.insert(account.to_string(), amounts);
        self
    }
}

#[async_trait]
impl BlockSource for ScriptedSource {
    async fn network_status(&self) -> Result<NetworkStatus, SourceError> {
        Ok(NetworkStatus {
            genesis_block_identifier: BlockIdentifier::new(0, "0"),
            current_block_identifier: BlockIdentifier::new(
                self.head_index,
                self.head_hash.clone(),
            ),
            operation_statuses: vec![
                OperationStatus {
                    status: "Success".to_string(),
                    successful: true,
                },
                OperationStatus {
                    status: "Failure".to_string(),
                    successful: false,
                },
            ],
            capabilities: vec![Capability::AccountBalance],
        })
    }

    async fn block(&self, index: i64) -> Result<Block, SourceError> {
        let mut answers = self.answers.lock().await;
        let queue = answers
            .get_mut(&index)
            .ok_or_else(|| SourceError::Unavailable(format!("no block at {index}")))?;
        if queue.len() > 1 {
            Ok(queue.remove(0))
        } else {
            queue
                .first()
                .cloned()
                .ok_or_else(|| SourceError::Unavailable(format!("no block at {index}")))
        }
    }

    async fn balance(
        &self,
        account: &AccountIdentifier,
        _at: &BlockIdentifier,
    ) -> Result<Vec<Amount>, SourceError> {
        Ok(self
            .balances
            .get(&account.canonical())
            .cloned()
            .unwrap_or_default())
    }
}

async fn wait_for_log_line(dir: &Path, needle: &str) {
    let log_path = dir.join("logs/reconciliations.log");
    for _ in 0..500 {
        if std::fs::read_to_string(&log_path)
            .map(|contents| contents.contains(needle))
            .unwrap_or(false)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("log line {needle:?} never appeared");
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// The source first serves a branch crediting acct1, then reorgs it away.
/// The validator must end up on the replacement branch with the credit
/// rewound, and must reconcile the rewound balance against the node.
#[tokio::test]
async fn live_reorg_rewinds_and_reconciles() {
    let b0 = block("0", 0, "0", 0, vec![]);
    let b1 = block("1", 1, "0", 0, vec![transfer("tx1", "acct1", "100")]);
    let b1a = block("1a", 1, "0", 0, vec![]);
    let b2 = block("2", 2, "1a", 1, vec![]);
    let b3 = block("3", 3, "2", 2, vec![]);

    // Fetch order: 0, 1 (old branch), 2 (parent mismatch → rollback),
    // 1 (now the new branch), 2, 3.
    let source = ScriptedSource::new(
        vec![
            (0, vec![b0.clone()]),
            (1, vec![b1.clone(), b1a.clone()]),
            (2, vec![b2.clone()]),
            (3, vec![b3.clone()]),
        ],
        (3, "3"),
    )
    // After the rewind acct1 holds nothing; the node agrees.
    .with_balance("acct1", vec![Amount::new("0", currency())]);

    let dir = tempfile::tempdir().expect("temp dir");
    let config = NodeConfig {
        data_dir: dir.path().to_path_buf(),
        account_concurrency: 2,
        ..NodeConfig::default()
    };
    let validator = Validator::new(config).expect("validator");
    let shutdown = validator.shutdown_handle();
    let running = tokio::spawn(validator.run_with_source(Arc::new(source)));

    // The rolled-back account is re-emitted citing genesis and reconciles
    // at its rewound value.
    wait_for_log_line(dir.path(), "RECONCILED acct1 Blah:2 0 at block 0:0").await;

    shutdown.trigger();
    running.await.expect("join").expect("clean exit");

    let storage = BlockStorage::open(dir.path()).expect("reopen storage");
    let rtxn = storage.read_txn().expect("read_txn");
    assert_eq!(
        storage.get_head(&rtxn).expect("head"),
        b3.block_identifier
    );

    // The orphan is gone, the replacement branch is fully present.
    assert!(matches!(
        storage.get_block(&rtxn, &b1.block_identifier),
        Err(StoreError::BlockNotFound(_))
    ));
    for present in [&b0, &b1a, &b2, &b3] {
        storage
            .get_block(&rtxn, &present.block_identifier)
            .expect("branch block present");
    }

    let (amounts, at_block) = storage
        .get_balance(&rtxn, &AccountIdentifier::new("acct1"))
        .expect("balance");
    assert_eq!(amounts[&currency_key(&currency())].value, "0");
    assert_eq!(at_block, b0.block_identifier);
}

/// A block that would overdraw an account is fatal: the run ends with the
/// negative-balance error and the head stays on the last good block.
#[tokio::test]
async fn overdraw_is_fatal_and_leaves_the_head_intact() {
    let b0 = block("0", 0, "0", 0, vec![]);
    let b1 = block("1", 1, "0", 0, vec![transfer("tx1", "acct2", "-100")]);

    let source = ScriptedSource::new(
        vec![(0, vec![b0.clone()]), (1, vec![b1])],
        (1, "1"),
    );

    let dir = tempfile::tempdir().expect("temp dir");
    let config = NodeConfig {
        data_dir: dir.path().to_path_buf(),
        ..NodeConfig::default()
    };
    let validator = Validator::new(config).expect("validator");
    let running = tokio::spawn(validator.run_with_source(Arc::new(source)));

    let result = running.await.expect("join");
    assert!(matches!(
        result,
        Err(NodeError::Sync(SyncError::Store(
            StoreError::NegativeBalance { .. }
        )))
    ));

    let storage = BlockStorage::open(dir.path()).expect("reopen storage");
    let rtxn = storage.read_txn().expect("read_txn");
    assert_eq!(
        storage.get_head(&rtxn).expect("head"),
        b0.block_identifier
    );
    assert!(matches!(
        storage.get_balance(&rtxn, &AccountIdentifier::new("acct2")),
        Err(StoreError::AccountNotFound(_))
    ));
}
