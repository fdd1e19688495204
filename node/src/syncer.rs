//! Linear, reorg-aware chain follower.
//!
//! The syncer advances the local chain one block at a time. A fetched block
//! either extends the current head, or signals a reorg when its parent hash
//! disagrees with the head, in which case exactly one block is rolled back
//! and the candidate is discarded. Deep reorgs resolve as a run of
//! single-block rollbacks across successive calls, each of which re-emits
//! the rolled-back accounts for reconciliation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use tally_store::{currency_key, BlockStorage, StoreError};
use tally_types::{AccountCurrency, Block, OperationStatusTable};

use crate::logger::EventLogger;
use crate::reconciler::{ReconcileItem, ReconcilerHandle};
use crate::shutdown::ShutdownController;
use crate::source::BlockSource;
use crate::NodeError;

/// How often to re-query the remote head while fully caught up.
const HEAD_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum SyncError {
    /// The source returned a block at the wrong index.
    #[error("Got block {got} instead of {expected}")]
    OutOfOrderBlock { expected: i64, got: i64 },

    /// More consecutive rollbacks than the configured safety horizon allows.
    #[error("reorg depth {depth} exceeds the configured limit of {limit}")]
    ReorgTooDeep { depth: u64, limit: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Heed(#[from] heed::Error),
}

pub struct Syncer<S> {
    storage: Arc<BlockStorage>,
    source: Arc<S>,
    logger: Arc<EventLogger>,
    /// Send-only coupling to the reconciler; `None` drops every emit.
    reconciler: Option<ReconcilerHandle>,
    statuses: OperationStatusTable,
    shutdown: Arc<ShutdownController>,
    max_reorg_depth: u64,
    /// Consecutive rollbacks in the current reorg; reset on forward progress.
    reorg_run: u64,
}

impl<S: BlockSource> Syncer<S> {
    pub fn new(
        storage: Arc<BlockStorage>,
        source: Arc<S>,
        logger: Arc<EventLogger>,
        reconciler: Option<ReconcilerHandle>,
        statuses: OperationStatusTable,
        shutdown: Arc<ShutdownController>,
        max_reorg_depth: u64,
    ) -> Self {
        Self {
            storage,
            source,
            logger,
            reconciler,
            statuses,
            shutdown,
            max_reorg_depth,
            reorg_run: 0,
        }
    }

    /// Apply one candidate block at the index the syncer expected.
    ///
    /// Returns the (account, currency) pairs whose balances changed and the
    /// index to request next: `current_index + 1` after a forward commit,
    /// `current_index - 1` after a rollback (the candidate is discarded and
    /// the caller refetches at the lower index).
    pub fn process_block(
        &mut self,
        current_index: i64,
        block: &Block,
    ) -> Result<(Vec<AccountCurrency>, i64), SyncError> {
        let id = &block.block_identifier;
        if id.index != current_index {
            return Err(SyncError::OutOfOrderBlock {
                expected: current_index,
                got: id.index,
            });
        }

        let storage = Arc::clone(&self.storage);
        let mut wtxn = storage.write_txn()?;

        // Genesis has no parent to verify.
        if current_index != 0 {
            let head = self.storage.get_head(&wtxn)?;
            if block.parent_block_identifier != head {
                self.reorg_run += 1;
                if self.reorg_run > self.max_reorg_depth {
                    return Err(SyncError::ReorgTooDeep {
                        depth: self.reorg_run,
                        limit: self.max_reorg_depth,
                    });
                }

                let orphan = self.storage.get_block(&wtxn, &head)?;
                let touched = self.storage.remove_block(&mut wtxn, &head)?;
                self.storage
                    .set_head(&mut wtxn, &orphan.parent_block_identifier)?;
                wtxn.commit()?;

                tracing::info!(
                    "reorg: orphaned block {head}, head reset to {}",
                    orphan.parent_block_identifier,
                );
                return Ok((touched, current_index - 1));
            }
        }

        self.storage.store_block(&mut wtxn, block, &self.statuses)?;
        self.storage.set_head(&mut wtxn, id)?;
        wtxn.commit()?;
        self.reorg_run = 0;

        Ok((self.changed_accounts(block), current_index + 1))
    }

    /// The (account, currency) pairs touched by the block's successful
    /// operations, deduplicated in block order.
    fn changed_accounts(&self, block: &Block) -> Vec<AccountCurrency> {
        let mut seen = HashSet::new();
        let mut changed = Vec::new();
        for transaction in &block.transactions {
            for operation in &transaction.operations {
                if !self.statuses.successful(&operation.status) {
                    continue;
                }
                let (Some(account), Some(amount)) = (&operation.account, &operation.amount)
                else {
                    continue;
                };
                let Some(currency) = &amount.currency else {
                    continue;
                };
                if seen.insert((account.canonical(), currency.canonical())) {
                    changed.push(AccountCurrency {
                        account: account.clone(),
                        currency: currency.clone(),
                    });
                }
            }
        }
        changed
    }

    /// Read the committed balance of every touched pair and hand it to the
    /// reconciler. Dropped silently when reconciliation is inactive.
    async fn emit(&self, changed: Vec<AccountCurrency>) -> Result<(), NodeError> {
        let Some(handle) = &self.reconciler else {
            return Ok(());
        };

        let mut items = Vec::with_capacity(changed.len());
        {
            let rtxn = self.storage.read_txn()?;
            for pair in changed {
                match self.storage.get_balance(&rtxn, &pair.account) {
                    Ok((amounts, at_block)) => {
                        if let Some(amount) = amounts.get(&currency_key(&pair.currency)) {
                            items.push(ReconcileItem {
                                account: pair.account,
                                currency: pair.currency,
                                block: at_block,
                                amount: amount.clone(),
                            });
                        }
                    }
                    // A rollback can leave a pair with no record; nothing to
                    // compare then.
                    Err(StoreError::AccountNotFound(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        for item in items {
            handle.enqueue(item).await;
        }
        Ok(())
    }

    /// Tail the remote chain until shutdown or a fatal error.
    pub async fn run(mut self) -> Result<(), NodeError> {
        let mut shutdown_rx = self.shutdown.subscribe();

        let mut next_index = {
            let rtxn = self.storage.read_txn()?;
            match self.storage.get_head(&rtxn) {
                Ok(head) => head.index + 1,
                Err(StoreError::HeadBlockNotFound) => 0,
                Err(e) => return Err(e.into()),
            }
        };
        tracing::info!("syncing from block {next_index}");

        let mut remote_head = i64::MIN;
        loop {
            if self.shutdown.is_triggered() {
                return Ok(());
            }

            // Caught up: refresh the remote head and wait for it to move.
            if next_index > remote_head {
                let status = tokio::select! {
                    _ = shutdown_rx.recv() => return Ok(()),
                    status = self.source.network_status() => status?,
                };
                remote_head = status.current_block_identifier.index;
                if next_index > remote_head {
                    tokio::select! {
                        _ = shutdown_rx.recv() => return Ok(()),
                        _ = tokio::time::sleep(HEAD_POLL_INTERVAL) => {}
                    }
                    continue;
                }
            }

            let block = tokio::select! {
                _ = shutdown_rx.recv() => return Ok(()),
                block = self.source.block(next_index) => block?,
            };

            let started = Instant::now();
            let (changed, new_index) = self.process_block(next_index, &block)?;
            if new_index > next_index {
                self.logger.block_transactions(&block);
                self.logger.benchmark(&block, started.elapsed());
                tracing::debug!("committed block {}", block.block_identifier);
            }
            self.emit(changed).await?;
            next_index = new_index;
        }
    }
}
