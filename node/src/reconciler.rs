//! Active balance reconciliation.
//!
//! Workers drain a queue of balances the syncer has just committed and
//! compare each against the authoritative balance reported by the remote
//! node at the same block. A mismatch is reported, never retried; a fetch
//! failure drops the item after the source adapter's retries are exhausted.
//! Only a store failure can take the process down from here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinSet;

use tally_store::{BlockStorage, StoreError};
use tally_types::{
    AccountIdentifier, Amount, BlockIdentifier, Capability, Currency, NetworkStatus,
};

use crate::logger::EventLogger;
use crate::shutdown::ShutdownController;
use crate::source::BlockSource;
use crate::NodeError;

const QUEUE_CAPACITY: usize = 8192;

/// How often to re-check the local head while waiting for it to cover an
/// item's block.
const CATCH_UP_POLL: Duration = Duration::from_millis(200);

/// A committed balance awaiting verification: the account, the currency, the
/// block the balance is current as of, and the computed amount.
#[derive(Clone, Debug)]
pub struct ReconcileItem {
    pub account: AccountIdentifier,
    pub currency: Currency,
    pub block: BlockIdentifier,
    pub amount: Amount,
}

/// Send-only half of the reconciliation queue, held by the syncer.
#[derive(Clone)]
pub struct ReconcilerHandle {
    tx: mpsc::Sender<ReconcileItem>,
}

impl ReconcilerHandle {
    pub async fn enqueue(&self, item: ReconcileItem) {
        if self.tx.send(item).await.is_err() {
            tracing::warn!("reconciler queue closed; dropping item");
        }
    }
}

/// Reconciliation only makes sense when the source can answer balance
/// queries.
pub fn should_reconcile(status: &NetworkStatus) -> bool {
    status.has_capability(Capability::AccountBalance)
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Reconciled,
    Mismatch { authoritative: String },
    /// The item's branch was rolled back; a re-emitted pair will follow.
    Stale,
    /// The source could not answer for this item; dropped, not fatal.
    Unavailable(String),
    Cancelled,
}

struct ReconcilerCore<S> {
    storage: Arc<BlockStorage>,
    source: Arc<S>,
    logger: Arc<EventLogger>,
    safety_depth: i64,
}

impl<S: BlockSource> ReconcilerCore<S> {
    async fn reconcile_item(
        &self,
        item: &ReconcileItem,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<Outcome, NodeError> {
        // Wait for the local chain to cover the comparison point. After a
        // rollback the head can sit below the item's block for a while; the
        // stale check below sorts out whether the item survived.
        loop {
            let caught_up = {
                let rtxn = self.storage.read_txn()?;
                match self.storage.get_head(&rtxn) {
                    Ok(head) => head.index >= item.block.index + self.safety_depth,
                    Err(StoreError::HeadBlockNotFound) => false,
                    Err(e) => return Err(e.into()),
                }
            };
            if caught_up {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.recv() => return Ok(Outcome::Cancelled),
                _ = tokio::time::sleep(CATCH_UP_POLL) => {}
            }
        }

        // The adapter retries transient failures internally; an error here
        // means retries are exhausted.
        let balances = tokio::select! {
            _ = shutdown_rx.recv() => return Ok(Outcome::Cancelled),
            result = self.source.balance(&item.account, &item.block) => match result {
                Ok(balances) => balances,
                Err(e) => return Ok(Outcome::Unavailable(e.to_string())),
            },
        };

        // Stale-branch check: the record must still cite the block the item
        // was computed at.
        {
            let rtxn = self.storage.read_txn()?;
            match self.storage.get_balance(&rtxn, &item.account) {
                Ok((_, cited)) if cited == item.block => {}
                Ok(_) => return Ok(Outcome::Stale),
                Err(StoreError::AccountNotFound(_)) => return Ok(Outcome::Stale),
                Err(e) => return Err(e.into()),
            }
        }

        let wanted = item.currency.canonical();
        let authoritative = balances
            .iter()
            .find(|amount| {
                amount
                    .currency
                    .as_ref()
                    .is_some_and(|currency| currency.canonical() == wanted)
            });
        let Some(authoritative) = authoritative else {
            return Ok(Outcome::Unavailable(format!(
                "node returned no balance in {wanted}"
            )));
        };

        let (Some(computed), Some(remote)) =
            (item.amount.big_value(), authoritative.big_value())
        else {
            return Ok(Outcome::Unavailable("unparsable balance value".to_string()));
        };

        if computed == remote {
            Ok(Outcome::Reconciled)
        } else {
            Ok(Outcome::Mismatch {
                authoritative: remote.to_string(),
            })
        }
    }
}

pub struct Reconciler<S> {
    core: Arc<ReconcilerCore<S>>,
    shutdown: Arc<ShutdownController>,
    workers: usize,
    rx: mpsc::Receiver<ReconcileItem>,
}

impl<S: BlockSource> Reconciler<S> {
    pub fn new(
        storage: Arc<BlockStorage>,
        source: Arc<S>,
        logger: Arc<EventLogger>,
        shutdown: Arc<ShutdownController>,
        workers: usize,
        safety_depth: i64,
    ) -> (Self, ReconcilerHandle) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let reconciler = Self {
            core: Arc::new(ReconcilerCore {
                storage,
                source,
                logger,
                safety_depth,
            }),
            shutdown,
            workers,
            rx,
        };
        (reconciler, ReconcilerHandle { tx })
    }

    /// Run the worker pool until shutdown or the first store failure.
    pub async fn run(self) -> Result<(), NodeError> {
        let rx = Arc::new(Mutex::new(self.rx));
        let mut tasks = JoinSet::new();
        for worker in 0..self.workers {
            let core = Arc::clone(&self.core);
            let rx = Arc::clone(&rx);
            let shutdown = Arc::clone(&self.shutdown);
            tasks.spawn(worker_loop(worker, core, rx, shutdown));
        }

        let mut first_err = None;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!("reconciler worker failed: {e}");
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                    self.shutdown.trigger();
                }
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(NodeError::TaskFailure(e.to_string()));
                    }
                    self.shutdown.trigger();
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn worker_loop<S: BlockSource>(
    worker: usize,
    core: Arc<ReconcilerCore<S>>,
    rx: Arc<Mutex<mpsc::Receiver<ReconcileItem>>>,
    shutdown: Arc<ShutdownController>,
) -> Result<(), NodeError> {
    let mut shutdown_rx = shutdown.subscribe();
    loop {
        let item = {
            let mut guard = rx.lock().await;
            tokio::select! {
                _ = shutdown_rx.recv() => return Ok(()),
                item = guard.recv() => match item {
                    Some(item) => item,
                    None => return Ok(()),
                },
            }
        };

        match core.reconcile_item(&item, &mut shutdown_rx).await? {
            Outcome::Reconciled => {
                core.logger
                    .reconciled(&item.account, &item.currency, &item.amount.value, &item.block);
                tracing::debug!(
                    worker,
                    "reconciled {} {} at block {}",
                    item.account,
                    item.currency,
                    item.block,
                );
            }
            Outcome::Mismatch { authoritative } => {
                core.logger.mismatch(
                    &item.account,
                    &item.currency,
                    &item.amount.value,
                    &authoritative,
                    &item.block,
                );
                tracing::warn!(
                    worker,
                    "balance mismatch for {} {}: computed {} but node returned {} at block {}",
                    item.account,
                    item.currency,
                    item.amount.value,
                    authoritative,
                    item.block,
                );
            }
            Outcome::Stale => {
                tracing::debug!(
                    worker,
                    "skipping {} at rolled-back block {}",
                    item.account,
                    item.block,
                );
            }
            Outcome::Unavailable(reason) => {
                core.logger
                    .reconcile_unavailable(&item.account, &item.currency, &item.block, &reason);
                tracing::warn!(
                    worker,
                    "could not reconcile {} {}: {reason}",
                    item.account,
                    item.currency,
                );
            }
            Outcome::Cancelled => return Ok(()),
        }
    }
}
