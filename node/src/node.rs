//! Construction and supervision of the validator's tasks.
//!
//! One syncer task (the sole store writer) and, when the source supports
//! balance queries, one reconciler pool. The first fatal error from either
//! triggers the shutdown broadcast; siblings drain and the error is
//! returned. A signal-driven shutdown returns `Ok`.

use std::sync::Arc;

use tokio::task::JoinSet;

use tally_store::BlockStorage;

use crate::logger::EventLogger;
use crate::reconciler::{should_reconcile, Reconciler};
use crate::shutdown::ShutdownController;
use crate::source::{BlockSource, HttpBlockSource};
use crate::syncer::Syncer;
use crate::{NodeConfig, NodeError};

pub struct Validator {
    config: NodeConfig,
    shutdown: Arc<ShutdownController>,
}

impl Validator {
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        Ok(Self {
            config,
            shutdown: Arc::new(ShutdownController::new()),
        })
    }

    /// Handle for triggering shutdown from outside (tests, embedding).
    pub fn shutdown_handle(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Run until a signal or the first fatal error.
    pub async fn run(self) -> Result<(), NodeError> {
        let source = Arc::new(HttpBlockSource::new(
            &self.config.server_addr,
            self.config.block_concurrency,
            self.config.transaction_concurrency,
        )?);
        self.run_with_source(source).await
    }

    /// Same as [`run`](Self::run) with a caller-supplied source.
    pub async fn run_with_source<S: BlockSource>(self, source: Arc<S>) -> Result<(), NodeError> {
        let config = self.config;
        let shutdown = self.shutdown;

        let storage = Arc::new(BlockStorage::open(&config.data_dir)?);
        let logger = Arc::new(EventLogger::new(
            &config.data_dir,
            config.log_transactions,
            config.log_benchmarks,
        )?);

        let status = source.network_status().await?;
        tracing::info!(
            "connected to {}: genesis {}, head {}",
            config.server_addr,
            status.genesis_block_identifier,
            status.current_block_identifier,
        );

        let mut tasks: JoinSet<Result<(), NodeError>> = JoinSet::new();

        let reconciler_handle = if should_reconcile(&status) {
            tracing::info!("balance reconciliation enabled");
            let (reconciler, handle) = Reconciler::new(
                Arc::clone(&storage),
                Arc::clone(&source),
                Arc::clone(&logger),
                Arc::clone(&shutdown),
                config.account_concurrency,
                config.safety_depth,
            );
            tasks.spawn(reconciler.run());
            Some(handle)
        } else {
            tracing::warn!(
                "source does not advertise the account_balance capability; \
                 reconciliation disabled"
            );
            None
        };

        let syncer = Syncer::new(
            storage,
            source,
            logger,
            reconciler_handle,
            status.status_table(),
            Arc::clone(&shutdown),
            config.max_reorg_depth,
        );
        tasks.spawn(syncer.run());

        let signal_task = {
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move { shutdown.wait_for_signal().await })
        };

        let mut first_err = None;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!("fatal: {e}");
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                    shutdown.trigger();
                }
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(NodeError::TaskFailure(e.to_string()));
                    }
                    shutdown.trigger();
                }
            }
        }
        signal_task.abort();

        match first_err {
            Some(e) => Err(e),
            None => {
                tracing::info!("validator stopped cleanly");
                Ok(())
            }
        }
    }
}
