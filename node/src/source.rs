//! The remote node as a capability: blocks by index, balances at a block,
//! and the startup network handshake.
//!
//! [`HttpBlockSource`] talks to the node's uniform JSON RPC. Transient
//! failures are retried with bounded exponential backoff inside the adapter,
//! so callers only ever see an error after retries are exhausted. Block and
//! per-transaction fetch parallelism are bounded by two semaphores sized
//! from configuration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use futures_util::future::try_join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;

use tally_types::{
    AccountIdentifier, Amount, Block, BlockIdentifier, NetworkStatus, Transaction,
    TransactionIdentifier,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_CAP: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SourceError {
    /// The node could not be reached or kept failing; raised only after the
    /// adapter's retries are exhausted.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The node answered with something this validator cannot interpret.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// What the validator needs from the remote node.
#[async_trait]
pub trait BlockSource: Send + Sync + 'static {
    /// The startup handshake: chain extent, operation statuses, capabilities.
    async fn network_status(&self) -> Result<NetworkStatus, SourceError>;

    /// The block at a chain index.
    async fn block(&self, index: i64) -> Result<Block, SourceError>;

    /// The balances of an account as of a block.
    async fn balance(
        &self,
        account: &AccountIdentifier,
        at: &BlockIdentifier,
    ) -> Result<Vec<Amount>, SourceError>;
}

// ── Wire types ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct BlockRequest {
    index: i64,
}

#[derive(Deserialize)]
struct BlockResponse {
    block: Block,
    /// Transactions the node reports by identifier only; fetched separately.
    #[serde(default)]
    other_transactions: Vec<TransactionIdentifier>,
}

#[derive(Serialize)]
struct BlockTransactionRequest {
    block_identifier: BlockIdentifier,
    transaction_identifier: TransactionIdentifier,
}

#[derive(Deserialize)]
struct BlockTransactionResponse {
    transaction: Transaction,
}

#[derive(Serialize)]
struct BalanceRequest {
    account_identifier: AccountIdentifier,
    block_identifier: BlockIdentifier,
}

#[derive(Deserialize)]
struct BalanceResponse {
    balances: Vec<Amount>,
}

#[derive(Serialize)]
struct NetworkStatusRequest {}

// ── HTTP adapter ────────────────────────────────────────────────────────

pub struct HttpBlockSource {
    client: reqwest::Client,
    base_url: String,
    block_permits: Arc<Semaphore>,
    transaction_permits: Arc<Semaphore>,
}

impl HttpBlockSource {
    pub fn new(
        server_addr: &str,
        block_concurrency: usize,
        transaction_concurrency: usize,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: server_addr.trim_end_matches('/').to_string(),
            block_permits: Arc::new(Semaphore::new(block_concurrency)),
            transaction_permits: Arc::new(Semaphore::new(transaction_concurrency)),
        })
    }

    fn retry_policy() -> ExponentialBackoff {
        ExponentialBackoff {
            max_elapsed_time: Some(RETRY_CAP),
            ..ExponentialBackoff::default()
        }
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, SourceError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        backoff::future::retry(Self::retry_policy(), || async {
            let response = self
                .client
                .post(&url)
                .json(body)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(SourceError::Unavailable(e.to_string()))
                })?;

            let status = response.status();
            if status.is_server_error() {
                return Err(backoff::Error::transient(SourceError::Unavailable(
                    format!("{path} returned {status}"),
                )));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(SourceError::Unavailable(
                    format!("{path} returned {status}"),
                )));
            }
            response
                .json::<Resp>()
                .await
                .map_err(|e| backoff::Error::permanent(SourceError::Malformed(e.to_string())))
        })
        .await
    }

    async fn block_transaction(
        &self,
        block: &BlockIdentifier,
        transaction: &TransactionIdentifier,
    ) -> Result<Transaction, SourceError> {
        let _permit = self
            .transaction_permits
            .acquire()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
        let response: BlockTransactionResponse = self
            .post(
                "/block/transaction",
                &BlockTransactionRequest {
                    block_identifier: block.clone(),
                    transaction_identifier: transaction.clone(),
                },
            )
            .await?;
        Ok(response.transaction)
    }
}

#[async_trait]
impl BlockSource for HttpBlockSource {
    async fn network_status(&self) -> Result<NetworkStatus, SourceError> {
        self.post("/network/status", &NetworkStatusRequest {}).await
    }

    async fn block(&self, index: i64) -> Result<Block, SourceError> {
        let _permit = self
            .block_permits
            .acquire()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
        let response: BlockResponse = self.post("/block", &BlockRequest { index }).await?;

        let mut block = response.block;
        if !response.other_transactions.is_empty() {
            let fetched = try_join_all(
                response
                    .other_transactions
                    .iter()
                    .map(|tx| self.block_transaction(&block.block_identifier, tx)),
            )
            .await?;
            block.transactions.extend(fetched);
        }
        Ok(block)
    }

    async fn balance(
        &self,
        account: &AccountIdentifier,
        at: &BlockIdentifier,
    ) -> Result<Vec<Amount>, SourceError> {
        let response: BalanceResponse = self
            .post(
                "/account/balance",
                &BalanceRequest {
                    account_identifier: account.clone(),
                    block_identifier: at.clone(),
                },
            )
            .await?;
        Ok(response.balances)
    }
}
