use thiserror::Error;

use tally_types::BlockIdentifier;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("head block not found")]
    HeadBlockNotFound,

    #[error("block not found: {0}")]
    BlockNotFound(BlockIdentifier),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("duplicate block hash: {0}")]
    DuplicateBlockHash(String),

    #[error("duplicate transaction hash: {0}")]
    DuplicateTransactionHash(String),

    #[error("balance of {account} in {currency} would become negative: {attempted}")]
    NegativeBalance {
        account: String,
        currency: String,
        attempted: String,
    },

    #[error("invalid amount")]
    InvalidAmount,

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<heed::Error> for StoreError {
    fn from(e: heed::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
