//! LMDB-backed block storage for the tally chain validator.
//!
//! A single LMDB environment holds the observed chain: blocks, a
//! transaction-hash uniqueness index, the head pointer, per-account balance
//! records, and the historical balance-change log that makes reorg rollback
//! possible. Every mutation happens inside a caller-scoped write transaction,
//! so a processed block is either fully applied or not applied at all.

pub mod block_storage;
pub mod environment;
pub mod error;
pub mod keys;

pub use block_storage::BlockStorage;
pub use environment::KvEnvironment;
pub use error::StoreError;
pub use keys::{balance_key, currency_key, hash_string};
