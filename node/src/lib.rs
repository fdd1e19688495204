//! Validator node: block syncer, balance reconciler, and their supervisor.
//!
//! The syncer tails the remote chain one block at a time and is the sole
//! writer to the local store; the reconciler independently checks computed
//! balances against the remote node. The two are coupled only through the
//! reconciliation queue.

pub mod config;
pub mod error;
pub mod logger;
pub mod node;
pub mod reconciler;
pub mod shutdown;
pub mod source;
pub mod syncer;

pub use config::NodeConfig;
pub use error::NodeError;
pub use node::Validator;
pub use reconciler::should_reconcile;
pub use source::{BlockSource, HttpBlockSource, SourceError};
pub use syncer::{SyncError, Syncer};
