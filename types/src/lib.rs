//! Fundamental types for the tally chain validator.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: block and account identifiers, blocks and their operations,
//! amounts and currencies, and the network metadata the remote node declares
//! at startup.

pub mod amount;
pub mod block;
pub mod canonical;
pub mod identifiers;
pub mod network;

pub use amount::{Amount, Currency};
pub use block::{Block, Operation, OperationIdentifier, Transaction, TransactionIdentifier};
pub use identifiers::{AccountCurrency, AccountIdentifier, BlockIdentifier, SubAccountIdentifier};
pub use network::{Capability, NetworkStatus, OperationStatus, OperationStatusTable};
