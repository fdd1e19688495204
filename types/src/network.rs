//! Network metadata declared by the remote node at startup.

use serde::{Deserialize, Serialize};

use crate::identifiers::BlockIdentifier;

/// Maps an operation status string to whether it affects balances.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStatus {
    pub status: String,
    pub successful: bool,
}

/// The network-declared table of operation statuses.
///
/// A status absent from the table is treated as unsuccessful: an unknown
/// status must never move a balance.
#[derive(Clone, Debug, Default)]
pub struct OperationStatusTable {
    statuses: Vec<OperationStatus>,
}

impl OperationStatusTable {
    pub fn new(statuses: Vec<OperationStatus>) -> Self {
        Self { statuses }
    }

    pub fn successful(&self, status: &str) -> bool {
        self.statuses
            .iter()
            .any(|s| s.status == status && s.successful)
    }
}

/// An optional endpoint the remote node advertises support for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// The node can answer account-balance queries; enables reconciliation.
    AccountBalance,
    /// Anything this validator does not use.
    #[serde(other)]
    Unknown,
}

/// The startup handshake response: chain extent, the status table, and the
/// advertised capability set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub genesis_block_identifier: BlockIdentifier,
    pub current_block_identifier: BlockIdentifier,
    #[serde(default)]
    pub operation_statuses: Vec<OperationStatus>,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

impl NetworkStatus {
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn status_table(&self) -> OperationStatusTable {
        OperationStatusTable::new(self.operation_statuses.clone())
    }
}
