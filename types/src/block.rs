//! Blocks, transactions, and operations as reported by the remote node.

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::identifiers::{AccountIdentifier, BlockIdentifier};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIdentifier {
    pub hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationIdentifier {
    pub index: i64,
}

/// A single balance-affecting (or inert) step inside a transaction.
///
/// Only operations whose `status` maps to `successful = true` in the
/// network's declared status table modify balances; everything else is
/// persisted as part of the block but otherwise ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub operation_identifier: OperationIdentifier,
    #[serde(rename = "type")]
    pub op_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountIdentifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_identifier: TransactionIdentifier,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

/// A block in the remote chain. The parent of the genesis block is the
/// genesis block itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub block_identifier: BlockIdentifier,
    pub parent_block_identifier: BlockIdentifier,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// True iff this block carries the genesis convention of being its own
    /// parent at index 0.
    pub fn is_genesis(&self) -> bool {
        self.block_identifier.index == 0
            && self.parent_block_identifier == self.block_identifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_its_own_parent() {
        let id = BlockIdentifier::new(0, "0");
        let genesis = Block {
            block_identifier: id.clone(),
            parent_block_identifier: id,
            timestamp: 0,
            transactions: vec![],
        };
        assert!(genesis.is_genesis());
    }

    #[test]
    fn wire_round_trip_preserves_operation_type_field() {
        let json = r#"{
            "block_identifier": {"index": 2, "hash": "2"},
            "parent_block_identifier": {"index": 1, "hash": "1"},
            "timestamp": 1000,
            "transactions": [{
                "transaction_identifier": {"hash": "tx1"},
                "operations": [{
                    "operation_identifier": {"index": 0},
                    "type": "Transfer",
                    "status": "Success",
                    "account": {"address": "acct1"},
                    "amount": {"value": "100", "currency": {"symbol": "Blah", "decimals": 2}}
                }]
            }]
        }"#;
        let block: Block = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(block.transactions[0].operations[0].op_type, "Transfer");

        let encoded = serde_json::to_string(&block).expect("should serialize");
        let back: Block = serde_json::from_str(&encoded).expect("should round trip");
        assert_eq!(back, block);
    }
}
