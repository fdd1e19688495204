//! Block and account identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::amount::Currency;
use crate::canonical::{render_metadata, Metadata};

/// Identifies a block by hash and chain index. Index 0 is genesis; by
/// convention the genesis block is its own parent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIdentifier {
    pub index: i64,
    pub hash: String,
}

impl BlockIdentifier {
    pub fn new(index: i64, hash: impl Into<String>) -> Self {
        Self {
            index,
            hash: hash.into(),
        }
    }
}

impl fmt::Display for BlockIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index, self.hash)
    }
}

/// A named sub-account under an address, with optional free-form metadata
/// (a staking bucket, an escrow compartment, and so on).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAccountIdentifier {
    pub sub_account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Identifies an account on the remote chain.
///
/// Two identifiers refer to the same account iff their [canonical forms]
/// are byte-identical.
///
/// [canonical forms]: AccountIdentifier::canonical
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIdentifier {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_account: Option<SubAccountIdentifier>,
}

impl AccountIdentifier {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            sub_account: None,
        }
    }

    pub fn with_sub_account(
        address: impl Into<String>,
        sub_account: impl Into<String>,
        metadata: Option<Metadata>,
    ) -> Self {
        Self {
            address: address.into(),
            sub_account: Some(SubAccountIdentifier {
                sub_account: sub_account.into(),
                metadata,
            }),
        }
    }

    /// Canonical string form: `address[:sub][:map[k1:v1 k2:v2]]` with
    /// metadata keys sorted. This is the identity used for store keys and
    /// queue deduplication.
    pub fn canonical(&self) -> String {
        let mut out = self.address.clone();
        if let Some(sub) = &self.sub_account {
            out.push(':');
            out.push_str(&sub.sub_account);
            if let Some(metadata) = &sub.metadata {
                out.push(':');
                out.push_str(&render_metadata(metadata));
            }
        }
        out
    }
}

impl fmt::Display for AccountIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// An (account, currency) pair touched by a committed or rolled-back block,
/// handed from the syncer to the reconciler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountCurrency {
    pub account: AccountIdentifier,
    pub currency: Currency,
}
