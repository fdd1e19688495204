//! Domain layer over the LMDB environment: blocks, head pointer, balances,
//! and the historical balance-change log.
//!
//! All operations run inside a caller-supplied transaction, so one processed
//! block maps onto exactly one atomic commit. Rollback of an orphaned block
//! is driven entirely by the change log written while the block was applied.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;

use heed::{RoTxn, RwTxn};
use num_bigint::{BigInt, Sign};
use serde::{Deserialize, Serialize};

use tally_types::{
    AccountCurrency, AccountIdentifier, Amount, Block, BlockIdentifier, Currency,
    OperationStatusTable,
};

use crate::environment::{KvEnvironment, DEFAULT_MAP_SIZE};
use crate::keys;
use crate::StoreError;

/// Per-account balance state: one amount per currency ever touched, plus the
/// block the record is current as of.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct BalanceRecord {
    amounts: BTreeMap<String, Amount>,
    block: BlockIdentifier,
}

/// One applied delta, recorded so a reorg can invert it. `previous` is the
/// block the balance record cited before this block touched it; `None` when
/// the record was created (or already re-cited) by the block itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct BalanceChange {
    account: AccountIdentifier,
    currency: Currency,
    delta: String,
    previous: Option<BlockIdentifier>,
}

pub struct BlockStorage {
    env: KvEnvironment,
}

impl BlockStorage {
    /// Open the store at `path` with the default map size.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(KvEnvironment::open(path, DEFAULT_MAP_SIZE)?))
    }

    pub fn new(env: KvEnvironment) -> Self {
        Self { env }
    }

    pub fn read_txn(&self) -> Result<RoTxn<'_>, StoreError> {
        self.env.read_txn()
    }

    pub fn write_txn(&self) -> Result<RwTxn<'_>, StoreError> {
        self.env.write_txn()
    }

    // ── Head pointer ────────────────────────────────────────────────────

    pub fn get_head(&self, txn: &RoTxn) -> Result<BlockIdentifier, StoreError> {
        match self.env.meta_db.get(txn, keys::HEAD_KEY)? {
            Some(bytes) => Ok(serde_json::from_slice(bytes)?),
            None => Err(StoreError::HeadBlockNotFound),
        }
    }

    pub fn set_head(&self, txn: &mut RwTxn, id: &BlockIdentifier) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(id)?;
        self.env.meta_db.put(txn, keys::HEAD_KEY, &bytes)?;
        Ok(())
    }

    // ── Blocks ──────────────────────────────────────────────────────────

    /// Look up a block. Only the hash participates in the lookup.
    pub fn get_block(&self, txn: &RoTxn, id: &BlockIdentifier) -> Result<Block, StoreError> {
        match self.env.blocks_db.get(txn, &keys::block_key(&id.hash))? {
            Some(bytes) => Ok(serde_json::from_slice(bytes)?),
            None => Err(StoreError::BlockNotFound(id.clone())),
        }
    }

    /// Store a block and apply its balance effects.
    ///
    /// Fails with [`StoreError::DuplicateBlockHash`] /
    /// [`StoreError::DuplicateTransactionHash`] before touching any balance.
    /// Every operation whose status the network declares successful and which
    /// carries both an account and an amount goes through
    /// [`update_balance`](Self::update_balance); the block record itself is
    /// written last.
    pub fn store_block(
        &self,
        txn: &mut RwTxn,
        block: &Block,
        statuses: &OperationStatusTable,
    ) -> Result<(), StoreError> {
        let block_hash = &block.block_identifier.hash;
        let block_key = keys::block_key(block_hash);
        if self.env.blocks_db.get(txn, &block_key)?.is_some() {
            return Err(StoreError::DuplicateBlockHash(block_hash.clone()));
        }

        for transaction in &block.transactions {
            let tx_hash = &transaction.transaction_identifier.hash;
            let tx_key = keys::transaction_key(tx_hash);
            if self.env.transactions_db.get(txn, &tx_key)?.is_some() {
                return Err(StoreError::DuplicateTransactionHash(tx_hash.clone()));
            }
            self.env
                .transactions_db
                .put(txn, &tx_key, block_hash.as_bytes())?;
        }

        for transaction in &block.transactions {
            for operation in &transaction.operations {
                if !statuses.successful(&operation.status) {
                    continue;
                }
                let (Some(account), Some(amount)) = (&operation.account, &operation.amount)
                else {
                    continue;
                };
                self.update_balance(txn, account, amount, &block.block_identifier)?;
            }
        }

        let bytes = serde_json::to_vec(block)?;
        self.env.blocks_db.put(txn, &block_key, &bytes)?;
        Ok(())
    }

    /// Remove a block, inverting every balance delta it applied.
    ///
    /// Returns the (account, currency) pairs the block had touched so the
    /// caller can re-check them. Balance records are rewound, never deleted;
    /// each rewound record cites the block it cited before this block
    /// touched it, falling back to the removed block's parent.
    pub fn remove_block(
        &self,
        txn: &mut RwTxn,
        id: &BlockIdentifier,
    ) -> Result<Vec<AccountCurrency>, StoreError> {
        let block = self.get_block(txn, id)?;
        let parent = block.parent_block_identifier.clone();

        let prefix = keys::change_prefix(&id.hash);
        let upper = keys::prefix_upper_bound(&prefix);
        let entries: Vec<(Vec<u8>, BalanceChange)> = {
            let bounds = (
                Bound::Included(&prefix[..]),
                match &upper {
                    Some(upper) => Bound::Excluded(upper.as_slice()),
                    None => Bound::Unbounded,
                },
            );
            let mut entries = Vec::new();
            for result in self.env.changes_db.range(txn, &bounds)? {
                let (key, value) = result?;
                entries.push((key.to_vec(), serde_json::from_slice(value)?));
            }
            entries
        };

        let mut touched = Vec::with_capacity(entries.len());
        for (key, entry) in entries {
            self.invert_change(txn, &entry, id, &parent)?;
            self.env.changes_db.delete(txn, &key)?;
            touched.push(AccountCurrency {
                account: entry.account,
                currency: entry.currency,
            });
        }

        for transaction in &block.transactions {
            let tx_key = keys::transaction_key(&transaction.transaction_identifier.hash);
            self.env.transactions_db.delete(txn, &tx_key)?;
        }
        self.env.blocks_db.delete(txn, &keys::block_key(&id.hash))?;

        Ok(touched)
    }

    fn invert_change(
        &self,
        txn: &mut RwTxn,
        entry: &BalanceChange,
        removed: &BlockIdentifier,
        parent: &BlockIdentifier,
    ) -> Result<(), StoreError> {
        let balance_key = keys::balance_key(&entry.account);
        let mut record: BalanceRecord = match self.env.balances_db.get(txn, &balance_key)? {
            Some(bytes) => serde_json::from_slice(bytes)?,
            None => {
                return Err(StoreError::AccountNotFound(entry.account.canonical()));
            }
        };

        let currency_key = keys::currency_key(&entry.currency);
        let old = record
            .amounts
            .get(&currency_key)
            .and_then(Amount::big_value)
            .ok_or(StoreError::InvalidAmount)?;
        let delta: BigInt = entry.delta.parse().map_err(|_| StoreError::InvalidAmount)?;
        let rewound = old - delta;

        record.amounts.insert(
            currency_key,
            Amount::new(rewound.to_string(), entry.currency.clone()),
        );
        match &entry.previous {
            Some(previous) => record.block = previous.clone(),
            // The record was created (or first re-cited) by the removed
            // block; fall back to its parent, which is still stored.
            None => {
                if record.block == *removed {
                    record.block = parent.clone();
                }
            }
        }

        let bytes = serde_json::to_vec(&record)?;
        self.env.balances_db.put(txn, &balance_key, &bytes)?;
        Ok(())
    }

    // ── Balances ────────────────────────────────────────────────────────

    /// Apply one signed delta to an account balance as of `block`.
    ///
    /// Rejects amounts without a currency or with an unparsable value with
    /// [`StoreError::InvalidAmount`]; rejects results below zero with
    /// [`StoreError::NegativeBalance`]. On success the change log gains (or
    /// merges into) an entry keyed by `(block, account, currency)` so the
    /// delta can be inverted on rollback.
    pub fn update_balance(
        &self,
        txn: &mut RwTxn,
        account: &AccountIdentifier,
        amount: &Amount,
        block: &BlockIdentifier,
    ) -> Result<(), StoreError> {
        let currency = amount.currency.as_ref().ok_or(StoreError::InvalidAmount)?;
        let delta = amount.big_value().ok_or(StoreError::InvalidAmount)?;

        let balance_key = keys::balance_key(account);
        let existing: Option<BalanceRecord> = self
            .env
            .balances_db
            .get(txn, &balance_key)?
            .map(serde_json::from_slice)
            .transpose()?;

        // `previous` is only meaningful when it points at a different block:
        // a second touch within the same block must not cite the block being
        // applied, or rollback would resurrect a deleted reference.
        let previous = existing
            .as_ref()
            .map(|record| record.block.clone())
            .filter(|cited| cited != block);
        let mut record = existing.unwrap_or_else(|| BalanceRecord {
            amounts: BTreeMap::new(),
            block: block.clone(),
        });

        let currency_key = keys::currency_key(currency);
        let old = match record.amounts.get(&currency_key) {
            Some(amount) => amount.big_value().ok_or(StoreError::InvalidAmount)?,
            None => BigInt::default(),
        };
        let new = old + &delta;
        if new.sign() == Sign::Minus {
            return Err(StoreError::NegativeBalance {
                account: account.canonical(),
                currency: currency.canonical(),
                attempted: new.to_string(),
            });
        }

        record
            .amounts
            .insert(currency_key, Amount::new(new.to_string(), currency.clone()));
        record.block = block.clone();
        let bytes = serde_json::to_vec(&record)?;
        self.env.balances_db.put(txn, &balance_key, &bytes)?;

        let change_key = keys::change_key(&block.hash, account, currency);
        let entry = match self.env.changes_db.get(txn, &change_key)? {
            // A second delta to the same (block, account, currency) merges:
            // rollback must invert the pair exactly once.
            Some(bytes) => {
                let mut entry: BalanceChange = serde_json::from_slice(bytes)?;
                let merged: BigInt = entry
                    .delta
                    .parse::<BigInt>()
                    .map_err(|_| StoreError::InvalidAmount)?
                    + &delta;
                entry.delta = merged.to_string();
                entry
            }
            None => BalanceChange {
                account: account.clone(),
                currency: currency.clone(),
                delta: delta.to_string(),
                previous,
            },
        };
        let bytes = serde_json::to_vec(&entry)?;
        self.env.changes_db.put(txn, &change_key, &bytes)?;
        Ok(())
    }

    /// All known balances of an account and the block they are current as of.
    pub fn get_balance(
        &self,
        txn: &RoTxn,
        account: &AccountIdentifier,
    ) -> Result<(BTreeMap<String, Amount>, BlockIdentifier), StoreError> {
        match self.env.balances_db.get(txn, &keys::balance_key(account))? {
            Some(bytes) => {
                let record: BalanceRecord = serde_json::from_slice(bytes)?;
                Ok((record.amounts, record.block))
            }
            None => Err(StoreError::AccountNotFound(account.canonical())),
        }
    }
}
