//! LMDB environment setup.

use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};

use crate::StoreError;

/// Default LMDB map size. The map is sparse, so this costs address space,
/// not disk.
pub const DEFAULT_MAP_SIZE: usize = 4 * 1024 * 1024 * 1024;

const MAX_DBS: u32 = 8;

/// Wraps the LMDB environment and the named databases the validator uses.
///
/// - `blocks`: hashed block key → JSON block
/// - `transactions`: hashed transaction key → block hash (chain-wide
///   uniqueness sentinel)
/// - `balances`: hashed account key → JSON balance record
/// - `balance_changes`: composite `(block, account, currency)` key → JSON
///   change entry
/// - `meta`: head pointer
pub struct KvEnvironment {
    env: Env,
    pub(crate) blocks_db: Database<Bytes, Bytes>,
    pub(crate) transactions_db: Database<Bytes, Bytes>,
    pub(crate) balances_db: Database<Bytes, Bytes>,
    pub(crate) changes_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
}

impl KvEnvironment {
    /// Open or create an LMDB environment at the given path.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path)
            .map_err(|e| StoreError::Backend(format!("failed to create data directory: {e}")))?;

        let env = unsafe {
            EnvOpenOptions::new()
                .max_dbs(MAX_DBS)
                .map_size(map_size)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let blocks_db = env.create_database(&mut wtxn, Some("blocks"))?;
        let transactions_db = env.create_database(&mut wtxn, Some("transactions"))?;
        let balances_db = env.create_database(&mut wtxn, Some("balances"))?;
        let changes_db = env.create_database(&mut wtxn, Some("balance_changes"))?;
        let meta_db = env.create_database(&mut wtxn, Some("meta"))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            blocks_db,
            transactions_db,
            balances_db,
            changes_db,
            meta_db,
        })
    }

    /// Begin a snapshot-isolated read transaction.
    pub fn read_txn(&self) -> Result<RoTxn<'_>, StoreError> {
        Ok(self.env.read_txn()?)
    }

    /// Begin a write transaction. Commits are atomic; dropping the
    /// transaction without committing aborts every operation in it.
    pub fn write_txn(&self) -> Result<RwTxn<'_>, StoreError> {
        Ok(self.env.write_txn()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_missing_directories() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let nested = dir.path().join("a").join("b");
        let env = KvEnvironment::open(&nested, 10 * 1024 * 1024).expect("open");
        assert!(nested.is_dir());
        drop(env);
    }

    #[test]
    fn dropped_write_txn_discards_changes() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let env = KvEnvironment::open(dir.path(), 10 * 1024 * 1024).expect("open");

        {
            let mut wtxn = env.write_txn().expect("write_txn");
            env.meta_db
                .put(&mut wtxn, b"k", b"v")
                .expect("put");
            // dropped without commit
        }

        let rtxn = env.read_txn().expect("read_txn");
        assert!(env.meta_db.get(&rtxn, b"k").expect("get").is_none());
    }

    #[test]
    fn committed_write_txn_is_visible() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let env = KvEnvironment::open(dir.path(), 10 * 1024 * 1024).expect("open");

        let mut wtxn = env.write_txn().expect("write_txn");
        env.meta_db.put(&mut wtxn, b"k", b"v").expect("put");
        wtxn.commit().expect("commit");

        let rtxn = env.read_txn().expect("read_txn");
        assert_eq!(env.meta_db.get(&rtxn, b"k").expect("get"), Some(&b"v"[..]));
    }
}
