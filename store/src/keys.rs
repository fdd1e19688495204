//! Store key derivation.
//!
//! Identifiers coming off the wire are unbounded strings, so every key is the
//! SHA-256 of a `<namespace>:<canonical form>` preimage. The change-log key is
//! a binary composite of three 32-byte components, which keeps all entries for
//! one block contiguous and prefix-scannable.

use sha2::{Digest, Sha256};

use tally_types::{AccountIdentifier, Currency};

/// Location of the head pointer inside the `meta` database.
pub(crate) const HEAD_KEY: &[u8] = b"head";

pub(crate) fn hash_bytes(preimage: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(preimage);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Hex form of the bounded hash, for keys that live inside JSON records.
pub fn hash_string(preimage: &str) -> String {
    hex::encode(hash_bytes(preimage.as_bytes()))
}

pub(crate) fn block_key(hash: &str) -> [u8; 32] {
    hash_bytes(format!("block:{hash}").as_bytes())
}

pub(crate) fn transaction_key(hash: &str) -> [u8; 32] {
    hash_bytes(format!("txn:{hash}").as_bytes())
}

/// Key of an account's balance record.
pub fn balance_key(account: &AccountIdentifier) -> [u8; 32] {
    hash_bytes(format!("balance:{}", account.canonical()).as_bytes())
}

/// Key a currency's amount is filed under inside a balance record.
pub fn currency_key(currency: &Currency) -> String {
    hash_string(&currency.canonical())
}

/// First 32 bytes of every change-log key for the given block.
pub(crate) fn change_prefix(block_hash: &str) -> [u8; 32] {
    hash_bytes(format!("bchange:{block_hash}").as_bytes())
}

/// Composite change-log key: `block(32) ++ account(32) ++ currency(32)`.
pub(crate) fn change_key(
    block_hash: &str,
    account: &AccountIdentifier,
    currency: &Currency,
) -> [u8; 96] {
    let mut key = [0u8; 96];
    key[..32].copy_from_slice(&change_prefix(block_hash));
    key[32..64].copy_from_slice(&balance_key(account));
    key[64..].copy_from_slice(&hash_bytes(currency.canonical().as_bytes()));
    key
}

/// Exclusive upper bound for a prefix range scan, or `None` when the prefix
/// is all `0xff` and the range is unbounded above.
pub(crate) fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.last_mut() {
        if *last < u8::MAX {
            *last += 1;
            return Some(upper);
        }
        upper.pop();
    }
    None
}
