use proptest::prelude::*;

use serde_json::json;
use tally_types::{AccountIdentifier, Amount, Currency};

proptest! {
    /// Canonical account forms are insensitive to metadata insertion order.
    #[test]
    fn account_canonical_ignores_metadata_order(
        keys in prop::collection::btree_set("[a-z]{1,8}", 1..6),
    ) {
        let pairs: Vec<(String, serde_json::Value)> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), json!(i)))
            .collect();

        let forward = AccountIdentifier::with_sub_account(
            "addr",
            "sub",
            Some(pairs.iter().cloned().collect()),
        );
        let reversed = AccountIdentifier::with_sub_account(
            "addr",
            "sub",
            Some(pairs.iter().rev().cloned().collect()),
        );
        prop_assert_eq!(forward.canonical(), reversed.canonical());
    }

    /// Decimal string round trip: value -> Amount -> BigInt -> string.
    #[test]
    fn amount_value_round_trips(value in any::<i128>()) {
        let amount = Amount::new(value.to_string(), Currency::new("Blah", 2));
        let parsed = amount.big_value().expect("decimal strings parse");
        prop_assert_eq!(parsed.to_string(), value.to_string());
    }

    /// Currency canonical form always starts with symbol:decimals.
    #[test]
    fn currency_canonical_prefix(symbol in "[A-Z]{1,6}", decimals in 0u32..30) {
        let currency = Currency::new(symbol.clone(), decimals);
        prop_assert_eq!(currency.canonical(), format!("{symbol}:{decimals}"));
    }
}
