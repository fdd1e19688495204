//! Amounts and currencies.
//!
//! Balance values are arbitrary-precision signed integers carried as decimal
//! strings, so arithmetic is done through [`num_bigint::BigInt`] and never
//! depends on a platform integer width.

use std::fmt;

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::canonical::{render_metadata, Metadata};

/// A currency in which balances are denominated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub symbol: String,
    pub decimals: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Currency {
    pub fn new(symbol: impl Into<String>, decimals: u32) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
            metadata: None,
        }
    }

    /// Canonical string form: `symbol:decimals[:map[k1:v1 k2:v2]]` with
    /// metadata keys sorted.
    pub fn canonical(&self) -> String {
        match &self.metadata {
            Some(metadata) => format!(
                "{}:{}:{}",
                self.symbol,
                self.decimals,
                render_metadata(metadata)
            ),
            None => format!("{}:{}", self.symbol, self.decimals),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// A signed value in a currency. The currency is optional on the wire; an
/// amount without one is rejected the moment it would touch a balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    /// Decimal string representation of an arbitrary-precision integer,
    /// e.g. `"100"` or `"-250000000000000000000"`.
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
}

impl Amount {
    pub fn new(value: impl Into<String>, currency: Currency) -> Self {
        Self {
            value: value.into(),
            currency: Some(currency),
        }
    }

    /// Parse the decimal value. `None` if the string is not a valid signed
    /// decimal integer.
    pub fn big_value(&self) -> Option<BigInt> {
        self.value.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::Sign;
    use serde_json::json;

    #[test]
    fn canonical_of_plain_currency() {
        assert_eq!(Currency::new("BTC", 8).canonical(), "BTC:8");
    }

    #[test]
    fn canonical_sorts_currency_metadata() {
        let mut currency = Currency::new("BTC", 8);
        currency.metadata = Some(
            [
                ("issuer".to_string(), json!("satoshi")),
                ("count".to_string(), json!(10)),
            ]
            .into_iter()
            .collect(),
        );
        assert_eq!(currency.canonical(), "BTC:8:map[count:10 issuer:satoshi]");
    }

    #[test]
    fn big_value_parses_signed_decimals() {
        let currency = Currency::new("Blah", 2);
        let positive = Amount::new("100", currency.clone());
        assert_eq!(positive.big_value(), Some(BigInt::from(100)));

        let negative = Amount::new("-250000000000000000000", currency.clone());
        let parsed = negative.big_value().expect("should parse");
        assert_eq!(parsed.sign(), Sign::Minus);
        assert_eq!(parsed.to_string(), "-250000000000000000000");

        let garbage = Amount::new("12.5", currency);
        assert_eq!(garbage.big_value(), None);
    }
}
