// src/sources/providers/wallgold_chart.rs
//! Dollar and gold-ounce quotes pulled from the `metaData` array of the
//! WallGold monthly chart.
//!
//! The chart endpoint carries no capture time for its metadata entries, so
//! every quote from here has a substituted `observed_at`.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::NormalizationFailure;
use crate::quote::{ObservedAt, PriceQuote};
use crate::sources::normalize::{array_field, coerce_price, find_symbol, object_field};

pub const DOLLAR_ID: &str = "wallgold-dollar";
pub const OUNCE_ID: &str = "wallgold-ounce";
pub const ENDPOINT: &str =
    "https://api.wallgold.ir/api/v1/chart?symbol=GLD_18C_750TMN&chartType=MONTHLY";

const DOLLAR_SYMBOL: &str = "DOLLAR";
const OUNCE_SYMBOL: &str = "GOLD_OUNCE";

fn normalize_entry(
    payload: &Value,
    symbol: &'static str,
    captured_at: DateTime<Utc>,
) -> Result<PriceQuote, NormalizationFailure> {
    let result = object_field(payload, "result")?;
    let items = array_field(result, "metaData")?;
    let entry = find_symbol(items, symbol)?;
    let price = coerce_price(entry.get("price"))?;

    Ok(PriceQuote {
        price,
        observed_at: ObservedAt::substituted(captured_at),
        expires_at: None,
    })
}

/// Free-market dollar rate, Toman.
pub fn normalize_dollar(
    payload: &Value,
    captured_at: DateTime<Utc>,
) -> Result<PriceQuote, NormalizationFailure> {
    normalize_entry(payload, DOLLAR_SYMBOL, captured_at)
}

/// Gold ounce, USD.
pub fn normalize_ounce(
    payload: &Value,
    captured_at: DateTime<Utc>,
) -> Result<PriceQuote, NormalizationFailure> {
    normalize_entry(payload, OUNCE_SYMBOL, captured_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chart() -> Value {
        json!({
            "result": {
                "candles": [],
                "metaData": [
                    { "symbol": "GOLD_OUNCE", "price": 2650.4 },
                    { "symbol": "DOLLAR", "price": "92,150" },
                    { "symbol": "USDT", "price": "91,800" }
                ]
            }
        })
    }

    #[test]
    fn picks_the_matching_symbol() {
        let now = Utc::now();
        let dollar = normalize_dollar(&chart(), now).unwrap();
        assert_eq!(dollar.price, 92_150.0);
        assert!(dollar.observed_at.is_substituted());
        assert_eq!(dollar.observed_at.at, now);
        assert_eq!(dollar.expires_at, None);

        let ounce = normalize_ounce(&chart(), now).unwrap();
        assert_eq!(ounce.price, 2650.4);
    }

    #[test]
    fn missing_symbol_is_item_not_found() {
        let body = json!({ "result": { "metaData": [{ "symbol": "USDT", "price": 1 }] } });
        assert_eq!(
            normalize_ounce(&body, Utc::now()),
            Err(NormalizationFailure::ItemNotFound { symbol: "GOLD_OUNCE" })
        );
    }

    #[test]
    fn metadata_must_be_an_array() {
        let body = json!({ "result": { "metaData": { "symbol": "DOLLAR" } } });
        assert_eq!(
            normalize_dollar(&body, Utc::now()),
            Err(NormalizationFailure::MissingContainer { field: "metaData" })
        );
        // lower-case key is a different field
        let body = json!({ "result": { "metadata": [] } });
        assert_eq!(
            normalize_dollar(&body, Utc::now()),
            Err(NormalizationFailure::MissingContainer { field: "metaData" })
        );
    }

    #[test]
    fn bad_price_on_matched_entry_is_invalid_numeric() {
        let body = json!({ "result": { "metaData": [{ "symbol": "DOLLAR", "price": "n/a" }] } });
        assert_eq!(
            normalize_dollar(&body, Utc::now()),
            Err(NormalizationFailure::InvalidNumeric { raw: "n/a".into() })
        );
    }
}
