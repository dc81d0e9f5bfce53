// src/sources/providers/wallgold.rs
//! WallGold live 18k gold quote (buy side, Toman per gram).
//!
//! Payload:
//! ```json
//! { "result": { "price": "7,250,000", "currentTime": "...", "priceExpiresAt": "..." } }
//! ```
//! Both timestamps are declared by upstream; `currentTime` is substituted only
//! when missing.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::NormalizationFailure;
use crate::quote::PriceQuote;
use crate::sources::normalize::{coerce_price, object_field, observed_at, optional_timestamp};

pub const ID: &str = "wallgold";
pub const ENDPOINT: &str = "https://api.wallgold.ir/api/v1/price?symbol=GLD_18C_750TMN&side=buy";

pub fn normalize(
    payload: &Value,
    captured_at: DateTime<Utc>,
) -> Result<PriceQuote, NormalizationFailure> {
    let result = object_field(payload, "result")?;
    let price = coerce_price(result.get("price"))?;
    let observed_at = observed_at(result, "currentTime", captured_at)?;
    let expires_at = optional_timestamp(result, "priceExpiresAt")?;

    Ok(PriceQuote {
        price,
        observed_at,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::TimestampOrigin;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn live_quote_with_expiry() {
        let body = json!({
            "result": {
                "price": "7,250,000",
                "currentTime": "2025-03-01T09:30:00Z",
                "priceExpiresAt": "2025-03-01T09:31:00Z"
            }
        });
        let q = normalize(&body, Utc::now()).unwrap();
        assert_eq!(q.price, 7_250_000.0);
        assert_eq!(q.observed_at.origin, TimestampOrigin::Upstream);
        assert_eq!(
            q.observed_at.at,
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap()
        );
        assert_eq!(
            q.expires_at,
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 9, 31, 0).unwrap())
        );
    }

    #[test]
    fn null_expiry_means_not_declared() {
        let body = json!({ "result": { "price": 1, "currentTime": "2025-03-01T09:30:00Z", "priceExpiresAt": null } });
        assert_eq!(normalize(&body, Utc::now()).unwrap().expires_at, None);
    }

    #[test]
    fn result_must_be_an_object() {
        for body in [json!({}), json!({ "result": "oops" }), json!(null), json!([1, 2])] {
            assert_eq!(
                normalize(&body, Utc::now()),
                Err(NormalizationFailure::MissingContainer { field: "result" })
            );
        }
    }
}
