// src/sources/providers/milligold.rs
//! milli.gold public price detail (18k gold, Toman per gram).
//!
//! `data.price18` is published in a truncated denomination; two zero digits
//! are missing, so the coerced value is scaled by 100. The origin sends no
//! permissive CORS headers and is reached through the relay by default.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::NormalizationFailure;
use crate::quote::PriceQuote;
use crate::sources::normalize::{
    coerce_price, expect_code, object_field, observed_at, PriceAdjustment,
};

pub const ID: &str = "milligold";
pub const ENDPOINT: &str = "https://milli.gold/api/v1/public/milli-price/detail";

const ACCEPTED_CODES: [i64; 2] = [0, 200];
const ADJUSTMENT: PriceAdjustment = PriceAdjustment::Scale(100.0);

pub fn normalize(
    payload: &Value,
    captured_at: DateTime<Utc>,
) -> Result<PriceQuote, NormalizationFailure> {
    let data = object_field(payload, "data")?;
    let envelope = payload
        .as_object()
        .ok_or(NormalizationFailure::MissingContainer { field: "data" })?;
    expect_code(envelope, "code", &ACCEPTED_CODES)?;
    let price = ADJUSTMENT.apply(coerce_price(data.get("price18"))?)?;
    let observed_at = observed_at(data, "date", captured_at)?;

    Ok(PriceQuote {
        price,
        observed_at,
        expires_at: None,
    })
}
