// src/sources/normalize.rs
//! Building blocks shared by the per-source normalizers.
//!
//! Every helper is pure: it reads from the decoded payload and returns either
//! a value or the `NormalizationFailure` describing the first check that did
//! not hold. Normalizers compose them in a fixed order (container, item,
//! numeric, adjustment, timestamp) so the reported reason is deterministic.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::error::NormalizationFailure;
use crate::quote::ObservedAt;

/// Epoch values at or above this are treated as milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Per-source correction applied to the coerced upstream number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceAdjustment {
    Identity,
    /// Upstream reports a truncated denomination; multiply to restore it.
    Scale(f64),
}

impl PriceAdjustment {
    /// The adjusted price, which must still be finite.
    pub fn apply(self, price: f64) -> Result<f64, NormalizationFailure> {
        let adjusted = match self {
            PriceAdjustment::Identity => price,
            PriceAdjustment::Scale(factor) => price * factor,
        };
        if adjusted.is_finite() {
            Ok(adjusted)
        } else {
            Err(NormalizationFailure::InvalidNumeric {
                raw: format!("{price} adjusted to {adjusted}"),
            })
        }
    }
}

/// Object-valued field `field` of `parent`.
pub fn object_field<'a>(
    parent: &'a Value,
    field: &'static str,
) -> Result<&'a Map<String, Value>, NormalizationFailure> {
    parent
        .get(field)
        .and_then(Value::as_object)
        .ok_or(NormalizationFailure::MissingContainer { field })
}

/// Array-valued field `field` of an already located object.
pub fn array_field<'a>(
    parent: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a [Value], NormalizationFailure> {
    parent
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or(NormalizationFailure::MissingContainer { field })
}

/// First entry whose `symbol` equals `symbol`. Entries that are not objects
/// or carry no string symbol are skipped.
pub fn find_symbol<'a>(
    items: &'a [Value],
    symbol: &'static str,
) -> Result<&'a Map<String, Value>, NormalizationFailure> {
    items
        .iter()
        .filter_map(Value::as_object)
        .find(|item| item.get("symbol").and_then(Value::as_str) == Some(symbol))
        .ok_or(NormalizationFailure::ItemNotFound { symbol })
}

/// Accept an envelope status code (number or numeric string) from `accepted`.
pub fn expect_code(
    parent: &Map<String, Value>,
    field: &'static str,
    accepted: &[i64],
) -> Result<(), NormalizationFailure> {
    let raw = parent.get(field);
    let code = match raw {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match code {
        Some(c) if accepted.contains(&c) => Ok(()),
        _ => Err(NormalizationFailure::UnexpectedCode {
            code: raw.map_or_else(|| "<missing>".to_string(), Value::to_string),
        }),
    }
}

fn is_separator(c: char) -> bool {
    // ',' ASCII, '٬' Arabic thousands separator, '،' Arabic comma
    matches!(c, ',' | '\u{066C}' | '\u{060C}') || c.is_whitespace()
}

/// Coerce an upstream price (JSON number, or string with thousands
/// separators) into a finite, non-negative `f64`.
pub fn coerce_price(raw: Option<&Value>) -> Result<f64, NormalizationFailure> {
    let invalid = |raw: String| NormalizationFailure::InvalidNumeric { raw };

    let value = match raw {
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| invalid(n.to_string()))?,
        Some(Value::String(s)) => {
            let cleaned: String = s.chars().filter(|c| !is_separator(*c)).collect();
            cleaned.parse::<f64>().map_err(|_| invalid(s.clone()))?
        }
        Some(other) => return Err(invalid(other.to_string())),
        None => return Err(invalid("<missing>".to_string())),
    };

    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(invalid(raw.map(Value::to_string).unwrap_or_default()))
    }
}

/// Parse the timestamp encodings upstreams are known to use.
pub fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => {
            let epoch = n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64))?;
            if epoch >= EPOCH_MILLIS_THRESHOLD {
                DateTime::from_timestamp_millis(epoch)
            } else {
                DateTime::from_timestamp(epoch, 0)
            }
        }
        _ => None,
    }
}

fn present(raw: Option<&Value>) -> Option<&Value> {
    match raw {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(v) => Some(v),
    }
}

/// Upstream capture time from `field`, or `captured_at` tagged as
/// substituted when the field is absent, null or blank.
pub fn observed_at(
    parent: &Map<String, Value>,
    field: &'static str,
    captured_at: DateTime<Utc>,
) -> Result<ObservedAt, NormalizationFailure> {
    match present(parent.get(field)) {
        None => Ok(ObservedAt::substituted(captured_at)),
        Some(v) => parse_timestamp(v)
            .map(ObservedAt::upstream)
            .ok_or_else(|| NormalizationFailure::InvalidTimestamp {
                field,
                raw: v.to_string(),
            }),
    }
}

/// Optional timestamp; absent, null or blank means "not declared".
pub fn optional_timestamp(
    parent: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, NormalizationFailure> {
    match present(parent.get(field)) {
        None => Ok(None),
        Some(v) => parse_timestamp(v)
            .map(Some)
            .ok_or_else(|| NormalizationFailure::InvalidTimestamp {
                field,
                raw: v.to_string(),
            }),
    }
}
