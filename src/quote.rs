// src/quote.rs
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SourceError;

/// Where `ObservedAt::at` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampOrigin {
    /// The upstream payload declared the capture time.
    Upstream,
    /// The payload had no timestamp; local capture time was used instead.
    Substituted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ObservedAt {
    pub at: DateTime<Utc>,
    pub origin: TimestampOrigin,
}

impl ObservedAt {
    pub fn upstream(at: DateTime<Utc>) -> Self {
        Self {
            at,
            origin: TimestampOrigin::Upstream,
        }
    }

    pub fn substituted(at: DateTime<Utc>) -> Self {
        Self {
            at,
            origin: TimestampOrigin::Substituted,
        }
    }

    pub fn is_substituted(&self) -> bool {
        self.origin == TimestampOrigin::Substituted
    }
}

/// Uniform price record every source normalizes into.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub price: f64,
    pub observed_at: ObservedAt,
    /// `None` means no expiry was declared, which is not the same as expired.
    pub expires_at: Option<DateTime<Utc>>,
}

/// One source's outcome for one refresh cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceResult {
    pub source_id: String,
    pub outcome: Result<PriceQuote, SourceError>,
}

impl SourceResult {
    pub fn ok(source_id: impl Into<String>, quote: PriceQuote) -> Self {
        Self {
            source_id: source_id.into(),
            outcome: Ok(quote),
        }
    }

    pub fn err(source_id: impl Into<String>, error: impl Into<SourceError>) -> Self {
        Self {
            source_id: source_id.into(),
            outcome: Err(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}
