// src/error.rs
//! Error taxonomy for one source's pipeline: transport failures (`FetchError`)
//! and payload-shape failures (`NormalizationError`). Both stay contained at
//! the per-source boundary and end up inside that source's `SourceResult`.

use thiserror::Error;

/// Transport-layer failure while querying one source.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{source_id}: {kind}")]
pub struct FetchError {
    pub source_id: String,
    pub kind: FetchErrorKind,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchErrorKind {
    #[error("timed out waiting for upstream response")]
    Timeout,
    #[error("upstream answered HTTP {0}")]
    HttpStatus(u16),
    #[error("response body is not valid JSON: {0}")]
    MalformedBody(String),
    #[error("network failure: {0}")]
    NetworkFailure(String),
}

impl FetchErrorKind {
    /// Short label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::HttpStatus(_) => "http_status",
            FetchErrorKind::MalformedBody(_) => "malformed_body",
            FetchErrorKind::NetworkFailure(_) => "network",
        }
    }
}

/// Why a decoded payload could not be mapped to a `PriceQuote`.
///
/// Normalizers return this bare reason; the orchestrator attaches the source
/// id to form a [`NormalizationError`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizationFailure {
    #[error("expected container `{field}` is missing or has the wrong type")]
    MissingContainer { field: &'static str },
    #[error("upstream envelope reported code {code}")]
    UnexpectedCode { code: String },
    #[error("no entry with symbol `{symbol}`")]
    ItemNotFound { symbol: &'static str },
    #[error("price `{raw}` is not a finite non-negative number")]
    InvalidNumeric { raw: String },
    #[error("timestamp `{field}` has unrecognized value `{raw}`")]
    InvalidTimestamp { field: &'static str, raw: String },
}

impl NormalizationFailure {
    pub fn label(&self) -> &'static str {
        match self {
            NormalizationFailure::MissingContainer { .. } => "missing_container",
            NormalizationFailure::UnexpectedCode { .. } => "unexpected_code",
            NormalizationFailure::ItemNotFound { .. } => "item_not_found",
            NormalizationFailure::InvalidNumeric { .. } => "invalid_numeric",
            NormalizationFailure::InvalidTimestamp { .. } => "invalid_timestamp",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{source_id}: {reason}")]
pub struct NormalizationError {
    pub source_id: String,
    pub reason: NormalizationFailure,
}

/// Failure half of a `SourceResult`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Normalization(#[from] NormalizationError),
}

impl SourceError {
    pub fn source_id(&self) -> &str {
        match self {
            SourceError::Fetch(e) => &e.source_id,
            SourceError::Normalization(e) => &e.source_id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceError::Fetch(e) => e.kind.label(),
            SourceError::Normalization(e) => e.reason.label(),
        }
    }

    /// Message without the source id prefix, for the source's own card.
    pub fn reason_text(&self) -> String {
        match self {
            SourceError::Fetch(e) => e.kind.to_string(),
            SourceError::Normalization(e) => e.reason.to_string(),
        }
    }
}

/// Registry construction problems (start-up only).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("duplicate source id `{0}`")]
    DuplicateId(String),
    #[error("source `{id}` has a non-absolute endpoint `{endpoint}`")]
    RelativeEndpoint { id: String, endpoint: String },
    #[error("override refers to unknown source `{0}`")]
    UnknownOverride(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_error_keeps_source_id_and_reason_text() {
        let e: SourceError = NormalizationError {
            source_id: "wallgold-dollar".into(),
            reason: NormalizationFailure::ItemNotFound { symbol: "DOLLAR" },
        }
        .into();
        assert_eq!(e.source_id(), "wallgold-dollar");
        assert_eq!(e.label(), "item_not_found");
        assert_eq!(e.to_string(), "wallgold-dollar: no entry with symbol `DOLLAR`");
    }

    #[test]
    fn http_status_message_carries_code() {
        let e = FetchError {
            source_id: "milligold".into(),
            kind: FetchErrorKind::HttpStatus(502),
        };
        assert_eq!(e.to_string(), "milligold: upstream answered HTTP 502");
    }
}
