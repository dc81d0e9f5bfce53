// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod board;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod presenter;
pub mod quote;
pub mod scheduler;
pub mod sources;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::error::{FetchError, FetchErrorKind, NormalizationError, SourceError};
pub use crate::quote::{ObservedAt, PriceQuote, SourceResult, TimestampOrigin};
pub use crate::scheduler::{RefreshOutcome, RefreshScheduler, SchedulerState, Trigger};
pub use crate::sources::{CurrencyUnit, SourceDescriptor, SourceRegistry};
