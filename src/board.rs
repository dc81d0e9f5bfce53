// src/board.rs
//! In-memory status board: the per-card state a UI renders, fed through the
//! `Presenter` callbacks.
//!
//! Card lifecycle: `Waiting` (never fetched) -> `Fetching` -> `Success` or
//! `Error`, and back to `Fetching` at the start of every cycle. The last
//! good quote is kept across cycles and marked stale while the card is not
//! in `Success`.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::presenter::Presenter;
use crate::quote::{PriceQuote, SourceResult};
use crate::scheduler::CycleReport;
use crate::sources::{CurrencyUnit, SourceDescriptor, SourceRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Waiting,
    Fetching,
    Success,
    Error,
}

#[derive(Debug, Clone)]
struct Card {
    id: &'static str,
    display_name: &'static str,
    description: &'static str,
    currency: CurrencyUnit,
    status: CardStatus,
    quote: Option<PriceQuote>,
    error: Option<String>,
}

#[derive(Debug)]
struct BoardInner {
    refreshing: bool,
    last_updated: Option<DateTime<Utc>>,
    cards: Vec<Card>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardView {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub currency: CurrencyUnit,
    pub status: CardStatus,
    pub price: Option<f64>,
    pub formatted_price: Option<String>,
    pub observed_at: Option<DateTime<Utc>>,
    pub observed_at_substituted: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
    /// The shown price is from an earlier cycle.
    pub stale: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardSnapshot {
    pub refreshing: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub cards: Vec<CardView>,
}

#[derive(Debug)]
pub struct Board {
    inner: Mutex<BoardInner>,
}

impl Board {
    pub fn new(registry: &SourceRegistry) -> Self {
        let cards = registry
            .iter()
            .map(|s| Card {
                id: s.id,
                display_name: s.display_name,
                description: s.description,
                currency: s.currency_unit,
                status: CardStatus::Waiting,
                quote: None,
                error: None,
            })
            .collect();
        Self {
            inner: Mutex::new(BoardInner {
                refreshing: false,
                last_updated: None,
                cards,
            }),
        }
    }

    fn with_card(&self, id: &str, f: impl FnOnce(&mut Card)) {
        let mut inner = self.inner.lock().expect("board mutex poisoned");
        match inner.cards.iter_mut().find(|c| c.id == id) {
            Some(card) => f(card),
            None => tracing::warn!(source = id, "board has no card for source"),
        }
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        let inner = self.inner.lock().expect("board mutex poisoned");
        BoardSnapshot {
            refreshing: inner.refreshing,
            last_updated: inner.last_updated,
            cards: inner.cards.iter().map(card_view).collect(),
        }
    }

    pub fn card(&self, id: &str) -> Option<CardView> {
        let inner = self.inner.lock().expect("board mutex poisoned");
        inner.cards.iter().find(|c| c.id == id).map(card_view)
    }
}

fn card_view(c: &Card) -> CardView {
    let q = c.quote.as_ref();
    CardView {
        id: c.id.to_string(),
        display_name: c.display_name.to_string(),
        description: c.description.to_string(),
        currency: c.currency,
        status: c.status,
        price: q.map(|q| q.price),
        formatted_price: q.map(|q| c.currency.format_price(q.price)),
        observed_at: q.map(|q| q.observed_at.at),
        observed_at_substituted: q.map(|q| q.observed_at.is_substituted()),
        expires_at: q.and_then(|q| q.expires_at),
        stale: q.is_some() && c.status != CardStatus::Success,
        error: c.error.clone(),
    }
}

impl Presenter for Board {
    fn refresh_started(&self) {
        self.inner.lock().expect("board mutex poisoned").refreshing = true;
    }

    fn source_pending(&self, source: &SourceDescriptor) {
        self.with_card(source.id, |card| {
            card.status = CardStatus::Fetching;
            card.error = None;
        });
    }

    fn source_completed(&self, source: &SourceDescriptor, result: &SourceResult) {
        self.with_card(source.id, |card| match &result.outcome {
            Ok(quote) => {
                card.status = CardStatus::Success;
                card.quote = Some(quote.clone());
                card.error = None;
            }
            Err(e) => {
                card.status = CardStatus::Error;
                card.error = Some(e.reason_text());
            }
        });
    }

    fn cycle_completed(&self, report: &CycleReport) {
        let mut inner = self.inner.lock().expect("board mutex poisoned");
        inner.refreshing = false;
        inner.last_updated = Some(report.finished_at);
    }

    fn refresh_aborted(&self) {
        self.inner.lock().expect("board mutex poisoned").refreshing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, FetchErrorKind};
    use crate::quote::ObservedAt;
    use crate::scheduler::Trigger;
    use crate::sources::Relay;
    use chrono::TimeZone;

    fn registry() -> SourceRegistry {
        SourceRegistry::builtin(&Relay::default(), &[]).unwrap()
    }

    fn quote(price: f64) -> PriceQuote {
        PriceQuote {
            price,
            observed_at: ObservedAt::substituted(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()),
            expires_at: None,
        }
    }

    #[test]
    fn cards_start_waiting_without_price() {
        let board = Board::new(&registry());
        let snap = board.snapshot();
        assert_eq!(snap.cards.len(), 4);
        assert!(snap.cards.iter().all(|c| c.status == CardStatus::Waiting && c.price.is_none()));
        assert!(!snap.refreshing);
        assert_eq!(snap.last_updated, None);
    }

    #[test]
    fn success_then_failure_keeps_stale_price_and_shows_error() {
        let reg = registry();
        let board = Board::new(&reg);
        let src = reg.get("wallgold-ounce").unwrap();

        board.source_pending(src);
        assert_eq!(board.card(src.id).unwrap().status, CardStatus::Fetching);

        board.source_completed(src, &SourceResult::ok(src.id, quote(2650.4)));
        let card = board.card(src.id).unwrap();
        assert_eq!(card.status, CardStatus::Success);
        assert_eq!(card.formatted_price.as_deref(), Some("$2,650.40"));
        assert_eq!(card.observed_at_substituted, Some(true));
        assert!(!card.stale);

        board.source_pending(src);
        board.source_completed(
            src,
            &SourceResult::err(
                src.id,
                FetchError {
                    source_id: src.id.into(),
                    kind: FetchErrorKind::Timeout,
                },
            ),
        );
        let card = board.card(src.id).unwrap();
        assert_eq!(card.status, CardStatus::Error);
        assert_eq!(card.error.as_deref(), Some("timed out waiting for upstream response"));
        assert_eq!(card.price, Some(2650.4));
        assert!(card.stale);

        // next cycle clears the error while fetching
        board.source_pending(src);
        let card = board.card(src.id).unwrap();
        assert_eq!(card.status, CardStatus::Fetching);
        assert_eq!(card.error, None);
    }

    #[test]
    fn refresh_flag_and_last_updated_follow_the_cycle() {
        let board = Board::new(&registry());
        board.refresh_started();
        assert!(board.snapshot().refreshing);

        let finished_at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        board.cycle_completed(&CycleReport {
            trigger: Trigger::Manual,
            started_at: finished_at,
            finished_at,
            results: vec![],
        });
        let snap = board.snapshot();
        assert!(!snap.refreshing);
        assert_eq!(snap.last_updated, Some(finished_at));
    }
}
