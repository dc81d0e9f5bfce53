// src/sources/mod.rs
//! Source registry: the fixed set of quote providers, each pairing an
//! endpoint with the pure function that normalizes its payload.

pub mod normalize;
pub mod providers;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{NormalizationError, NormalizationFailure, RegistryError};
use crate::quote::PriceQuote;
use providers::{milligold, wallgold, wallgold_chart};

/// Default CORS relay prefix; the target URL is appended percent-encoded.
pub const DEFAULT_RELAY_PREFIX: &str = "https://corsproxy.io/?";

/// Maps a decoded payload (plus local capture time, used only when the
/// payload carries no timestamp) to a quote.
pub type NormalizeFn = fn(&Value, DateTime<Utc>) -> Result<PriceQuote, NormalizationFailure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrencyUnit {
    Toman,
    Usd,
}

impl CurrencyUnit {
    pub fn label(&self) -> &'static str {
        match self {
            CurrencyUnit::Toman => "Toman",
            CurrencyUnit::Usd => "USD",
        }
    }

    /// `$2,650.40` for USD, `7,250,000 Toman` (rounded) for Toman.
    pub fn format_price(&self, price: f64) -> String {
        match self {
            CurrencyUnit::Usd => {
                let fixed = format!("{:.2}", price);
                let (int_part, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
                format!("${}.{}", group_thousands(int_part), frac)
            }
            CurrencyUnit::Toman => {
                let rounded = format!("{:.0}", price.round());
                format!("{} {}", group_thousands(&rounded), self.label())
            }
        }
    }
}

fn group_thousands(digits: &str) -> String {
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits),
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    format!("{sign}{out}")
}

/// CORS pass-through wrapper for origins without permissive headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relay {
    prefix: String,
}

impl Relay {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn wrap(&self, url: &str) -> String {
        format!("{}{}", self.prefix, urlencoding::encode(url))
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_PREFIX)
    }
}

#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub id: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub currency_unit: CurrencyUnit,
    /// Absolute URL actually requested (already relay-wrapped if needed).
    pub endpoint: String,
    pub normalizer: NormalizeFn,
}

impl SourceDescriptor {
    pub fn normalize(
        &self,
        payload: &Value,
        captured_at: DateTime<Utc>,
    ) -> Result<PriceQuote, NormalizationError> {
        (self.normalizer)(payload, captured_at).map_err(|reason| NormalizationError {
            source_id: self.id.to_string(),
            reason,
        })
    }
}

/// Start-up override for one built-in source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOverride {
    pub id: String,
    /// Replacement upstream URL (before relay wrapping).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Force relay on/off for this source.
    #[serde(default)]
    pub relay: Option<bool>,
}

struct Builtin {
    id: &'static str,
    display_name: &'static str,
    description: &'static str,
    currency_unit: CurrencyUnit,
    upstream: &'static str,
    relayed: bool,
    normalizer: NormalizeFn,
}

const BUILTINS: [Builtin; 4] = [
    Builtin {
        id: wallgold::ID,
        display_name: "WallGold (18k gold)",
        description: "Buy price per gram of 18k gold",
        currency_unit: CurrencyUnit::Toman,
        upstream: wallgold::ENDPOINT,
        relayed: false,
        normalizer: wallgold::normalize,
    },
    Builtin {
        id: wallgold_chart::DOLLAR_ID,
        display_name: "Dollar (WallGold)",
        description: "Free-market dollar rate",
        currency_unit: CurrencyUnit::Toman,
        upstream: wallgold_chart::ENDPOINT,
        relayed: false,
        normalizer: wallgold_chart::normalize_dollar,
    },
    Builtin {
        id: wallgold_chart::OUNCE_ID,
        display_name: "Gold ounce (WallGold)",
        description: "Global price per troy ounce of gold",
        currency_unit: CurrencyUnit::Usd,
        upstream: wallgold_chart::ENDPOINT,
        relayed: false,
        normalizer: wallgold_chart::normalize_ounce,
    },
    Builtin {
        id: milligold::ID,
        display_name: "Milli Gold",
        description: "Price per gram of 18k gold",
        currency_unit: CurrencyUnit::Toman,
        upstream: milligold::ENDPOINT,
        relayed: true,
        normalizer: milligold::normalize,
    },
];

/// Immutable, ordered set of sources. Built once at start-up.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<SourceDescriptor>,
}

impl SourceRegistry {
    /// Validate ids are unique and endpoints are absolute http(s) URLs.
    pub fn new(sources: Vec<SourceDescriptor>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for s in &sources {
            if !seen.insert(s.id) {
                return Err(RegistryError::DuplicateId(s.id.to_string()));
            }
            let absolute = reqwest::Url::parse(&s.endpoint)
                .map(|u| matches!(u.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !absolute {
                return Err(RegistryError::RelativeEndpoint {
                    id: s.id.to_string(),
                    endpoint: s.endpoint.clone(),
                });
            }
        }
        Ok(Self { sources })
    }

    /// The built-in sources with start-up overrides applied.
    pub fn builtin(relay: &Relay, overrides: &[SourceOverride]) -> Result<Self, RegistryError> {
        if let Some(unknown) = overrides
            .iter()
            .find(|o| !BUILTINS.iter().any(|b| b.id == o.id))
        {
            return Err(RegistryError::UnknownOverride(unknown.id.clone()));
        }

        let sources = BUILTINS
            .iter()
            .map(|b| {
                let ov = overrides.iter().find(|o| o.id == b.id);
                let upstream = ov
                    .and_then(|o| o.endpoint.as_deref())
                    .unwrap_or(b.upstream);
                let relayed = ov.and_then(|o| o.relay).unwrap_or(b.relayed);
                SourceDescriptor {
                    id: b.id,
                    display_name: b.display_name,
                    description: b.description,
                    currency_unit: b.currency_unit,
                    endpoint: if relayed {
                        relay.wrap(upstream)
                    } else {
                        upstream.to_string()
                    },
                    normalizer: b.normalizer,
                }
            })
            .collect();
        Self::new(sources)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.iter()
    }

    pub fn as_slice(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn get(&self, id: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
