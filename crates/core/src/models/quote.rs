use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Which upstream provider produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QuoteSource {
    /// Free chart endpoint, no key required (primary)
    Yahoo,
    /// Keyed endpoint with a small daily quota (alternate)
    AlphaVantage,
}

impl QuoteSource {
    /// Stable lowercase identifier used in cache keys and usage counters.
    pub fn id(&self) -> &'static str {
        match self {
            QuoteSource::Yahoo => "yahoo",
            QuoteSource::AlphaVantage => "alphavantage",
        }
    }
}

impl std::fmt::Display for QuoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuoteSource::Yahoo => write!(f, "Yahoo Finance"),
            QuoteSource::AlphaVantage => write!(f, "Alpha Vantage"),
        }
    }
}

/// Fixed historical reference points retained per symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RefPeriod {
    #[serde(rename = "1W")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "YTD")]
    YearToDate,
    #[serde(rename = "1Y")]
    OneYear,
    #[serde(rename = "2Y")]
    TwoYears,
}

impl RefPeriod {
    pub const ALL: [RefPeriod; 5] = [
        RefPeriod::OneWeek,
        RefPeriod::OneMonth,
        RefPeriod::YearToDate,
        RefPeriod::OneYear,
        RefPeriod::TwoYears,
    ];

    /// Days back from "now" for rolling periods. `None` for YTD, whose
    /// cutoff is the start of the current calendar year.
    pub fn days_back(&self) -> Option<i64> {
        match self {
            RefPeriod::OneWeek => Some(7),
            RefPeriod::OneMonth => Some(30),
            RefPeriod::YearToDate => None,
            RefPeriod::OneYear => Some(365),
            RefPeriod::TwoYears => Some(730),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RefPeriod::OneWeek => "1W",
            RefPeriod::OneMonth => "1M",
            RefPeriod::YearToDate => "YTD",
            RefPeriod::OneYear => "1Y",
            RefPeriod::TwoYears => "2Y",
        }
    }
}

impl std::fmt::Display for RefPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Shape of a quote request. Intraday and daily snapshots of the same
/// symbol are cached under different keys with different TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteKind {
    Daily,
    Intraday,
}

impl QuoteKind {
    pub fn is_intraday(&self) -> bool {
        matches!(self, QuoteKind::Intraday)
    }

    /// Quote store key for a symbol under this request shape.
    pub fn cache_key(&self, symbol: &str) -> String {
        let symbol = symbol.trim().to_uppercase();
        match self {
            QuoteKind::Daily => symbol,
            QuoteKind::Intraday => format!("{symbol}:intraday"),
        }
    }
}

/// The canonical per-symbol market snapshot. Every provider payload is
/// normalized into this one schema.
///
/// Prices are in `currency`, the instrument's trading currency, which is
/// not necessarily the user's display currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub price: f64,
    pub prev_close: Option<f64>,
    pub open: Option<f64>,
    pub change: Option<f64>,
    pub change_pct: Option<f64>,
    /// Closes nearest each reference cutoff. A period with no nearby data
    /// point is absent, never zero-filled.
    pub refs: BTreeMap<RefPeriod, f64>,
    pub currency: String,
    /// Trading day the snapshot reflects; distinct from `fetched_at`.
    pub market_date: NaiveDate,
    pub source: QuoteSource,
    pub fetched_at: DateTime<Utc>,
    /// Set when served past its TTL because a refresh failed.
    #[serde(default)]
    pub stale: bool,
}

impl Quote {
    /// Recompute `change` / `change_pct` from `price` and `prev_close`.
    pub fn with_derived_change(mut self) -> Self {
        match self.prev_close {
            Some(prev) if prev != 0.0 => {
                let change = self.price - prev;
                self.change = Some(change);
                self.change_pct = Some(change / prev * 100.0);
            }
            _ => {
                self.change = None;
                self.change_pct = None;
            }
        }
        self
    }

    pub fn reference(&self, period: RefPeriod) -> Option<f64> {
        self.refs.get(&period).copied()
    }

    pub fn mark_stale(mut self) -> Self {
        self.stale = true;
        self
    }
}

/// Partitioned outcome of a batch quote request. A symbol appears in
/// exactly one of the two maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchQuotes {
    pub results: HashMap<String, Quote>,
    pub errors: HashMap<String, String>,
}

impl BatchQuotes {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn stale_symbols(&self) -> Vec<&str> {
        let mut stale: Vec<&str> = self
            .results
            .values()
            .filter(|q| q.stale)
            .map(|q| q.symbol.as_str())
            .collect();
        stale.sort_unstable();
        stale
    }
}

/// Result of a single historical point lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalPoint {
    pub symbol: String,
    pub price: f64,
    pub currency: String,
    /// Trading day actually used
    pub date: NaiveDate,
    pub requested_date: NaiveDate,
    /// Calendar days between requested and actual trading day
    pub days_off: i64,
    /// `false` when the request was for today or later and the current
    /// price was returned instead
    pub is_historical: bool,
    /// Cumulative split ratio applied to recover the as-traded price
    pub split_factor: f64,
}

impl HistoricalPoint {
    /// Weekends and holidays put the match a few days off; anything beyond
    /// that is a data gap rather than an approximate match.
    pub fn is_approximate(&self) -> bool {
        self.days_off > 0 && self.days_off <= 5
    }

    pub fn is_gap(&self) -> bool {
        self.days_off > 5
    }
}

/// A cash dividend paid by an instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DividendEvent {
    pub date: NaiveDate,
    pub amount: f64,
}

/// A corporate split, e.g. 4:1 has numerator 4 and denominator 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitEvent {
    pub date: NaiveDate,
    pub numerator: f64,
    pub denominator: f64,
}

impl SplitEvent {
    pub fn ratio(&self) -> f64 {
        if self.denominator == 0.0 {
            1.0
        } else {
            self.numerator / self.denominator
        }
    }
}

/// A symbol search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMatch {
    pub symbol: String,
    pub name: String,
    pub exchange: String,
    pub quote_type: String,
    pub score: f64,
}
