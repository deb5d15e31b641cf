use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::quote::{Quote, QuoteSource};

/// A quote store row: the parsed quote plus the bookkeeping the
/// orchestrator needs for its freshness decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredQuote {
    pub quote: Quote,
    pub source: QuoteSource,
    pub market_date: NaiveDate,
    /// Wall clock of the last successful write, not the market date.
    pub updated_at: DateTime<Utc>,
}

/// A raw provider response kept for chart regeneration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPayload {
    pub body: String,
    pub updated_at: DateTime<Utc>,
}

/// A cached FX rate. Live pairs are keyed by the target currency
/// (`EUR` = USD→EUR); historical pairs by `hist_{date}_{from}_{to}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FxRateEntry {
    pub rate: f64,
    pub updated_at: DateTime<Utc>,
}

/// Daily call budget status for a quota-limited provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub provider: String,
    pub date: NaiveDate,
    pub used: u32,
    pub limit: u32,
}

impl ProviderUsage {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.limit
    }
}

/// Counters for one quote service instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale_served: u64,
    pub upstream_calls: u64,
    pub dedup_joins: u64,
}
