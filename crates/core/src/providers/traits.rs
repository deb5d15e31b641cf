use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::errors::UpstreamError;
use crate::models::payload::RawPayload;
use crate::models::quote::{QuoteKind, QuoteSource, SymbolMatch};

/// Shape of a chart request. Providers that cannot honour a shape
/// exactly return the closest series they have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartRequest {
    /// Two years of daily bars: enough for every reference period.
    Daily,
    /// Today in 5-minute bars.
    Intraday,
    /// Daily bars between two unix timestamps, with dividend and split events.
    Window { period1: i64, period2: i64 },
}

impl ChartRequest {
    pub fn for_kind(kind: QuoteKind) -> Self {
        match kind {
            QuoteKind::Daily => ChartRequest::Daily,
            QuoteKind::Intraday => ChartRequest::Intraday,
        }
    }

    pub fn interval(&self) -> &'static str {
        match self {
            ChartRequest::Intraday => "5m",
            ChartRequest::Daily | ChartRequest::Window { .. } => "1d",
        }
    }

    /// Range label, `None` for windowed requests.
    pub fn range(&self) -> Option<&'static str> {
        match self {
            ChartRequest::Daily => Some("2y"),
            ChartRequest::Intraday => Some("1d"),
            ChartRequest::Window { .. } => None,
        }
    }

    /// Query string parameters for the request.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("interval", self.interval().to_string())];
        match self {
            ChartRequest::Window { period1, period2 } => {
                params.push(("period1", period1.to_string()));
                params.push(("period2", period2.to_string()));
                params.push(("events", "div|split".to_string()));
            }
            other => {
                if let Some(range) = other.range() {
                    params.push(("range", range.to_string()));
                }
                params.push(("events", "div|split".to_string()));
            }
        }
        params
    }

    /// Key fragment distinguishing request shapes in the dedup map.
    pub fn dedup_tag(&self) -> String {
        match self {
            ChartRequest::Daily => "daily".into(),
            ChartRequest::Intraday => "intraday".into(),
            ChartRequest::Window { period1, period2 } => format!("{period1}-{period2}"),
        }
    }
}

/// An upstream quote provider.
///
/// Implementations perform exactly the HTTP work; they never cache and
/// never parse into `Quote`. Failures are classified into
/// `UpstreamErrorKind`, never surfaced as raw status codes.
#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    fn source(&self) -> QuoteSource;

    /// Fetch the raw payload for one symbol.
    async fn fetch_raw(
        &self,
        symbol: &str,
        request: ChartRequest,
    ) -> Result<RawPayload, UpstreamError>;

    /// Calls allowed per day, for providers with a quota.
    fn daily_limit(&self) -> Option<u32> {
        None
    }

    /// Look up symbols matching free text. Providers without a search
    /// endpoint return nothing.
    async fn search(&self, _query: &str) -> Result<Vec<SymbolMatch>, UpstreamError> {
        Ok(Vec::new())
    }
}

/// An upstream FX rate source.
#[async_trait]
pub trait FxRateProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Latest rates: units of each of `symbols` per one `base`.
    async fn latest(
        &self,
        base: &str,
        symbols: &[&str],
    ) -> Result<BTreeMap<String, f64>, UpstreamError>;

    /// Units of `to` per one `from` on `date`.
    async fn historical(
        &self,
        date: NaiveDate,
        from: &str,
        to: &str,
    ) -> Result<f64, UpstreamError>;
}
