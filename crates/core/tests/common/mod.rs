// ═══════════════════════════════════════════════════════════════════
// Shared fixtures: mock fetchers, FX provider, chart payload builder
// ═══════════════════════════════════════════════════════════════════

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use folio_core::clock::{ManualClock, SharedClock};
use folio_core::errors::UpstreamError;
use folio_core::models::payload::{
    ChartDividend, ChartEvents, ChartQuoteSeries, ChartResult, ChartSplit, RawPayload,
};
use folio_core::models::quote::{QuoteSource, SymbolMatch};
use folio_core::providers::registry::FetcherRegistry;
use folio_core::providers::traits::{ChartRequest, FxRateProvider, QuoteFetcher};
use folio_core::storage::store::{MemoryStore, SharedStore};

// ── Dates & clocks ──────────────────────────────────────────────────

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, mi, 0).unwrap()
}

/// A settable clock plus the shared handle services take.
pub fn clock_at(y: i32, m: u32, d: u32, h: u32, mi: u32) -> (Arc<ManualClock>, SharedClock) {
    let clock = Arc::new(ManualClock::at(at(y, m, d, h, mi)));
    let shared: SharedClock = clock.clone();
    (clock, shared)
}

pub fn memory_store() -> SharedStore {
    Arc::new(MemoryStore::new())
}

/// Unix timestamp of a trading day's bar (14:30 UTC).
pub fn bar_ts(day: NaiveDate) -> i64 {
    day.and_hms_opt(14, 30, 0).unwrap().and_utc().timestamp()
}

// ── Chart payload builder ───────────────────────────────────────────

pub struct ChartBuilder {
    result: ChartResult,
}

impl ChartBuilder {
    pub fn new(symbol: &str, currency: &str) -> Self {
        let mut result = ChartResult::default();
        result.meta.symbol = Some(symbol.to_string());
        result.meta.currency = Some(currency.to_string());
        result.meta.gmt_offset = Some(0);
        result.indicators.quote.push(ChartQuoteSeries::default());
        Self { result }
    }

    pub fn close(mut self, day: NaiveDate, close: f64) -> Self {
        self.result.timestamp.push(bar_ts(day));
        let series = &mut self.result.indicators.quote[0];
        series.open.push(Some(close));
        series.close.push(Some(close));
        self
    }

    pub fn closes(self, days: &[(NaiveDate, f64)]) -> Self {
        days.iter().fold(self, |b, (d, c)| b.close(*d, *c))
    }

    /// A bar the provider returned with a null close.
    pub fn gap(mut self, day: NaiveDate) -> Self {
        self.result.timestamp.push(bar_ts(day));
        let series = &mut self.result.indicators.quote[0];
        series.open.push(None);
        series.close.push(None);
        self
    }

    pub fn price(mut self, price: f64) -> Self {
        self.result.meta.regular_market_price = Some(price);
        self
    }

    pub fn previous_close(mut self, price: f64) -> Self {
        self.result.meta.chart_previous_close = Some(price);
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.result.meta.long_name = Some(name.to_string());
        self
    }

    pub fn split(mut self, day: NaiveDate, numerator: f64, denominator: f64) -> Self {
        let ts = bar_ts(day);
        self.events().splits.insert(
            ts.to_string(),
            ChartSplit {
                date: ts,
                numerator,
                denominator,
            },
        );
        self
    }

    pub fn dividend(mut self, day: NaiveDate, amount: f64) -> Self {
        let ts = bar_ts(day);
        self.events()
            .dividends
            .insert(ts.to_string(), ChartDividend { amount, date: ts });
        self
    }

    pub fn build(self) -> RawPayload {
        RawPayload::Yahoo(self.result)
    }

    fn events(&mut self) -> &mut ChartEvents {
        self.result.events.get_or_insert_with(ChartEvents::default)
    }
}

/// Daily closes for consecutive weekdays ending on `last`, oldest first.
pub fn weekday_series(last: NaiveDate, closes: &[f64]) -> Vec<(NaiveDate, f64)> {
    use chrono::{Datelike, Weekday};
    let mut days = Vec::new();
    let mut day = last;
    while days.len() < closes.len() {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(day);
        }
        day = day.pred_opt().unwrap();
    }
    days.reverse();
    days.into_iter().zip(closes.iter().copied()).collect()
}

// ── Mock quote fetcher ──────────────────────────────────────────────

/// Serves canned payloads, counts calls, can be switched to failing.
pub struct MockFetcher {
    source: QuoteSource,
    payloads: Mutex<HashMap<String, RawPayload>>,
    calls: AtomicUsize,
    failing: AtomicBool,
    delay: Option<Duration>,
    limit: Option<u32>,
    requests: Mutex<Vec<ChartRequest>>,
}

impl MockFetcher {
    pub fn new(source: QuoteSource) -> Self {
        Self {
            source,
            payloads: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            delay: None,
            limit: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn yahoo() -> Self {
        Self::new(QuoteSource::Yahoo)
    }

    pub fn with_payload(self, symbol: &str, payload: RawPayload) -> Self {
        self.set_payload(symbol, payload);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn set_payload(&self, symbol: &str, payload: RawPayload) {
        self.payloads
            .lock()
            .unwrap()
            .insert(symbol.to_uppercase(), payload);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChartRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuoteFetcher for MockFetcher {
    fn source(&self) -> QuoteSource {
        self.source
    }

    async fn fetch_raw(
        &self,
        symbol: &str,
        request: ChartRequest,
    ) -> Result<RawPayload, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(UpstreamError::http("Mock", "upstream down"));
        }
        self.payloads
            .lock()
            .unwrap()
            .get(&symbol.to_uppercase())
            .cloned()
            .ok_or_else(|| UpstreamError::not_found("Mock", format!("unknown symbol {symbol}")))
    }

    fn daily_limit(&self) -> Option<u32> {
        self.limit
    }

    async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>, UpstreamError> {
        let query = query.to_uppercase();
        let mut hits: Vec<SymbolMatch> = self
            .payloads
            .lock()
            .unwrap()
            .keys()
            .filter(|s| s.contains(&query))
            .map(|s| SymbolMatch {
                symbol: s.clone(),
                name: format!("{s} Inc."),
                exchange: "NMS".into(),
                quote_type: "EQUITY".into(),
                score: 1.0,
            })
            .collect();
        hits.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(hits)
    }
}

pub fn registry_with(fetchers: &[Arc<MockFetcher>]) -> FetcherRegistry {
    let mut registry = FetcherRegistry::new();
    for fetcher in fetchers {
        registry.register(fetcher.clone());
    }
    registry
}

// ── Mock FX provider ────────────────────────────────────────────────

pub struct MockFx {
    latest: Mutex<BTreeMap<String, f64>>,
    historical: Mutex<HashMap<(NaiveDate, String, String), f64>>,
    failing: AtomicBool,
    latest_calls: AtomicUsize,
    historical_calls: AtomicUsize,
}

impl MockFx {
    pub fn new() -> Self {
        Self {
            latest: Mutex::new(BTreeMap::new()),
            historical: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            latest_calls: AtomicUsize::new(0),
            historical_calls: AtomicUsize::new(0),
        }
    }

    /// Every major currency at 1.0 except those given.
    pub fn with_majors(overrides: &[(&str, f64)]) -> Self {
        let fx = Self::new();
        for code in folio_core::models::fx::MAJOR_CURRENCIES {
            fx.set_latest(code, 1.0);
        }
        for (code, rate) in overrides {
            fx.set_latest(code, *rate);
        }
        fx
    }

    pub fn set_latest(&self, code: &str, rate: f64) {
        self.latest.lock().unwrap().insert(code.to_string(), rate);
    }

    pub fn remove_latest(&self, code: &str) {
        self.latest.lock().unwrap().remove(code);
    }

    pub fn set_historical(&self, day: NaiveDate, from: &str, to: &str, rate: f64) {
        self.historical
            .lock()
            .unwrap()
            .insert((day, from.to_string(), to.to_string()), rate);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }

    pub fn historical_calls(&self) -> usize {
        self.historical_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FxRateProvider for MockFx {
    fn name(&self) -> &str {
        "MockFx"
    }

    async fn latest(
        &self,
        _base: &str,
        symbols: &[&str],
    ) -> Result<BTreeMap<String, f64>, UpstreamError> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(UpstreamError::timeout("MockFx", "no answer"));
        }
        let latest = self.latest.lock().unwrap();
        Ok(symbols
            .iter()
            .filter_map(|s| latest.get(*s).map(|r| (s.to_string(), *r)))
            .collect())
    }

    async fn historical(
        &self,
        date: NaiveDate,
        from: &str,
        to: &str,
    ) -> Result<f64, UpstreamError> {
        self.historical_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(UpstreamError::timeout("MockFx", "no answer"));
        }
        self.historical
            .lock()
            .unwrap()
            .get(&(date, from.to_string(), to.to_string()))
            .copied()
            .ok_or_else(|| UpstreamError::not_found("MockFx", format!("{from}/{to} on {date}")))
    }
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}
