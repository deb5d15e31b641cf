use chrono::{Duration, NaiveDate};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::SharedClock;
use crate::errors::CoreError;
use crate::models::cache::{CacheStats, ProviderUsage, StoredPayload, StoredQuote};
use crate::models::payload::RawPayload;
use crate::models::quote::{
    BatchQuotes, DividendEvent, HistoricalPoint, Quote, QuoteKind, QuoteSource, SymbolMatch,
};
use crate::parser;
use crate::providers::registry::FetcherRegistry;
use crate::providers::traits::{ChartRequest, QuoteFetcher};
use crate::storage::store::SharedStore;

use super::freshness;
use super::inflight::InFlight;

/// Days fetched before a lookup date so a weekend or holiday still has a
/// trading day at or before it.
const LOOKUP_LEAD_DAYS: i64 = 10;

#[derive(Debug, Default)]
struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_served: AtomicU64,
    upstream_calls: AtomicU64,
    dedup_joins: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
            upstream_calls: self.upstream_calls.load(Ordering::Relaxed),
            dedup_joins: self.dedup_joins.load(Ordering::Relaxed),
        }
    }
}

/// Serves quotes from the market store when fresh enough, fetching from the
/// selected provider otherwise.
///
/// Cache strategy:
/// - **Fresh entry**: served as is, no upstream call.
/// - **Missing, expired or forced**: fetched once per key however many
///   callers ask concurrently, parsed, persisted, returned.
/// - **Fetch failed**: the last persisted quote is served marked `stale`.
/// - **Historical lookups** for past dates never change and are cached
///   forever.
pub struct QuoteService {
    registry: FetcherRegistry,
    store: SharedStore,
    clock: SharedClock,
    ttl_override: Option<u32>,
    quotes: InFlight<Quote>,
    windows: InFlight<RawPayload>,
    stats: Arc<StatsCounters>,
}

impl QuoteService {
    pub fn new(
        registry: FetcherRegistry,
        store: SharedStore,
        clock: SharedClock,
        ttl_override: Option<u32>,
    ) -> Self {
        Self {
            registry,
            store,
            clock,
            ttl_override,
            quotes: InFlight::new(),
            windows: InFlight::new(),
            stats: Arc::new(StatsCounters::default()),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    pub fn sources(&self) -> Vec<QuoteSource> {
        self.registry.sources()
    }

    /// Keys with an upstream fetch currently running.
    pub fn in_flight(&self) -> usize {
        self.quotes.len() + self.windows.len()
    }

    // ── Batch quotes ────────────────────────────────────────────────

    /// Daily quotes for many symbols from one provider.
    ///
    /// Each symbol ends up in exactly one of `results` / `errors`; a failing
    /// symbol never aborts the batch. Only an unconfigured provider fails
    /// the whole request.
    pub async fn get_quotes<S: AsRef<str>>(
        &self,
        symbols: &[S],
        source: QuoteSource,
        force: bool,
    ) -> Result<BatchQuotes, CoreError> {
        self.registry.get(source)?;

        let unique: BTreeSet<String> = symbols
            .iter()
            .map(|s| s.as_ref().trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let outcomes = join_all(unique.into_iter().map(|symbol| async move {
            let outcome = self.get_quote(&symbol, source, QuoteKind::Daily, force).await;
            (symbol, outcome)
        }))
        .await;

        let mut batch = BatchQuotes::default();
        for (symbol, outcome) in outcomes {
            match outcome {
                Ok(quote) => {
                    batch.results.insert(symbol, quote);
                }
                Err(e) => {
                    batch.errors.insert(symbol, e.to_string());
                }
            }
        }
        Ok(batch)
    }

    /// Intraday snapshot: 5-minute series, short TTL, own cache key.
    pub async fn get_intraday_quote(
        &self,
        symbol: &str,
        source: QuoteSource,
        force: bool,
    ) -> Result<Quote, CoreError> {
        self.get_quote(symbol, source, QuoteKind::Intraday, force).await
    }

    /// One quote through the full cache → fetch → stale-fallback path.
    pub async fn get_quote(
        &self,
        symbol: &str,
        source: QuoteSource,
        kind: QuoteKind,
        force: bool,
    ) -> Result<Quote, CoreError> {
        let symbol = symbol.trim().to_uppercase();
        let key = kind.cache_key(&symbol);

        let cached = match self.store.get_quote(&key).await {
            Ok(entry) => entry,
            Err(e) => {
                log::error!("quote store read failed for {key}: {e}");
                None
            }
        };

        if !force {
            // A snapshot from another provider is not a hit for this one.
            if let Some(entry) = cached.as_ref().filter(|e| e.source == source) {
                let ttl = freshness::required_ttl_minutes(
                    self.clock.local_now(),
                    kind.is_intraday(),
                    self.ttl_override,
                );
                if freshness::is_fresh(entry.updated_at, ttl, self.clock.now()) {
                    StatsCounters::bump(&self.stats.hits);
                    log::debug!("cache hit for {key} (ttl {ttl}m)");
                    return Ok(entry.quote.clone());
                }
            }
        }
        StatsCounters::bump(&self.stats.misses);

        match self.fetch_quote(&symbol, source, kind).await {
            Ok(quote) => Ok(quote),
            Err(e) => match cached {
                Some(entry) => {
                    StatsCounters::bump(&self.stats.stale_served);
                    log::warn!("serving stale {key} from {}: {e}", entry.updated_at);
                    Ok(entry.quote.mark_stale())
                }
                None => Err(e),
            },
        }
    }

    /// Deduplicated fetch → parse → persist.
    async fn fetch_quote(
        &self,
        symbol: &str,
        source: QuoteSource,
        kind: QuoteKind,
    ) -> Result<Quote, CoreError> {
        let fetcher = self.registry.get(source)?;
        let request = ChartRequest::for_kind(kind);
        let dedup_key = format!("{}:{symbol}:{}", source.id(), request.dedup_tag());

        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let stats = Arc::clone(&self.stats);
        let owned_symbol = symbol.to_string();

        let (outcome, joined) = self.quotes.dedupe(&dedup_key, move || async move {
            StatsCounters::bump(&stats.upstream_calls);
            let raw = fetcher.fetch_raw(&owned_symbol, request).await?;
            let quote = parser::parse_quote(&owned_symbol, &raw, kind, clock.now())?;

            let now = clock.now();
            let entry = StoredQuote {
                quote: quote.clone(),
                source,
                market_date: quote.market_date,
                updated_at: now,
            };
            if let Err(e) = store.put_quote(&kind.cache_key(&owned_symbol), entry).await {
                log::error!("failed to persist quote {owned_symbol}: {e}");
            }
            match serde_json::to_string(&raw) {
                Ok(body) => {
                    let key = raw_key(source, &owned_symbol, kind);
                    if let Err(e) = store.put_raw(&key, StoredPayload { body, updated_at: now }).await {
                        log::error!("failed to persist raw payload {key}: {e}");
                    }
                }
                Err(e) => log::error!("failed to encode raw payload for {owned_symbol}: {e}"),
            }
            Ok::<Quote, CoreError>(quote)
        });

        if joined {
            StatsCounters::bump(&self.stats.dedup_joins);
            log::debug!("joined in-flight fetch {dedup_key}");
        }
        outcome.await
    }

    // ── Historical lookups ──────────────────────────────────────────

    /// Price of `symbol` on `date`, optionally split-adjusted back to the
    /// as-traded price. Failure is an error for the whole request.
    pub async fn lookup_on_date(
        &self,
        symbol: &str,
        date: NaiveDate,
        source: QuoteSource,
        split_adjusted: bool,
    ) -> Result<HistoricalPoint, CoreError> {
        let symbol = symbol.trim().to_uppercase();
        let today = self.clock.today();
        let cache_key = format!("hist:{}:{symbol}:{date}:{split_adjusted}", source.id());
        let cacheable = date < today;

        if cacheable {
            if let Ok(Some(entry)) = self.store.get_raw(&cache_key).await {
                match serde_json::from_str::<HistoricalPoint>(&entry.body) {
                    Ok(point) => {
                        StatsCounters::bump(&self.stats.hits);
                        return Ok(point);
                    }
                    Err(e) => log::warn!("discarding unreadable {cache_key}: {e}"),
                }
            }
        }
        StatsCounters::bump(&self.stats.misses);

        let raw = self.fetch_window(&symbol, date.min(today), today, source).await?;
        let point = parser::lookup_on_date(&symbol, &raw, date, today, split_adjusted)?;

        if cacheable {
            match serde_json::to_string(&point) {
                Ok(body) => {
                    let entry = StoredPayload {
                        body,
                        updated_at: self.clock.now(),
                    };
                    if let Err(e) = self.store.put_raw(&cache_key, entry).await {
                        log::error!("failed to persist {cache_key}: {e}");
                    }
                }
                Err(e) => log::error!("failed to encode {cache_key}: {e}"),
            }
        }
        Ok(point)
    }

    /// Cash dividends of `symbol` paid since `since`.
    pub async fn dividends(
        &self,
        symbol: &str,
        since: NaiveDate,
        source: QuoteSource,
    ) -> Result<Vec<DividendEvent>, CoreError> {
        let symbol = symbol.trim().to_uppercase();
        let today = self.clock.today();
        let raw = self.fetch_window(&symbol, since, today, source).await?;
        Ok(parser::dividends(&raw)
            .into_iter()
            .filter(|d| d.date >= since)
            .collect())
    }

    async fn fetch_window(
        &self,
        symbol: &str,
        from: NaiveDate,
        today: NaiveDate,
        source: QuoteSource,
    ) -> Result<RawPayload, CoreError> {
        let fetcher = self.registry.get(source)?;
        let request = ChartRequest::Window {
            period1: midnight_ts(from - Duration::days(LOOKUP_LEAD_DAYS)),
            period2: midnight_ts(today + Duration::days(1)),
        };
        let dedup_key = format!("{}:{symbol}:{}", source.id(), request.dedup_tag());
        let stats = Arc::clone(&self.stats);
        let owned_symbol = symbol.to_string();

        let (outcome, joined) = self.windows.dedupe(&dedup_key, move || async move {
            StatsCounters::bump(&stats.upstream_calls);
            fetcher
                .fetch_raw(&owned_symbol, request)
                .await
                .map_err(CoreError::from)
        });
        if joined {
            StatsCounters::bump(&self.stats.dedup_joins);
        }
        outcome.await
    }

    // ── Provider passthroughs ───────────────────────────────────────

    pub async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>, CoreError> {
        let fetcher: Arc<dyn QuoteFetcher> = self.registry.get(QuoteSource::Yahoo)?;
        Ok(fetcher.search(query).await?)
    }

    /// Today's call budget of a quota-limited provider; `None` for
    /// providers without a quota.
    pub async fn usage(&self, source: QuoteSource) -> Result<Option<ProviderUsage>, CoreError> {
        let fetcher = self.registry.get(source)?;
        let Some(limit) = fetcher.daily_limit() else {
            return Ok(None);
        };
        let date = self.clock.today();
        let used = self.store.usage(source.id(), date).await?;
        Ok(Some(ProviderUsage {
            provider: source.id().to_string(),
            date,
            used,
            limit,
        }))
    }
}

/// Raw payload cache key of a symbol's last fetched series.
pub fn raw_key(source: QuoteSource, symbol: &str, kind: QuoteKind) -> String {
    let tag = if kind.is_intraday() { "intraday" } else { "daily" };
    format!("{}:{}:{tag}", source.id(), symbol.trim().to_uppercase())
}

fn midnight_ts(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}
