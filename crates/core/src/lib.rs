pub mod clock;
pub mod errors;
pub mod models;
pub mod parser;
pub mod providers;
pub mod services;
pub mod storage;

use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;

use clock::{SharedClock, SystemClock};
use errors::CoreError;
use models::{
    cache::{CacheStats, ProviderUsage},
    chart::{Correlation, Sparkline},
    fx::{Exactness, FxTable},
    quote::{BatchQuotes, DividendEvent, HistoricalPoint, Quote, QuoteSource, SymbolMatch},
    settings::{normalize_currency_code, Settings},
    transaction::{Ledger, Position, Transaction, TransactionDraft},
    valuation::{DisplayValuation, PerformancePeriod, ValuationSnapshot},
};
use providers::{
    frankfurter::FrankfurterProvider, registry::FetcherRegistry, traits::FxRateProvider,
};
use services::{
    chart_service::ChartService, fx_service::FxService, portfolio_service::PortfolioService,
    quote_service::QuoteService, valuation_service::ValuationService,
};
use storage::store::{FileStore, MemoryStore, SharedStore};

/// Default number of closes in a sparkline.
const DEFAULT_SPARKLINE_DAYS: usize = 30;

/// Main entry point for the folio core library.
/// Holds the transaction ledger and all services needed to value it.
#[must_use]
pub struct FolioTracker {
    settings: Settings,
    ledger: Ledger,
    clock: SharedClock,
    quote_service: QuoteService,
    fx_service: FxService,
    portfolio_service: PortfolioService,
    valuation_service: ValuationService,
    chart_service: ChartService,
    /// Tracks whether the ledger changed since it was last taken out.
    dirty: bool,
}

impl std::fmt::Debug for FolioTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolioTracker")
            .field("transactions", &self.ledger.len())
            .field("settings", &self.settings)
            .field("sources", &self.quote_service.sources())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl FolioTracker {
    /// Build from settings with the default providers and the system clock.
    /// The store is file-backed when `store_path` is set, in memory otherwise.
    pub fn new(settings: Settings) -> Result<Self, CoreError> {
        let store: SharedStore = match &settings.store_path {
            Some(path) => Arc::new(FileStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        let clock: SharedClock = Arc::new(SystemClock);
        let registry = FetcherRegistry::new_with_defaults(&settings, store.clone(), clock.clone());
        let fx_provider = Arc::new(FrankfurterProvider::new(settings.upstream_timeout_secs));
        Ok(Self::with_components(settings, store, clock, registry, fx_provider))
    }

    /// Build from settings read from the environment (and `.env`).
    pub fn from_env() -> Result<Self, CoreError> {
        Self::new(Settings::from_env())
    }

    /// Wire explicit components: custom stores, clocks or providers.
    pub fn with_components(
        settings: Settings,
        store: SharedStore,
        clock: SharedClock,
        registry: FetcherRegistry,
        fx_provider: Arc<dyn FxRateProvider>,
    ) -> Self {
        let quote_service = QuoteService::new(
            registry,
            store.clone(),
            clock.clone(),
            settings.quote_ttl_override_minutes,
        );
        let fx_service = FxService::new(
            fx_provider,
            store.clone(),
            clock.clone(),
            settings.fx_ttl_minutes,
        );
        let chart_service = ChartService::new(store, clock.clone());
        Self {
            settings,
            ledger: Ledger::new(),
            clock,
            quote_service,
            fx_service,
            portfolio_service: PortfolioService::new(),
            valuation_service: ValuationService::new(),
            chart_service,
            dirty: false,
        }
    }

    // ── Quotes ──────────────────────────────────────────────────────

    /// Daily quotes for a batch of symbols, partitioned into results and
    /// per-symbol errors.
    pub async fn get_quotes<S: AsRef<str>>(
        &self,
        symbols: &[S],
        source: QuoteSource,
        force: bool,
    ) -> Result<BatchQuotes, CoreError> {
        self.quote_service.get_quotes(symbols, source, force).await
    }

    /// Intraday snapshot of one symbol.
    pub async fn get_intraday_quote(
        &self,
        symbol: &str,
        source: QuoteSource,
        force: bool,
    ) -> Result<Quote, CoreError> {
        self.quote_service.get_intraday_quote(symbol, source, force).await
    }

    /// Price of `symbol` on `date` from the primary source.
    pub async fn lookup_on_date(
        &self,
        symbol: &str,
        date: NaiveDate,
        split_adjusted: bool,
    ) -> Result<HistoricalPoint, CoreError> {
        self.quote_service
            .lookup_on_date(symbol, date, QuoteSource::Yahoo, split_adjusted)
            .await
    }

    pub async fn dividends(
        &self,
        symbol: &str,
        since: NaiveDate,
    ) -> Result<Vec<DividendEvent>, CoreError> {
        self.quote_service
            .dividends(symbol, since, QuoteSource::Yahoo)
            .await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>, CoreError> {
        self.quote_service.search(query).await
    }

    /// Today's call budget of a quota-limited provider.
    pub async fn provider_usage(
        &self,
        source: QuoteSource,
    ) -> Result<Option<ProviderUsage>, CoreError> {
        self.quote_service.usage(source).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.quote_service.stats()
    }

    // ── FX ──────────────────────────────────────────────────────────

    /// USD→major-currency table with its live/fallback flag.
    pub async fn fx_table(&self) -> Result<FxTable, CoreError> {
        self.fx_service.fx_table().await
    }

    pub async fn historical_rate(
        &self,
        date: NaiveDate,
        from: &str,
        to: &str,
    ) -> Result<f64, CoreError> {
        self.fx_service.historical_rate(date, from, to).await
    }

    // ── Transactions ────────────────────────────────────────────────

    /// Record a BUY/SELL. The USD unit price is fixed now from the rate of
    /// the transaction date and never recomputed afterwards.
    ///
    /// Returns the stored transaction and how exact its USD price is.
    pub async fn record_transaction(
        &mut self,
        draft: TransactionDraft,
    ) -> Result<(Transaction, Exactness), CoreError> {
        self.portfolio_service.validate_draft(&self.ledger, &draft)?;

        let converted = self
            .fx_service
            .convert_to_usd(draft.price, &draft.currency, draft.date)
            .await;
        let tx = draft.into_transaction(converted.amount);
        self.portfolio_service
            .add_transaction(&mut self.ledger, tx.clone())?;
        self.dirty = true;
        Ok((tx, converted.exactness))
    }

    pub fn remove_transaction(&mut self, id: uuid::Uuid) -> Result<Transaction, CoreError> {
        let removed = self
            .portfolio_service
            .remove_transaction(&mut self.ledger, id)?;
        self.dirty = true;
        Ok(removed)
    }

    /// Transactions of one portfolio (or all when `None`), newest first.
    pub fn transactions(&self, portfolio_id: Option<&str>) -> Vec<&Transaction> {
        self.portfolio_service.transactions(&self.ledger, portfolio_id)
    }

    pub fn positions(&self) -> Vec<Position> {
        self.portfolio_service.positions(&self.ledger)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Replace the ledger, e.g. with transactions loaded by the host.
    pub fn load_ledger(&mut self, ledger: Ledger) {
        self.ledger = ledger;
        self.ledger.transactions.sort_by_key(|t| t.date);
        self.dirty = false;
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    // ── Valuation ───────────────────────────────────────────────────

    /// Value every position (per portfolio) for `period`.
    pub async fn valuation(
        &self,
        period: PerformancePeriod,
        source: QuoteSource,
        force: bool,
    ) -> Result<ValuationSnapshot, CoreError> {
        let positions = self.positions();
        let symbols: Vec<String> = positions
            .iter()
            .map(|p| p.symbol.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let batch = self.quote_service.get_quotes(&symbols, source, force).await?;
        for (symbol, err) in &batch.errors {
            log::warn!("valuation without a quote for {symbol}: {err}");
        }
        let currencies: Vec<&str> = batch
            .results
            .values()
            .map(|q| q.currency.as_str())
            .collect();
        let fx = self.fx_service.fx_table_for(&currencies).await?;

        Ok(self
            .valuation_service
            .value_positions(&positions, &batch.results, &fx, period))
    }

    /// Valuation with each symbol merged across portfolios.
    pub async fn merged_valuation(
        &self,
        period: PerformancePeriod,
        source: QuoteSource,
        force: bool,
    ) -> Result<ValuationSnapshot, CoreError> {
        let snapshot = self.valuation(period, source, force).await?;
        Ok(self.valuation_service.merge_across_portfolios(&snapshot))
    }

    /// Render a snapshot in the configured display currency.
    pub async fn display_valuation(
        &self,
        snapshot: &ValuationSnapshot,
    ) -> Result<DisplayValuation, CoreError> {
        let fx = self
            .fx_service
            .fx_table_for(&[self.settings.display_currency.as_str()])
            .await?;
        self.valuation_service
            .to_display(snapshot, &fx, &self.settings.display_currency)
    }

    // ── Charts ──────────────────────────────────────────────────────

    /// Recent daily closes of a symbol from the raw-payload cache.
    pub async fn sparkline(
        &self,
        symbol: &str,
        source: QuoteSource,
        days: Option<usize>,
    ) -> Result<Sparkline, CoreError> {
        self.chart_service
            .sparkline(symbol, source, days.unwrap_or(DEFAULT_SPARKLINE_DAYS))
            .await
    }

    /// Correlation of two symbols' daily returns. Quotes both first so
    /// their series are cached.
    pub async fn correlation(
        &self,
        left: &str,
        right: &str,
        source: QuoteSource,
    ) -> Result<Correlation, CoreError> {
        let batch = self
            .quote_service
            .get_quotes(&[left, right], source, false)
            .await?;
        if let Some((symbol, err)) = batch.errors.iter().next() {
            return Err(CoreError::ValidationError(format!(
                "No series for {symbol}: {err}"
            )));
        }
        self.chart_service.correlation(left, right, source).await
    }

    // ── Settings ────────────────────────────────────────────────────

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Change the display currency (3-letter code).
    pub fn set_display_currency(&mut self, currency: &str) -> Result<(), CoreError> {
        let code = normalize_currency_code(currency).ok_or_else(|| {
            CoreError::ValidationError(format!("Invalid currency code: {currency}"))
        })?;
        self.settings.display_currency = code;
        Ok(())
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }
}
