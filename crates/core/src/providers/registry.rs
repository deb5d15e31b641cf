use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clock::SharedClock;
use crate::errors::CoreError;
use crate::models::quote::QuoteSource;
use crate::models::settings::Settings;
use crate::storage::store::SharedStore;

use super::alphavantage::AlphaVantageFetcher;
use super::traits::QuoteFetcher;
use super::yahoo::YahooChartFetcher;

/// Registry of the configured quote fetchers, keyed by source.
///
/// Provider selection is made per batch by the caller; the registry only
/// answers "which fetcher serves this source".
#[derive(Clone, Default)]
pub struct FetcherRegistry {
    fetchers: BTreeMap<QuoteSource, Arc<dyn QuoteFetcher>>,
}

impl std::fmt::Debug for FetcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetcherRegistry")
            .field("sources", &self.sources())
            .finish()
    }
}

impl FetcherRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every provider the settings allow.
    ///
    /// Yahoo needs no key and is always present; Alpha Vantage is only
    /// registered when a key is configured.
    pub fn new_with_defaults(
        settings: &Settings,
        store: SharedStore,
        clock: SharedClock,
    ) -> Self {
        let mut registry = Self::new();

        match YahooChartFetcher::new(settings.upstream_timeout_secs) {
            Ok(yahoo) => registry.register(Arc::new(yahoo)),
            Err(e) => log::error!("Yahoo fetcher unavailable: {e}"),
        }

        if let Some(key) = settings.api_key(QuoteSource::AlphaVantage.id()) {
            registry.register(Arc::new(AlphaVantageFetcher::new(
                key.to_string(),
                settings.alphavantage_daily_limit,
                settings.upstream_timeout_secs,
                store,
                clock,
            )));
        }

        registry
    }

    /// Register a fetcher, replacing any previous one for the same source.
    pub fn register(&mut self, fetcher: Arc<dyn QuoteFetcher>) {
        self.fetchers.insert(fetcher.source(), fetcher);
    }

    pub fn get(&self, source: QuoteSource) -> Result<Arc<dyn QuoteFetcher>, CoreError> {
        self.fetchers
            .get(&source)
            .cloned()
            .ok_or_else(|| CoreError::NoProvider(source.to_string()))
    }

    pub fn sources(&self) -> Vec<QuoteSource> {
        self.fetchers.keys().copied().collect()
    }
}
