use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::clock::SharedClock;
use crate::errors::{CoreError, UpstreamError, UpstreamErrorKind};
use crate::models::cache::ProviderUsage;
use crate::models::payload::{
    AlphaVantageBundle, AvDailyBar, AvGlobalQuote, AvOverview, RawPayload,
};
use crate::models::quote::QuoteSource;
use crate::storage::store::SharedStore;
use super::traits::{ChartRequest, QuoteFetcher};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER: &str = "Alpha Vantage";

/// Alpha Vantage API fetcher (alternate source).
///
/// - **Free tier**: 25 requests/day across ALL endpoints.
/// - **Requires**: API key (settings key "alphavantage").
/// - **Calls per symbol**: quote, compact daily series, company overview.
///
/// Every call is counted against a daily budget kept in the market store,
/// so the count survives restarts and can be shown to the user.
pub struct AlphaVantageFetcher {
    client: Client,
    api_key: String,
    daily_limit: u32,
    timeout: Duration,
    store: SharedStore,
    clock: SharedClock,
}

impl AlphaVantageFetcher {
    pub fn new(
        api_key: String,
        daily_limit: u32,
        timeout_secs: u64,
        store: SharedStore,
        clock: SharedClock,
    ) -> Self {
        let timeout = Duration::from_secs(timeout_secs.max(1));
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
            daily_limit,
            timeout,
            store,
            clock,
        }
    }

    /// Today's call budget.
    pub async fn usage(&self) -> Result<ProviderUsage, CoreError> {
        let date = self.clock.today();
        let used = self.store.usage(QuoteSource::AlphaVantage.id(), date).await?;
        Ok(ProviderUsage {
            provider: QuoteSource::AlphaVantage.id().to_string(),
            date,
            used,
            limit: self.daily_limit,
        })
    }

    /// Reserve one call from today's budget.
    async fn consume_budget(&self) -> Result<(), UpstreamError> {
        let usage = self.usage().await.map_err(store_failure)?;
        if usage.is_exhausted() {
            return Err(UpstreamError::rate_limited(
                PROVIDER,
                format!("daily budget of {} calls used", usage.limit),
            ));
        }
        self.store
            .increment_usage(QuoteSource::AlphaVantage.id(), usage.date)
            .await
            .map_err(store_failure)?;
        Ok(())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        function: &str,
        symbol: &str,
        extra: &[(&str, &str)],
    ) -> Result<T, UpstreamError> {
        self.consume_budget().await?;

        let mut query: Vec<(&str, &str)> = vec![
            ("function", function),
            ("symbol", symbol),
            ("apikey", self.api_key.as_str()),
        ];
        query.extend_from_slice(extra);

        let send = async {
            let response = self
                .client
                .get(BASE_URL)
                .query(&query)
                .send()
                .await
                .map_err(|e| UpstreamError::from_transport(PROVIDER, &e))?;
            let status = response.status().as_u16();
            if let Some(kind) = UpstreamErrorKind::from_status(status) {
                return Err(UpstreamError::new(
                    kind,
                    PROVIDER,
                    format!("{function} {symbol}: HTTP {status}"),
                ));
            }
            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| UpstreamError::from_transport(PROVIDER, &e))
        };

        let body = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| UpstreamError::timeout(PROVIDER, format!("{function} {symbol}")))??;

        decode_body(function, symbol, body)
    }
}

// ── Alpha Vantage API response types ────────────────────────────────

#[derive(Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<AvGlobalQuote>,
}

#[derive(Deserialize)]
struct TimeSeriesResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<BTreeMap<String, AvDailyBar>>,
}

/// Classify an Alpha Vantage body and decode it.
///
/// Quota exhaustion arrives as HTTP 200 with a `Note` or `Information`
/// field; unknown symbols as an `Error Message` field.
pub fn decode_body<T: DeserializeOwned>(
    function: &str,
    symbol: &str,
    body: serde_json::Value,
) -> Result<T, UpstreamError> {
    for field in ["Note", "Information"] {
        if let Some(msg) = body.get(field).and_then(|v| v.as_str()) {
            return Err(UpstreamError::rate_limited(PROVIDER, msg.to_string()));
        }
    }
    if let Some(msg) = body.get("Error Message").and_then(|v| v.as_str()) {
        return Err(UpstreamError::not_found(
            PROVIDER,
            format!("{function} {symbol}: {msg}"),
        ));
    }
    serde_json::from_value(body).map_err(|e| {
        UpstreamError::malformed(PROVIDER, format!("{function} {symbol}: {e}"))
    })
}

fn store_failure(e: CoreError) -> UpstreamError {
    UpstreamError::http(PROVIDER, format!("usage counter unavailable: {e}"))
}

#[async_trait]
impl QuoteFetcher for AlphaVantageFetcher {
    fn source(&self) -> QuoteSource {
        QuoteSource::AlphaVantage
    }

    fn daily_limit(&self) -> Option<u32> {
        Some(self.daily_limit)
    }

    /// The compact series covers about 100 trading days whatever the
    /// request shape, so every request gets the same three calls.
    async fn fetch_raw(
        &self,
        symbol: &str,
        _request: ChartRequest,
    ) -> Result<RawPayload, UpstreamError> {
        let symbol = symbol.trim().to_uppercase();
        log::info!("fetching {symbol} from {PROVIDER}");

        let quote: GlobalQuoteResponse = self.call("GLOBAL_QUOTE", &symbol, &[]).await?;
        let quote = quote
            .global_quote
            .filter(|q| q.price.is_some())
            .ok_or_else(|| UpstreamError::not_found(PROVIDER, format!("No quote for {symbol}")))?;

        let mut bundle = AlphaVantageBundle {
            quote: Some(quote),
            ..Default::default()
        };

        // The quote alone is usable; a failed secondary call degrades the
        // snapshot instead of failing it.
        match self
            .call::<TimeSeriesResponse>("TIME_SERIES_DAILY", &symbol, &[("outputsize", "compact")])
            .await
        {
            Ok(series) => bundle.series = series.time_series.unwrap_or_default(),
            Err(e) => log::warn!("{symbol}: daily series unavailable: {e}"),
        }
        match self.call::<AvOverview>("OVERVIEW", &symbol, &[]).await {
            Ok(overview) => bundle.overview = Some(overview),
            Err(e) => log::warn!("{symbol}: overview unavailable: {e}"),
        }

        Ok(RawPayload::AlphaVantage(bundle))
    }
}
