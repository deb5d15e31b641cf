use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use urlencoding::encode;

use crate::errors::{redact_query, CoreError, UpstreamError, UpstreamErrorKind};
use crate::models::payload::{ChartEnvelope, ChartResult, RawPayload};
use crate::models::quote::{QuoteSource, SymbolMatch};
use super::traits::{ChartRequest, QuoteFetcher};

const BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const PROVIDER: &str = "Yahoo Finance";

/// Browser identities rotated per call. The chart endpoint throttles
/// clients that repeat one agent at high volume.
pub const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// Round-robin over a fixed user-agent pool.
#[derive(Debug, Default)]
pub struct UserAgentPool {
    next: AtomicUsize,
}

impl UserAgentPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_agent(&self) -> &'static str {
        let idx = self.next.fetch_add(1, Ordering::Relaxed);
        USER_AGENTS[idx % USER_AGENTS.len()]
    }
}

/// Decode a chart endpoint body into its single result.
///
/// Yahoo reports unknown symbols inside the body (`chart.error.code ==
/// "Not Found"`), sometimes with a 200 status.
pub fn decode_chart(symbol: &str, body: &str) -> Result<ChartResult, UpstreamError> {
    let envelope: ChartEnvelope = serde_json::from_str(body).map_err(|e| {
        UpstreamError::malformed(PROVIDER, format!("Undecodable chart for {symbol}: {e}"))
    })?;

    if let Some(err) = envelope.chart.error {
        let detail = err.description.unwrap_or_else(|| err.code.clone());
        return Err(if err.code.eq_ignore_ascii_case("Not Found") {
            UpstreamError::not_found(PROVIDER, format!("{symbol}: {detail}"))
        } else {
            UpstreamError::http(PROVIDER, format!("{symbol}: {} {detail}", err.code))
        });
    }

    envelope
        .chart
        .result
        .and_then(|mut results| {
            if results.is_empty() {
                None
            } else {
                Some(results.swap_remove(0))
            }
        })
        .ok_or_else(|| UpstreamError::not_found(PROVIDER, format!("No chart result for {symbol}")))
}

/// Yahoo Finance chart endpoint fetcher (primary source).
///
/// - **Free**: no API key required.
/// - **Coverage**: global equities, ETFs, indices, mutual funds.
/// - **Data**: series + meta + dividend/split events in one call.
///
/// Search goes through the `yahoo_finance_api` connector.
pub struct YahooChartFetcher {
    client: Client,
    agents: UserAgentPool,
    timeout: Duration,
    base_url: String,
    connector: yahoo_finance_api::YahooConnector,
}

impl YahooChartFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, CoreError> {
        let timeout = Duration::from_secs(timeout_secs.max(1));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::from_transport(PROVIDER, &e))?;
        let connector = yahoo_finance_api::YahooConnector::new().map_err(|e| {
            UpstreamError::http(PROVIDER, format!("Failed to create connector: {e}"))
        })?;
        Ok(Self {
            client,
            agents: UserAgentPool::new(),
            timeout,
            base_url: BASE_URL.to_string(),
            connector,
        })
    }

    /// Point the fetcher at another chart endpoint (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_chart(&self, symbol: &str, request: ChartRequest) -> Result<String, UpstreamError> {
        let url = format!("{}/{}", self.base_url, encode(symbol));
        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, self.agents.next_agent())
            .query(&request.query_params())
            .send()
            .await
            .map_err(|e| UpstreamError::from_transport(PROVIDER, &e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::from_transport(PROVIDER, &e))?;

        match UpstreamErrorKind::from_status(status) {
            None => Ok(body),
            // A 404 with a chart error body carries the better message.
            Some(UpstreamErrorKind::NotFound) => match decode_chart(symbol, &body) {
                Err(e) if e.kind == UpstreamErrorKind::NotFound => Err(e),
                _ => Err(UpstreamError::not_found(PROVIDER, format!("{symbol}: HTTP 404"))),
            },
            Some(kind) => Err(UpstreamError::new(
                kind,
                PROVIDER,
                redact_query(&format!("{symbol}: HTTP {status}")),
            )),
        }
    }
}

#[async_trait]
impl QuoteFetcher for YahooChartFetcher {
    fn source(&self) -> QuoteSource {
        QuoteSource::Yahoo
    }

    async fn fetch_raw(
        &self,
        symbol: &str,
        request: ChartRequest,
    ) -> Result<RawPayload, UpstreamError> {
        log::info!("fetching {symbol} ({}) from {PROVIDER}", request.dedup_tag());

        let body = tokio::time::timeout(self.timeout, self.get_chart(symbol, request))
            .await
            .map_err(|_| {
                UpstreamError::timeout(
                    PROVIDER,
                    format!("{symbol}: no response within {}s", self.timeout.as_secs()),
                )
            })??;

        decode_chart(symbol, &body).map(RawPayload::Yahoo)
    }

    async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>, UpstreamError> {
        let encoded = encode(query.trim());
        log::debug!("searching {PROVIDER} for '{query}'");

        let result = tokio::time::timeout(self.timeout, self.connector.search_ticker(&encoded))
            .await
            .map_err(|_| UpstreamError::timeout(PROVIDER, format!("search '{query}' timed out")))?
            .map_err(|e| UpstreamError::http(PROVIDER, redact_query(&e.to_string())))?;

        Ok(result
            .quotes
            .iter()
            .map(|item| SymbolMatch {
                symbol: item.symbol.clone(),
                name: if item.long_name.is_empty() {
                    item.short_name.clone()
                } else {
                    item.long_name.clone()
                },
                exchange: item.exchange.clone(),
                quote_type: item.quote_type.to_uppercase(),
                score: item.score,
            })
            .collect())
    }
}
