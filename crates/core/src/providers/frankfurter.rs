use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::errors::{UpstreamError, UpstreamErrorKind};
use super::traits::FxRateProvider;

const BASE_URL: &str = "https://api.frankfurter.dev/v1";
const PROVIDER: &str = "Frankfurter";

/// Frankfurter API provider for fiat currency exchange rates.
///
/// - **Free**: No API key, no rate limits, open-source.
/// - **Source**: European Central Bank (ECB) data.
/// - **Endpoints**: `/latest`, `/{date}`
///
/// For a weekend or holiday date the ECB publishes nothing; Frankfurter
/// answers with the previous business day's fixing.
pub struct FrankfurterProvider {
    client: Client,
    timeout: Duration,
}

impl FrankfurterProvider {
    pub fn new(timeout_secs: u64) -> Self {
        let timeout = Duration::from_secs(timeout_secs.max(1));
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            timeout,
        }
    }

    async fn get_rates(&self, url: String) -> Result<HashMap<String, f64>, UpstreamError> {
        let send = async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| UpstreamError::from_transport(PROVIDER, &e))?;
            let status = response.status().as_u16();
            if let Some(kind) = UpstreamErrorKind::from_status(status) {
                return Err(UpstreamError::new(kind, PROVIDER, format!("HTTP {status}")));
            }
            response
                .json::<RatesResponse>()
                .await
                .map_err(|e| UpstreamError::malformed(PROVIDER, e.to_string()))
        };

        let resp = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| UpstreamError::timeout(PROVIDER, url.clone()))??;
        Ok(resp.rates)
    }
}

impl Default for FrankfurterProvider {
    fn default() -> Self {
        Self::new(crate::models::settings::DEFAULT_UPSTREAM_TIMEOUT_SECS)
    }
}

// ── Frankfurter API response types ──────────────────────────────────

#[derive(Deserialize)]
struct RatesResponse {
    rates: HashMap<String, f64>,
}

#[async_trait]
impl FxRateProvider for FrankfurterProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn latest(
        &self,
        base: &str,
        symbols: &[&str],
    ) -> Result<BTreeMap<String, f64>, UpstreamError> {
        let base = base.trim().to_uppercase();
        let wanted: Vec<String> = symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| *s != base)
            .collect();
        if wanted.is_empty() {
            return Ok(BTreeMap::new());
        }

        let url = format!("{BASE_URL}/latest?base={base}&symbols={}", wanted.join(","));
        let rates = self.get_rates(url).await?;
        Ok(rates
            .into_iter()
            .filter(|(code, rate)| wanted.contains(code) && *rate > 0.0)
            .collect())
    }

    async fn historical(
        &self,
        date: NaiveDate,
        from: &str,
        to: &str,
    ) -> Result<f64, UpstreamError> {
        let from = from.trim().to_uppercase();
        let to = to.trim().to_uppercase();

        // Same currency → rate is 1.0
        if from == to {
            return Ok(1.0);
        }

        let url = format!(
            "{BASE_URL}/{}?base={from}&symbols={to}",
            date.format("%Y-%m-%d")
        );
        let rates = self.get_rates(url).await?;
        rates
            .get(&to)
            .copied()
            .filter(|r| *r > 0.0)
            .ok_or_else(|| UpstreamError::not_found(PROVIDER, format!("No rate {from}→{to} on {date}")))
    }
}
