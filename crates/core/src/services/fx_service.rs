use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clock::SharedClock;
use crate::errors::CoreError;
use crate::models::cache::FxRateEntry;
use crate::models::fx::{
    historical_pair_key, live_pair_key, ConvertedAmount, Exactness, FxTable, BASE_CURRENCY,
    MAJOR_CURRENCIES,
};
use crate::providers::traits::FxRateProvider;
use crate::storage::store::SharedStore;

use super::freshness;

/// One way of finding the `currency`→USD rate of a past date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateStrategy {
    /// Date-pinned rate already in the store
    CachedHistorical,
    /// Date-pinned rate from the FX provider, persisted on success
    ProviderHistorical,
    /// Last known live rate, whatever its age
    CachedCurrent,
}

impl RateStrategy {
    fn exactness(&self) -> Exactness {
        match self {
            RateStrategy::CachedHistorical | RateStrategy::ProviderHistorical => Exactness::Exact,
            RateStrategy::CachedCurrent => Exactness::ApproximateCurrentRate,
        }
    }
}

/// Order in which cost-basis conversion tries to find a rate. When all
/// fail the native amount is passed through unconverted.
pub const COST_RATE_CHAIN: [RateStrategy; 3] = [
    RateStrategy::CachedHistorical,
    RateStrategy::ProviderHistorical,
    RateStrategy::CachedCurrent,
];

/// Live and historical FX rates against USD.
///
/// - **Live rates** (`EUR` = USD→EUR) are cached for the configured TTL.
///   When a refresh fails the last known values are served and the table
///   is flagged as not live.
/// - **Historical rates** (`hist_2024-03-01_EUR_USD`) never change and
///   never expire.
pub struct FxService {
    provider: Arc<dyn FxRateProvider>,
    store: SharedStore,
    clock: SharedClock,
    ttl_minutes: u32,
}

impl FxService {
    pub fn new(
        provider: Arc<dyn FxRateProvider>,
        store: SharedStore,
        clock: SharedClock,
        ttl_minutes: u32,
    ) -> Self {
        Self {
            provider,
            store,
            clock,
            ttl_minutes,
        }
    }

    // ── Live table ──────────────────────────────────────────────────

    /// USD→major-currency table, refreshed when any entry has expired.
    pub async fn fx_table(&self) -> Result<FxTable, CoreError> {
        self.fx_table_for::<&str>(&[]).await
    }

    /// USD table covering the majors plus every code in `extra`, e.g. the
    /// trading currencies of held quotes.
    pub async fn fx_table_for<S: AsRef<str>>(&self, extra: &[S]) -> Result<FxTable, CoreError> {
        let mut codes: Vec<String> = MAJOR_CURRENCIES.iter().map(|c| c.to_string()).collect();
        for code in extra {
            let code = code.as_ref().trim().to_uppercase();
            if !code.is_empty() && code != BASE_CURRENCY && !codes.contains(&code) {
                codes.push(code);
            }
        }

        let now = self.clock.now();
        let mut cached: BTreeMap<String, FxRateEntry> = BTreeMap::new();
        for code in &codes {
            if let Some(entry) = self.store.get_fx(&live_pair_key(code)).await? {
                cached.insert(code.clone(), entry);
            }
        }

        let all_fresh = cached.len() == codes.len()
            && cached
                .values()
                .all(|e| freshness::is_fresh(e.updated_at, self.ttl_minutes, now));
        if all_fresh {
            log::debug!("FX table served from cache");
            return Ok(FxTable::new(
                cached.into_iter().map(|(k, e)| (k, e.rate)).collect(),
                true,
            ));
        }

        let wanted: Vec<&str> = codes.iter().map(String::as_str).collect();
        match self.provider.latest(BASE_CURRENCY, &wanted).await {
            Ok(fetched) => {
                let mut rates = BTreeMap::new();
                for (code, rate) in &fetched {
                    let entry = FxRateEntry {
                        rate: *rate,
                        updated_at: now,
                    };
                    if let Err(e) = self.store.put_fx(&live_pair_key(code), entry).await {
                        log::error!("failed to persist FX rate {code}: {e}");
                    }
                    rates.insert(code.clone(), *rate);
                }
                // Currencies the provider skipped keep their last value.
                let mut live = true;
                for (code, entry) in cached {
                    if !rates.contains_key(&code) {
                        live = false;
                        rates.insert(code, entry.rate);
                    }
                }
                Ok(FxTable::new(rates, live))
            }
            Err(e) => {
                log::warn!(
                    "{} latest rates unavailable, serving {} cached rates: {e}",
                    self.provider.name(),
                    cached.len()
                );
                Ok(FxTable::new(
                    cached.into_iter().map(|(k, e)| (k, e.rate)).collect(),
                    false,
                ))
            }
        }
    }

    // ── Historical rates ────────────────────────────────────────────

    /// Units of `to` per one `from` on `date`, cached forever once known.
    pub async fn historical_rate(
        &self,
        date: NaiveDate,
        from: &str,
        to: &str,
    ) -> Result<f64, CoreError> {
        let from = from.trim().to_uppercase();
        let to = to.trim().to_uppercase();
        if from == to {
            return Ok(1.0);
        }

        let key = historical_pair_key(date, &from, &to);
        if let Some(entry) = self.store.get_fx(&key).await? {
            return Ok(entry.rate);
        }

        let rate = self.provider.historical(date, &from, &to).await?;
        let entry = FxRateEntry {
            rate,
            updated_at: self.clock.now(),
        };
        if let Err(e) = self.store.put_fx(&key, entry).await {
            log::error!("failed to persist {key}: {e}");
        }
        Ok(rate)
    }

    /// Convert `amount` of `currency` on `date` to USD, walking
    /// `COST_RATE_CHAIN` until a strategy yields a rate.
    pub async fn convert_to_usd(
        &self,
        amount: f64,
        currency: &str,
        date: NaiveDate,
    ) -> ConvertedAmount {
        let currency = currency.trim().to_uppercase();
        if currency == BASE_CURRENCY {
            return ConvertedAmount {
                amount,
                rate: Some(1.0),
                exactness: Exactness::Exact,
            };
        }

        for strategy in COST_RATE_CHAIN {
            if let Some(rate) = self.try_strategy(strategy, &currency, date).await {
                if strategy.exactness() != Exactness::Exact {
                    log::warn!(
                        "{currency}→USD on {date}: no historical rate, using current rate {rate}"
                    );
                }
                return ConvertedAmount {
                    amount: amount * rate,
                    rate: Some(rate),
                    exactness: strategy.exactness(),
                };
            }
        }

        log::warn!("{currency}→USD on {date}: no rate at all, amount left unconverted");
        ConvertedAmount {
            amount,
            rate: None,
            exactness: Exactness::Unconverted,
        }
    }

    /// `currency`→USD rate from one strategy, `None` when it has nothing.
    async fn try_strategy(
        &self,
        strategy: RateStrategy,
        currency: &str,
        date: NaiveDate,
    ) -> Option<f64> {
        let valid = |r: f64| r.is_finite() && r > 0.0;
        match strategy {
            RateStrategy::CachedHistorical => {
                let key = historical_pair_key(date, currency, BASE_CURRENCY);
                match self.store.get_fx(&key).await {
                    Ok(entry) => entry.map(|e| e.rate).filter(|r| valid(*r)),
                    Err(e) => {
                        log::error!("FX store read failed for {key}: {e}");
                        None
                    }
                }
            }
            RateStrategy::ProviderHistorical => {
                match self.provider.historical(date, currency, BASE_CURRENCY).await {
                    Ok(rate) if valid(rate) => {
                        let key = historical_pair_key(date, currency, BASE_CURRENCY);
                        let entry = FxRateEntry {
                            rate,
                            updated_at: self.clock.now(),
                        };
                        if let Err(e) = self.store.put_fx(&key, entry).await {
                            log::error!("failed to persist {key}: {e}");
                        }
                        Some(rate)
                    }
                    Ok(_) => None,
                    Err(e) => {
                        log::warn!("{currency}→USD on {date} from {}: {e}", self.provider.name());
                        None
                    }
                }
            }
            RateStrategy::CachedCurrent => {
                // Live entries are USD→currency; invert.
                match self.store.get_fx(&live_pair_key(currency)).await {
                    Ok(entry) => entry
                        .map(|e| e.rate)
                        .filter(|r| valid(*r))
                        .map(|r| 1.0 / r),
                    Err(e) => {
                        log::error!("FX store read failed for {currency}: {e}");
                        None
                    }
                }
            }
        }
    }
}
