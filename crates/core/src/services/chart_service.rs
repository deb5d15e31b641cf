use std::collections::BTreeMap;

use crate::clock::SharedClock;
use crate::errors::CoreError;
use crate::models::chart::{ChartDataPoint, Correlation, Sparkline};
use crate::models::payload::RawPayload;
use crate::models::price::PricePoint;
use crate::models::quote::{QuoteKind, QuoteSource};
use crate::parser;
use crate::storage::store::SharedStore;

use super::quote_service::raw_key;

/// Fewest aligned daily returns a correlation is computed from.
pub const MIN_CORRELATION_OBSERVATIONS: usize = 3;

/// Regenerates chart data from the raw-payload cache.
///
/// Never calls upstream: a symbol must have been quoted at least once
/// (which stores its last daily payload) before it can be charted.
pub struct ChartService {
    store: SharedStore,
    clock: SharedClock,
}

impl ChartService {
    pub fn new(store: SharedStore, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// The last `days` daily closes of `symbol`, oldest first.
    pub async fn sparkline(
        &self,
        symbol: &str,
        source: QuoteSource,
        days: usize,
    ) -> Result<Sparkline, CoreError> {
        let symbol = symbol.trim().to_uppercase();
        let payload = self.cached_payload(&symbol, source).await?;
        let closes = parser::daily_closes(&payload);
        let skip = closes.len().saturating_sub(days);

        Ok(Sparkline {
            currency: Some(parser::payload_currency(&payload)),
            points: closes
                .into_iter()
                .skip(skip)
                .map(|p| ChartDataPoint {
                    date: p.date,
                    close: p.price,
                })
                .collect(),
            symbol,
        })
    }

    /// Pearson correlation of two symbols' daily returns over the days
    /// both series have.
    pub async fn correlation(
        &self,
        left: &str,
        right: &str,
        source: QuoteSource,
    ) -> Result<Correlation, CoreError> {
        let left = left.trim().to_uppercase();
        let right = right.trim().to_uppercase();
        let a = parser::daily_closes(&self.cached_payload(&left, source).await?);
        let b = parser::daily_closes(&self.cached_payload(&right, source).await?);

        let (xs, ys) = aligned_returns(&a, &b);
        if xs.len() < MIN_CORRELATION_OBSERVATIONS {
            return Err(CoreError::ValidationError(format!(
                "{left}/{right}: only {} overlapping returns",
                xs.len()
            )));
        }
        let coefficient = pearson(&xs, &ys).ok_or_else(|| {
            CoreError::ValidationError(format!("{left}/{right}: a series has no variance"))
        })?;

        Ok(Correlation {
            left,
            right,
            coefficient,
            observations: xs.len(),
        })
    }

    async fn cached_payload(
        &self,
        symbol: &str,
        source: QuoteSource,
    ) -> Result<RawPayload, CoreError> {
        let key = raw_key(source, symbol, QuoteKind::Daily);
        let entry = self
            .store
            .get_raw(&key)
            .await?
            .ok_or_else(|| CoreError::PriceNotAvailable {
                symbol: symbol.to_string(),
                date: self.clock.today().to_string(),
            })?;
        Ok(serde_json::from_str(&entry.body)?)
    }
}

/// Daily returns of the dates both series share, consecutive in that
/// shared calendar.
pub fn aligned_returns(a: &[PricePoint], b: &[PricePoint]) -> (Vec<f64>, Vec<f64>) {
    let right: BTreeMap<_, _> = b.iter().map(|p| (p.date, p.price)).collect();
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .filter_map(|p| right.get(&p.date).map(|r| (p.price, *r)))
        .collect();

    pairs
        .windows(2)
        .filter_map(|w| {
            let (a0, b0) = w[0];
            let (a1, b1) = w[1];
            if a0 > 0.0 && b0 > 0.0 {
                Some((a1 / a0 - 1.0, b1 / b0 - 1.0))
            } else {
                None
            }
        })
        .unzip()
}

/// Pearson coefficient; `None` for mismatched lengths, fewer than two
/// points or a constant series.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}
