use std::collections::{BTreeMap, HashMap};

use crate::errors::CoreError;
use crate::models::fx::FxTable;
use crate::models::quote::Quote;
use crate::models::transaction::Position;
use crate::models::valuation::{
    DisplayPosition, DisplayValuation, PerformancePeriod, PositionValuation, ValuationSnapshot,
};

/// Reconstructs portfolio valuations from positions, quotes and FX rates.
///
/// Internal accounting is USD:
/// - value = `price / rate(USD→ccy) × quantity`
/// - gain/loss = value − cost basis
/// - display-currency conversion happens only in `to_display`
///
/// Pure: every input is passed in, nothing is fetched.
pub struct ValuationService;

impl ValuationService {
    pub fn new() -> Self {
        Self
    }

    /// Value every position for one performance period.
    pub fn value_positions(
        &self,
        positions: &[Position],
        quotes: &HashMap<String, Quote>,
        fx: &FxTable,
        period: PerformancePeriod,
    ) -> ValuationSnapshot {
        let mut rows: Vec<PositionValuation> = positions
            .iter()
            .map(|p| self.value_position(p, quotes.get(&p.symbol), fx, period))
            .collect();

        let mut unpriced: Vec<String> = rows
            .iter()
            .filter(|r| r.value_usd.is_none())
            .map(|r| r.symbol.clone())
            .collect();
        unpriced.sort();
        unpriced.dedup();

        Self::apply_weights(&mut rows);
        Self::snapshot(period, rows, unpriced)
    }

    /// Merge rows of the same symbol held in several portfolios.
    ///
    /// Quantity, cost, value, gain/loss and period base are summed; weight,
    /// gain/loss % and period performance are recomputed from the sums,
    /// never averaged.
    pub fn merge_across_portfolios(&self, snapshot: &ValuationSnapshot) -> ValuationSnapshot {
        let mut merged: BTreeMap<String, PositionValuation> = BTreeMap::new();

        for row in &snapshot.positions {
            match merged.get_mut(&row.symbol) {
                None => {
                    merged.insert(row.symbol.clone(), row.clone());
                }
                Some(acc) => {
                    acc.portfolio_ids.extend(row.portfolio_ids.iter().cloned());
                    acc.quantity += row.quantity;
                    acc.cost_usd += row.cost_usd;
                    acc.value_usd = sum_opt(acc.value_usd, row.value_usd);
                    acc.gain_loss_usd = sum_opt(acc.gain_loss_usd, row.gain_loss_usd);
                    acc.period_base_usd = sum_opt(acc.period_base_usd, row.period_base_usd);
                    acc.stale |= row.stale;
                    acc.fx_missing |= row.fx_missing;
                }
            }
        }

        let mut rows: Vec<PositionValuation> = merged
            .into_values()
            .map(|mut row| {
                row.portfolio_ids.sort();
                row.portfolio_ids.dedup();
                row.gl_perf = row.gain_loss_usd.and_then(|gl| pct(gl, row.cost_usd));
                row.period_perf = match (row.value_usd, row.period_base_usd) {
                    (Some(value), Some(base)) => pct(value - base, base),
                    _ => None,
                };
                row
            })
            .collect();

        Self::apply_weights(&mut rows);
        Self::snapshot(snapshot.period, rows, snapshot.unpriced.clone())
    }

    /// Re-express a USD snapshot in `currency` using the live FX table.
    pub fn to_display(
        &self,
        snapshot: &ValuationSnapshot,
        fx: &FxTable,
        currency: &str,
    ) -> Result<DisplayValuation, CoreError> {
        let code = currency.trim().to_uppercase();
        let rate = fx
            .rate(&code)
            .ok_or_else(|| CoreError::ValidationError(format!("No FX rate for {code}")))?;

        Ok(DisplayValuation {
            currency: code,
            rate,
            total_value: snapshot.total_value_usd * rate,
            total_cost: snapshot.total_cost_usd * rate,
            total_gain_loss: snapshot.total_gain_loss_usd * rate,
            positions: snapshot
                .positions
                .iter()
                .map(|p| DisplayPosition {
                    symbol: p.symbol.clone(),
                    quantity: p.quantity,
                    value: p.value_usd.map(|v| v * rate),
                    cost: p.cost_usd * rate,
                    gain_loss: p.gain_loss_usd.map(|g| g * rate),
                    gl_perf: p.gl_perf,
                    weight: p.weight,
                    period_perf: p.period_perf,
                })
                .collect(),
        })
    }

    /// Performance of one quote over `period`, in percent.
    ///
    /// - Intraday: price vs previous close (open when unknown)
    /// - Reference: price vs the stored reference close, both native
    /// - Max: USD price vs USD average cost
    pub fn period_performance(
        &self,
        quote: &Quote,
        period: PerformancePeriod,
        price_usd: f64,
        avg_cost_usd: Option<f64>,
    ) -> Option<f64> {
        match period {
            PerformancePeriod::Intraday => {
                let base = quote.prev_close.or(quote.open)?;
                pct(quote.price - base, base)
            }
            PerformancePeriod::Reference(p) => {
                let base = quote.reference(p)?;
                pct(quote.price - base, base)
            }
            PerformancePeriod::Max => {
                let avg = avg_cost_usd?;
                pct(price_usd - avg, avg)
            }
        }
    }

    fn value_position(
        &self,
        position: &Position,
        quote: Option<&Quote>,
        fx: &FxTable,
        period: PerformancePeriod,
    ) -> PositionValuation {
        let mut row = PositionValuation {
            portfolio_ids: vec![position.portfolio_id.clone()],
            symbol: position.symbol.clone(),
            currency: position.currency.clone(),
            quantity: position.quantity,
            cost_usd: position.cost_usd,
            value_usd: None,
            gain_loss_usd: None,
            gl_perf: None,
            weight: 0.0,
            period_perf: None,
            period_base_usd: None,
            stale: false,
            fx_missing: false,
        };

        let Some(quote) = quote else {
            return row;
        };

        row.currency = quote.currency.clone();
        row.stale = quote.stale;
        // A native price without a rate cannot be compared with USD money.
        let Some(rate) = fx.rate(&quote.currency) else {
            row.fx_missing = true;
            return row;
        };

        let price_usd = quote.price / rate;
        let value = price_usd * position.quantity;
        let gain_loss = value - position.cost_usd;
        row.value_usd = Some(value);
        row.gain_loss_usd = Some(gain_loss);
        row.gl_perf = pct(gain_loss, position.cost_usd);
        row.period_perf =
            self.period_performance(quote, period, price_usd, position.avg_cost_usd());
        row.period_base_usd = row
            .period_perf
            .and_then(|perf| {
                let base = value / (1.0 + perf / 100.0);
                base.is_finite().then_some(base)
            });
        row
    }

    /// Weights from the priced total, rows sorted by value (largest first).
    fn apply_weights(rows: &mut [PositionValuation]) {
        let total: f64 = rows.iter().filter_map(|r| r.value_usd).sum();
        for row in rows.iter_mut() {
            row.weight = match row.value_usd {
                Some(v) if total > 0.0 => v / total * 100.0,
                _ => 0.0,
            };
        }
        rows.sort_by(|a, b| {
            b.value_usd
                .unwrap_or(0.0)
                .partial_cmp(&a.value_usd.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
    }

    fn snapshot(
        period: PerformancePeriod,
        positions: Vec<PositionValuation>,
        unpriced: Vec<String>,
    ) -> ValuationSnapshot {
        let total_value_usd: f64 = positions.iter().filter_map(|r| r.value_usd).sum();
        let total_cost_usd: f64 = positions.iter().map(|r| r.cost_usd).sum();
        let priced_cost: f64 = positions
            .iter()
            .filter(|r| r.value_usd.is_some())
            .map(|r| r.cost_usd)
            .sum();
        let total_gain_loss_usd: f64 = positions.iter().filter_map(|r| r.gain_loss_usd).sum();

        let (period_value, period_base) = positions
            .iter()
            .filter_map(|r| Some((r.value_usd?, r.period_base_usd?)))
            .fold((0.0, 0.0), |(v, b), (rv, rb)| (v + rv, b + rb));

        ValuationSnapshot {
            period,
            positions,
            total_value_usd,
            total_cost_usd,
            total_gain_loss_usd,
            total_gl_perf: pct(total_gain_loss_usd, priced_cost),
            period_perf: pct(period_value - period_base, period_base),
            unpriced,
        }
    }
}

impl Default for ValuationService {
    fn default() -> Self {
        Self::new()
    }
}

/// `part / whole × 100`, `None` when `whole` is not positive.
fn pct(part: f64, whole: f64) -> Option<f64> {
    if whole > 0.0 && part.is_finite() {
        Some(part / whole * 100.0)
    } else {
        None
    }
}

fn sum_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x + y),
        (x, None) => x,
        (None, y) => y,
    }
}
