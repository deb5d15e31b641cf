use serde::{Deserialize, Serialize};

use super::quote::RefPeriod;

/// The period a performance figure is measured over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PerformancePeriod {
    /// Price vs previous close (or open when no previous close is known)
    Intraday,
    /// Price vs a stored reference close, both in native currency
    Reference(RefPeriod),
    /// USD value vs USD cost basis
    Max,
}

impl PerformancePeriod {
    /// Parse a UI label: `1D`, `1W`, `1M`, `YTD`, `1Y`, `2Y` or `MAX`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "1D" | "INTRADAY" => Some(PerformancePeriod::Intraday),
            "1W" => Some(PerformancePeriod::Reference(RefPeriod::OneWeek)),
            "1M" => Some(PerformancePeriod::Reference(RefPeriod::OneMonth)),
            "YTD" => Some(PerformancePeriod::Reference(RefPeriod::YearToDate)),
            "1Y" => Some(PerformancePeriod::Reference(RefPeriod::OneYear)),
            "2Y" => Some(PerformancePeriod::Reference(RefPeriod::TwoYears)),
            "MAX" => Some(PerformancePeriod::Max),
            _ => None,
        }
    }
}

/// Valuation of one position (one symbol in one portfolio, or one symbol
/// merged across portfolios). All money fields are USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionValuation {
    /// Portfolio ids contributing to this row
    pub portfolio_ids: Vec<String>,
    pub symbol: String,
    pub currency: String,
    pub quantity: f64,
    pub cost_usd: f64,
    /// `None` when no quote is available for the symbol
    pub value_usd: Option<f64>,
    pub gain_loss_usd: Option<f64>,
    /// gain_loss / cost × 100
    pub gl_perf: Option<f64>,
    /// Share of the total valued amount, in percent
    pub weight: f64,
    /// Performance over the selected period, in percent
    pub period_perf: Option<f64>,
    /// USD value at the period's reference point, used for totals
    pub period_base_usd: Option<f64>,
    /// Set when the quote was served stale
    pub stale: bool,
    /// Set when no live FX rate existed for `currency`; the row is then
    /// left unpriced
    pub fx_missing: bool,
}

/// Totals and rows of a valuation, USD-denominated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    pub period: PerformancePeriod,
    pub positions: Vec<PositionValuation>,
    pub total_value_usd: f64,
    pub total_cost_usd: f64,
    pub total_gain_loss_usd: f64,
    pub total_gl_perf: Option<f64>,
    pub period_perf: Option<f64>,
    /// Symbols held but missing a quote
    pub unpriced: Vec<String>,
}

/// A snapshot re-expressed in a display currency for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayValuation {
    pub currency: String,
    /// Units of display currency per USD used for the conversion
    pub rate: f64,
    pub total_value: f64,
    pub total_cost: f64,
    pub total_gain_loss: f64,
    pub positions: Vec<DisplayPosition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayPosition {
    pub symbol: String,
    pub quantity: f64,
    pub value: Option<f64>,
    pub cost: f64,
    pub gain_loss: Option<f64>,
    pub gl_perf: Option<f64>,
    pub weight: f64,
    pub period_perf: Option<f64>,
}
