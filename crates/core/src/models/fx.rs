use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Base currency of all internal accounting.
pub const BASE_CURRENCY: &str = "USD";

/// Currencies included in the "all majors vs USD" FX table.
pub const MAJOR_CURRENCIES: [&str; 12] = [
    "EUR", "GBP", "JPY", "CHF", "CAD", "AUD", "SEK", "NOK", "DKK", "PLN", "HKD", "CNY",
];

/// Store key of a live USD→`currency` rate.
pub fn live_pair_key(currency: &str) -> String {
    currency.trim().to_uppercase()
}

/// Store key of a date-pinned `from`→`to` rate. Past rates never change,
/// so these entries never expire.
pub fn historical_pair_key(date: NaiveDate, from: &str, to: &str) -> String {
    format!(
        "hist_{}_{}_{}",
        date.format("%Y-%m-%d"),
        from.trim().to_uppercase(),
        to.trim().to_uppercase()
    )
}

/// Live FX table: units of each currency per one USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxTable {
    pub base: String,
    pub rates: BTreeMap<String, f64>,
    /// `false` when some or all values are last-known fallbacks because the
    /// live lookup failed.
    pub live: bool,
}

impl FxTable {
    pub fn new(rates: BTreeMap<String, f64>, live: bool) -> Self {
        Self {
            base: BASE_CURRENCY.to_string(),
            rates,
            live,
        }
    }

    /// Units of `currency` per USD. USD itself is always 1.
    pub fn rate(&self, currency: &str) -> Option<f64> {
        let code = currency.trim().to_uppercase();
        if code == BASE_CURRENCY {
            return Some(1.0);
        }
        self.rates.get(&code).copied().filter(|r| *r > 0.0 && r.is_finite())
    }

    /// Convert an amount in `currency` to USD.
    pub fn to_usd(&self, amount: f64, currency: &str) -> Option<f64> {
        self.rate(currency).map(|r| amount / r)
    }

    /// Convert a USD amount into `currency`.
    pub fn from_usd(&self, amount_usd: f64, currency: &str) -> Option<f64> {
        self.rate(currency).map(|r| amount_usd * r)
    }
}

impl Default for FxTable {
    fn default() -> Self {
        Self::new(BTreeMap::new(), true)
    }
}

/// How a converted amount was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exactness {
    /// Historical rate for the exact pair and date
    Exact,
    /// Current rate used in place of the missing historical one
    ApproximateCurrentRate,
    /// No rate at all; the native amount was passed through
    Unconverted,
}

/// An amount converted to USD, with the provenance of the rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvertedAmount {
    pub amount: f64,
    pub rate: Option<f64>,
    pub exactness: Exactness,
}

impl ConvertedAmount {
    pub fn is_approximate(&self) -> bool {
        self.exactness != Exactness::Exact
    }
}
