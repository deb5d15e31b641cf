use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single point of a sparkline / chart, in the instrument's currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDataPoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Sparkline regenerated from the raw-payload cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sparkline {
    pub symbol: String,
    pub currency: Option<String>,
    pub points: Vec<ChartDataPoint>,
}

impl Sparkline {
    pub fn first_close(&self) -> Option<f64> {
        self.points.first().map(|p| p.close)
    }

    pub fn last_close(&self) -> Option<f64> {
        self.points.last().map(|p| p.close)
    }
}

/// Correlation of two symbols' daily returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub left: String,
    pub right: String,
    /// Pearson coefficient in [-1, 1]
    pub coefficient: f64,
    /// Number of aligned return observations used
    pub observations: usize,
}
