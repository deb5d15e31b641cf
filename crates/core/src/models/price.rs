use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single daily close (date → price).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// One valid point of a provider series: unix timestamp (seconds) and close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: i64,
    pub close: f64,
}

impl SeriesPoint {
    pub fn new(timestamp: i64, close: f64) -> Self {
        Self { timestamp, close }
    }

    /// Calendar date of the point, shifted by the exchange's UTC offset.
    pub fn date(&self, gmt_offset_secs: i64) -> Option<NaiveDate> {
        chrono::DateTime::from_timestamp(self.timestamp + gmt_offset_secs, 0)
            .map(|dt| dt.date_naive())
    }
}
