pub mod cache;
pub mod chart;
pub mod fx;
pub mod payload;
pub mod price;
pub mod quote;
pub mod settings;
pub mod transaction;
pub mod valuation;
