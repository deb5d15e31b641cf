pub mod chart_service;
pub mod freshness;
pub mod fx_service;
pub mod inflight;
pub mod portfolio_service;
pub mod quote_service;
pub mod valuation_service;
