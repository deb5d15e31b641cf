use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default live FX rate TTL in minutes.
pub const DEFAULT_FX_TTL_MINUTES: u32 = 60;

/// Alpha Vantage free tier: requests per day across all endpoints.
pub const DEFAULT_ALPHAVANTAGE_DAILY_LIMIT: u32 = 25;

/// Hard timeout for a single upstream call.
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

/// Operator and user configuration for the quote layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Currency in which valuations are rendered (e.g., "EUR", "USD").
    pub display_currency: String,

    /// Optional API keys for providers that require them.
    /// Keys: provider id (e.g., "alphavantage"). Values: the API key.
    pub api_keys: HashMap<String, String>,

    /// Quote TTL override in minutes. When set it wins over the
    /// market-hours heuristic for every request.
    pub quote_ttl_override_minutes: Option<u32>,

    /// How long a live FX rate is served from cache.
    pub fx_ttl_minutes: u32,

    /// Daily call budget of the Alpha Vantage provider.
    pub alphavantage_daily_limit: u32,

    pub upstream_timeout_secs: u64,

    /// Store file location; `None` keeps the store in memory.
    pub store_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            display_currency: "USD".to_string(),
            api_keys: HashMap::new(),
            quote_ttl_override_minutes: None,
            fx_ttl_minutes: DEFAULT_FX_TTL_MINUTES,
            alphavantage_daily_limit: DEFAULT_ALPHAVANTAGE_DAILY_LIMIT,
            upstream_timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
            store_path: None,
        }
    }
}

impl Settings {
    /// Load settings from the environment (and a `.env` file if present).
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable source. `from_env` delegates here.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(currency) = lookup("FOLIO_DISPLAY_CURRENCY") {
            if let Some(code) = normalize_currency_code(&currency) {
                settings.display_currency = code;
            }
        }
        if let Some(key) = lookup("FOLIO_ALPHAVANTAGE_KEY") {
            let key = key.trim().to_string();
            if !key.is_empty() {
                settings.api_keys.insert("alphavantage".to_string(), key);
            }
        }
        settings.quote_ttl_override_minutes = lookup("FOLIO_QUOTE_TTL_OVERRIDE")
            .and_then(|v| v.trim().parse().ok());
        if let Some(ttl) = lookup("FOLIO_FX_TTL_MINUTES").and_then(|v| v.trim().parse().ok()) {
            settings.fx_ttl_minutes = ttl;
        }
        if let Some(limit) =
            lookup("FOLIO_ALPHAVANTAGE_DAILY_LIMIT").and_then(|v| v.trim().parse().ok())
        {
            settings.alphavantage_daily_limit = limit;
        }
        if let Some(secs) = lookup("FOLIO_UPSTREAM_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse().ok())
            .filter(|s: &u64| *s > 0)
        {
            settings.upstream_timeout_secs = secs;
        }
        settings.store_path = lookup("FOLIO_STORE_PATH")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        settings
    }

    pub fn api_key(&self, provider: &str) -> Option<&str> {
        self.api_keys.get(provider).map(|k| k.as_str())
    }
}

/// Uppercase and validate an ISO-style 3-letter currency code.
pub fn normalize_currency_code(code: &str) -> Option<String> {
    let trimmed = code.trim().to_uppercase();
    if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(trimmed)
    } else {
        None
    }
}
