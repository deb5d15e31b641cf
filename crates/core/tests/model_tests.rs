// ═══════════════════════════════════════════════════════════════════
// Model Tests: Quote, keys, FX table, transactions, settings
// ═══════════════════════════════════════════════════════════════════

mod common;

use chrono::{TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};

use common::{assert_close, date, ChartBuilder};
use folio_core::models::cache::ProviderUsage;
use folio_core::models::chart::{ChartDataPoint, Sparkline};
use folio_core::models::fx::{historical_pair_key, live_pair_key, FxTable, MAJOR_CURRENCIES};
use folio_core::models::payload::RawPayload;
use folio_core::models::price::SeriesPoint;
use folio_core::models::quote::{
    BatchQuotes, HistoricalPoint, Quote, QuoteKind, QuoteSource, RefPeriod, SplitEvent,
};
use folio_core::models::settings::{normalize_currency_code, Settings};
use folio_core::models::transaction::{
    Ledger, Position, TransactionDraft, TransactionType,
};
use folio_core::models::valuation::PerformancePeriod;

fn sample_quote(price: f64, prev_close: Option<f64>) -> Quote {
    Quote {
        symbol: "MSFT".into(),
        name: Some("Microsoft Corporation".into()),
        exchange: Some("NasdaqGS".into()),
        price,
        prev_close,
        open: None,
        change: None,
        change_pct: None,
        refs: BTreeMap::new(),
        currency: "USD".into(),
        market_date: date(2024, 6, 14),
        source: QuoteSource::Yahoo,
        fetched_at: Utc.with_ymd_and_hms(2024, 6, 14, 10, 0, 0).unwrap(),
        stale: false,
    }
}

// ═══════════════════════════════════════════════════════════════════
// Quote
// ═══════════════════════════════════════════════════════════════════

mod quote {
    use super::*;

    #[test]
    fn derived_change_from_prev_close() {
        let q = sample_quote(110.0, Some(100.0)).with_derived_change();
        assert_close(q.change.unwrap(), 10.0);
        assert_close(q.change_pct.unwrap(), 10.0);
    }

    #[test]
    fn derived_change_without_prev_close() {
        let q = sample_quote(110.0, None).with_derived_change();
        assert_eq!(q.change, None);
        assert_eq!(q.change_pct, None);
    }

    #[test]
    fn zero_prev_close_has_no_change() {
        let q = sample_quote(110.0, Some(0.0)).with_derived_change();
        assert_eq!(q.change_pct, None);
    }

    #[test]
    fn mark_stale_keeps_values() {
        let q = sample_quote(110.0, Some(100.0)).mark_stale();
        assert!(q.stale);
        assert_eq!(q.price, 110.0);
    }

    #[test]
    fn missing_reference_is_none_not_zero() {
        let mut q = sample_quote(110.0, None);
        q.refs.insert(RefPeriod::OneYear, 80.0);
        assert_eq!(q.reference(RefPeriod::OneYear), Some(80.0));
        assert_eq!(q.reference(RefPeriod::TwoYears), None);
    }

    #[test]
    fn json_uses_period_labels() {
        let mut q = sample_quote(110.0, None);
        q.refs.insert(RefPeriod::YearToDate, 95.0);
        let json = serde_json::to_string(&q).unwrap();
        assert!(json.contains("\"YTD\":95.0"));
        assert!(json.contains("\"prevClose\""));
        assert!(json.contains("\"marketDate\""));
    }

    #[test]
    fn stale_defaults_to_false_when_absent() {
        let q = sample_quote(110.0, None);
        let mut value = serde_json::to_value(&q).unwrap();
        value.as_object_mut().unwrap().remove("stale");
        let back: Quote = serde_json::from_value(value).unwrap();
        assert!(!back.stale);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Keys & enums
// ═══════════════════════════════════════════════════════════════════

mod keys {
    use super::*;

    #[test]
    fn quote_cache_keys() {
        assert_eq!(QuoteKind::Daily.cache_key(" msft "), "MSFT");
        assert_eq!(QuoteKind::Intraday.cache_key("msft"), "MSFT:intraday");
        assert_ne!(
            QuoteKind::Daily.cache_key("MSFT"),
            QuoteKind::Intraday.cache_key("MSFT")
        );
    }

    #[test]
    fn source_ids_and_display() {
        assert_eq!(QuoteSource::Yahoo.id(), "yahoo");
        assert_eq!(QuoteSource::AlphaVantage.id(), "alphavantage");
        assert_eq!(QuoteSource::AlphaVantage.to_string(), "Alpha Vantage");
    }

    #[test]
    fn ref_period_days() {
        assert_eq!(RefPeriod::OneWeek.days_back(), Some(7));
        assert_eq!(RefPeriod::OneMonth.days_back(), Some(30));
        assert_eq!(RefPeriod::YearToDate.days_back(), None);
        assert_eq!(RefPeriod::OneYear.days_back(), Some(365));
        assert_eq!(RefPeriod::TwoYears.days_back(), Some(730));
        assert_eq!(RefPeriod::ALL.len(), 5);
    }

    #[test]
    fn performance_period_labels() {
        assert_eq!(
            PerformancePeriod::from_label("1d"),
            Some(PerformancePeriod::Intraday)
        );
        assert_eq!(
            PerformancePeriod::from_label("ytd"),
            Some(PerformancePeriod::Reference(RefPeriod::YearToDate))
        );
        assert_eq!(
            PerformancePeriod::from_label("MAX"),
            Some(PerformancePeriod::Max)
        );
        assert_eq!(PerformancePeriod::from_label("5Y"), None);
    }

    #[test]
    fn fx_keys() {
        assert_eq!(live_pair_key("eur"), "EUR");
        assert_eq!(
            historical_pair_key(date(2024, 3, 1), "eur", "usd"),
            "hist_2024-03-01_EUR_USD"
        );
    }

    #[test]
    fn series_point_date_uses_offset() {
        // 2024-06-14 23:30 UTC is already the 15th in Tokyo.
        let ts = Utc.with_ymd_and_hms(2024, 6, 14, 23, 30, 0).unwrap().timestamp();
        let p = SeriesPoint::new(ts, 1.0);
        assert_eq!(p.date(0), Some(date(2024, 6, 14)));
        assert_eq!(p.date(9 * 3600), Some(date(2024, 6, 15)));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Small value types
// ═══════════════════════════════════════════════════════════════════

mod values {
    use super::*;

    #[test]
    fn split_ratio() {
        let split = SplitEvent {
            date: date(2020, 8, 31),
            numerator: 4.0,
            denominator: 1.0,
        };
        assert_eq!(split.ratio(), 4.0);
        let reverse = SplitEvent {
            date: date(2020, 8, 31),
            numerator: 1.0,
            denominator: 10.0,
        };
        assert_close(reverse.ratio(), 0.1);
        let broken = SplitEvent {
            date: date(2020, 8, 31),
            numerator: 4.0,
            denominator: 0.0,
        };
        assert_eq!(broken.ratio(), 1.0);
    }

    #[test]
    fn historical_point_distance_classes() {
        let mut p = HistoricalPoint {
            symbol: "MSFT".into(),
            price: 1.0,
            currency: "USD".into(),
            date: date(2024, 6, 14),
            requested_date: date(2024, 6, 14),
            days_off: 0,
            is_historical: true,
            split_factor: 1.0,
        };
        assert!(!p.is_approximate() && !p.is_gap());
        p.days_off = 2;
        assert!(p.is_approximate() && !p.is_gap());
        p.days_off = 12;
        assert!(!p.is_approximate() && p.is_gap());
    }

    #[test]
    fn provider_usage_budget() {
        let usage = ProviderUsage {
            provider: "alphavantage".into(),
            date: date(2024, 6, 14),
            used: 20,
            limit: 25,
        };
        assert_eq!(usage.remaining(), 5);
        assert!(!usage.is_exhausted());

        let spent = ProviderUsage { used: 30, ..usage };
        assert_eq!(spent.remaining(), 0);
        assert!(spent.is_exhausted());
    }

    #[test]
    fn batch_lists_stale_symbols() {
        let mut batch = BatchQuotes::default();
        let mut stale = sample_quote(1.0, None).mark_stale();
        stale.symbol = "VOD.L".into();
        batch.results.insert("VOD.L".into(), stale);
        batch.results.insert("MSFT".into(), sample_quote(1.0, None));
        assert!(batch.is_complete());
        assert_eq!(batch.stale_symbols(), vec!["VOD.L"]);

        batch.errors.insert("ZZZZ".into(), "not found".into());
        assert!(!batch.is_complete());
    }

    #[test]
    fn sparkline_ends() {
        let line = Sparkline {
            symbol: "MSFT".into(),
            currency: Some("USD".into()),
            points: vec![
                ChartDataPoint {
                    date: date(2024, 6, 13),
                    close: 10.0,
                },
                ChartDataPoint {
                    date: date(2024, 6, 14),
                    close: 12.0,
                },
            ],
        };
        assert_eq!(line.first_close(), Some(10.0));
        assert_eq!(line.last_close(), Some(12.0));
    }

    #[test]
    fn raw_payload_is_tagged_by_source() {
        let payload = ChartBuilder::new("MSFT", "USD")
            .close(date(2024, 6, 14), 420.0)
            .build();
        assert_eq!(payload.source(), QuoteSource::Yahoo);

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"source\":\"Yahoo\""));
        let back: RawPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }
}

// ═══════════════════════════════════════════════════════════════════
// FX table
// ═══════════════════════════════════════════════════════════════════

mod fx_table {
    use super::*;

    fn table() -> FxTable {
        let mut rates = BTreeMap::new();
        rates.insert("EUR".to_string(), 0.92);
        rates.insert("JPY".to_string(), 157.0);
        rates.insert("BAD".to_string(), 0.0);
        FxTable::new(rates, true)
    }

    #[test]
    fn usd_is_always_one() {
        assert_eq!(FxTable::default().rate("usd"), Some(1.0));
    }

    #[test]
    fn conversions_both_ways() {
        let t = table();
        assert_close(t.to_usd(92.0, "EUR").unwrap(), 100.0);
        assert_close(t.from_usd(100.0, "eur").unwrap(), 92.0);
    }

    #[test]
    fn unknown_or_zero_rate_is_none() {
        let t = table();
        assert_eq!(t.rate("CHF"), None);
        assert_eq!(t.rate("BAD"), None);
        assert_eq!(t.to_usd(1.0, "CHF"), None);
    }

    #[test]
    fn majors_are_twelve_and_exclude_usd() {
        assert_eq!(MAJOR_CURRENCIES.len(), 12);
        assert!(!MAJOR_CURRENCIES.contains(&"USD"));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Transactions & positions
// ═══════════════════════════════════════════════════════════════════

mod transactions {
    use super::*;

    #[test]
    fn draft_normalizes_codes() {
        let draft = TransactionDraft::new(
            "main",
            " msft ",
            TransactionType::Buy,
            10.0,
            400.0,
            "usd",
            date(2024, 6, 3),
        );
        assert_eq!(draft.symbol, "MSFT");
        assert_eq!(draft.currency, "USD");
    }

    #[test]
    fn draft_in_pence_is_stored_in_pounds() {
        let draft = TransactionDraft::new(
            "main",
            "VOD.L",
            TransactionType::Buy,
            100.0,
            7250.0,
            "GBp",
            date(2024, 6, 3),
        );
        assert_eq!(draft.currency, "GBP");
        assert_close(draft.price, 72.5);

        let rand = TransactionDraft::new("main", "NPN.JO", TransactionType::Buy, 1.0, 300000.0, "ZAc", date(2024, 6, 3));
        assert_eq!(rand.currency, "ZAR");
        assert_close(rand.price, 3000.0);
    }

    #[test]
    fn into_transaction_fixes_usd_price() {
        let tx = TransactionDraft::new(
            "main",
            "SAP.DE",
            TransactionType::Buy,
            5.0,
            180.0,
            "EUR",
            date(2024, 6, 3),
        )
        .with_notes("first lot")
        .into_transaction(194.4);
        assert_eq!(tx.price, 180.0);
        assert_eq!(tx.price_usd, 194.4);
        assert_eq!(tx.notes.as_deref(), Some("first lot"));
    }

    #[test]
    fn tx_type_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&TransactionType::Buy).unwrap(), "\"BUY\"");
        assert_eq!(TransactionType::Sell.to_string(), "SELL");
    }

    #[test]
    fn average_cost() {
        let p = Position {
            portfolio_id: "main".into(),
            symbol: "MSFT".into(),
            quantity: 4.0,
            cost_usd: 1000.0,
            currency: "USD".into(),
        };
        assert_eq!(p.avg_cost_usd(), Some(250.0));
        let closed = Position { quantity: 0.0, ..p };
        assert_eq!(closed.avg_cost_usd(), None);
    }

    #[test]
    fn ledger_portfolio_ids() {
        let mut ledger = Ledger::new();
        assert!(ledger.is_empty());
        for pid in ["b", "a", "b"] {
            ledger.transactions.push(
                TransactionDraft::new(pid, "MSFT", TransactionType::Buy, 1.0, 1.0, "USD", date(2024, 1, 2))
                    .into_transaction(1.0),
            );
        }
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.portfolio_ids(), vec!["a".to_string(), "b".to_string()]);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Settings
// ═══════════════════════════════════════════════════════════════════

mod settings {
    use super::*;

    fn from_map(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.display_currency, "USD");
        assert_eq!(s.fx_ttl_minutes, 60);
        assert_eq!(s.alphavantage_daily_limit, 25);
        assert_eq!(s.upstream_timeout_secs, 10);
        assert_eq!(s.quote_ttl_override_minutes, None);
        assert_eq!(s.store_path, None);
        assert_eq!(s.api_key("alphavantage"), None);
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(from_map(&[]), Settings::default());
    }

    #[test]
    fn reads_every_variable() {
        let s = from_map(&[
            ("FOLIO_DISPLAY_CURRENCY", "eur"),
            ("FOLIO_ALPHAVANTAGE_KEY", " demo-key "),
            ("FOLIO_QUOTE_TTL_OVERRIDE", "5"),
            ("FOLIO_FX_TTL_MINUTES", "30"),
            ("FOLIO_ALPHAVANTAGE_DAILY_LIMIT", "500"),
            ("FOLIO_UPSTREAM_TIMEOUT_SECS", "3"),
            ("FOLIO_STORE_PATH", "/tmp/quotes.qstr"),
        ]);
        assert_eq!(s.display_currency, "EUR");
        assert_eq!(s.api_key("alphavantage"), Some("demo-key"));
        assert_eq!(s.quote_ttl_override_minutes, Some(5));
        assert_eq!(s.fx_ttl_minutes, 30);
        assert_eq!(s.alphavantage_daily_limit, 500);
        assert_eq!(s.upstream_timeout_secs, 3);
        assert_eq!(s.store_path.as_deref(), Some("/tmp/quotes.qstr"));
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let s = from_map(&[
            ("FOLIO_DISPLAY_CURRENCY", "euro"),
            ("FOLIO_ALPHAVANTAGE_KEY", "   "),
            ("FOLIO_QUOTE_TTL_OVERRIDE", "soon"),
            ("FOLIO_UPSTREAM_TIMEOUT_SECS", "0"),
            ("FOLIO_STORE_PATH", ""),
        ]);
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn currency_code_validation() {
        assert_eq!(normalize_currency_code(" chf "), Some("CHF".into()));
        assert_eq!(normalize_currency_code("EU"), None);
        assert_eq!(normalize_currency_code("E1R"), None);
    }
}
