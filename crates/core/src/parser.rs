//! Normalization of raw provider payloads into `Quote`s, historical point
//! lookups and corporate-action series.
//!
//! Everything here is pure: "now" and "today" are passed in by the caller.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;

use crate::errors::ParseError;
use crate::models::payload::{AlphaVantageBundle, ChartResult, RawPayload};
use crate::models::price::{PricePoint, SeriesPoint};
use crate::models::quote::{
    DividendEvent, HistoricalPoint, Quote, QuoteKind, RefPeriod, SplitEvent,
};

/// Maximum distance between a reference cutoff and the series point chosen
/// for it. Farther points mean the series does not cover the period.
pub const REF_WINDOW_DAYS: i64 = 7;

const SECS_PER_DAY: i64 = 86_400;

/// One valid bar: close is present, finite and positive.
#[derive(Debug, Clone, Copy)]
struct Bar {
    point: SeriesPoint,
    open: Option<f64>,
}

// ── Quote parsing ───────────────────────────────────────────────────

/// Turn a raw payload into the canonical `Quote`.
pub fn parse_quote(
    symbol: &str,
    payload: &RawPayload,
    kind: QuoteKind,
    now: DateTime<Utc>,
) -> Result<Quote, ParseError> {
    let symbol = symbol.trim().to_uppercase();
    match payload {
        RawPayload::Yahoo(result) => parse_chart(&symbol, result, kind, now),
        RawPayload::AlphaVantage(bundle) => parse_alphavantage(&symbol, bundle, now),
    }
}

fn parse_chart(
    symbol: &str,
    result: &ChartResult,
    kind: QuoteKind,
    now: DateTime<Utc>,
) -> Result<Quote, ParseError> {
    let meta = &result.meta;
    let bars = chart_bars(result);
    let offset = meta.gmt_offset.unwrap_or(0);

    if bars.is_empty() && meta.regular_market_price.is_none() {
        return Err(if result.timestamp.is_empty() {
            ParseError::NoSeriesData(symbol.to_string())
        } else {
            ParseError::MissingPriceField(symbol.to_string())
        });
    }

    let price = meta
        .regular_market_price
        .filter(|p| valid_price(*p))
        .or_else(|| bars.last().map(|b| b.point.close))
        .ok_or_else(|| ParseError::MissingPriceField(symbol.to_string()))?;

    let provider_prev = meta.chart_previous_close.or(meta.previous_close);
    let (prev_close, open, refs) = match kind {
        // A 5-minute series says nothing about yesterday or last year.
        QuoteKind::Intraday => (
            provider_prev,
            bars.iter().find_map(|b| b.open),
            BTreeMap::new(),
        ),
        QuoteKind::Daily => {
            let points: Vec<SeriesPoint> = bars.iter().map(|b| b.point).collect();
            let prev = if bars.len() >= 2 {
                Some(bars[bars.len() - 2].point.close)
            } else {
                provider_prev
            };
            (prev, bars.last().and_then(|b| b.open), reference_closes(&points, now))
        }
    };

    let market_date = bars
        .last()
        .and_then(|b| b.point.date(offset))
        .unwrap_or_else(|| now.date_naive());

    let (currency, divisor) = normalize_currency(meta.currency.as_deref().unwrap_or("USD"));
    let scale = |v: f64| v / divisor;

    let quote = Quote {
        symbol: symbol.to_string(),
        name: meta.long_name.clone().or_else(|| meta.short_name.clone()),
        exchange: meta
            .full_exchange_name
            .clone()
            .or_else(|| meta.exchange_name.clone()),
        price: scale(price),
        prev_close: prev_close.filter(|p| valid_price(*p)).map(scale),
        open: open.filter(|p| valid_price(*p)).map(scale),
        change: None,
        change_pct: None,
        refs: refs.into_iter().map(|(k, v)| (k, scale(v))).collect(),
        currency,
        market_date,
        source: crate::models::quote::QuoteSource::Yahoo,
        fetched_at: now,
        stale: false,
    };
    Ok(quote.with_derived_change())
}

fn parse_alphavantage(
    symbol: &str,
    bundle: &AlphaVantageBundle,
    now: DateTime<Utc>,
) -> Result<Quote, ParseError> {
    let bars = alphavantage_bars(bundle);
    let quote = bundle.quote.as_ref();

    let live_price = quote
        .and_then(|q| q.price.as_deref())
        .and_then(parse_number)
        .filter(|p| valid_price(*p));

    if bars.is_empty() && live_price.is_none() {
        return Err(if bundle.series.is_empty() && quote.is_none() {
            ParseError::NoSeriesData(symbol.to_string())
        } else {
            ParseError::MissingPriceField(symbol.to_string())
        });
    }

    let price = live_price
        .or_else(|| bars.last().map(|b| b.point.close))
        .ok_or_else(|| ParseError::MissingPriceField(symbol.to_string()))?;

    let prev_close = if bars.len() >= 2 {
        Some(bars[bars.len() - 2].point.close)
    } else {
        quote
            .and_then(|q| q.previous_close.as_deref())
            .and_then(parse_number)
    };
    let open = quote
        .and_then(|q| q.open.as_deref())
        .and_then(parse_number)
        .or_else(|| bars.last().and_then(|b| b.open));

    let points: Vec<SeriesPoint> = bars.iter().map(|b| b.point).collect();
    let market_date = bars
        .last()
        .and_then(|b| b.point.date(0))
        .or_else(|| {
            quote
                .and_then(|q| q.latest_trading_day.as_deref())
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        })
        .unwrap_or_else(|| now.date_naive());

    let overview = bundle.overview.as_ref();
    let (currency, divisor) =
        normalize_currency(overview.and_then(|o| o.currency.as_deref()).unwrap_or("USD"));
    let scale = |v: f64| v / divisor;

    let quote = Quote {
        symbol: symbol.to_string(),
        name: overview.and_then(|o| o.name.clone()),
        exchange: overview.and_then(|o| o.exchange.clone()),
        price: scale(price),
        prev_close: prev_close.filter(|p| valid_price(*p)).map(scale),
        open: open.filter(|p| valid_price(*p)).map(scale),
        change: None,
        change_pct: None,
        refs: reference_closes(&points, now)
            .into_iter()
            .map(|(k, v)| (k, scale(v)))
            .collect(),
        currency,
        market_date,
        source: crate::models::quote::QuoteSource::AlphaVantage,
        fetched_at: now,
        stale: false,
    };
    Ok(quote.with_derived_change())
}

// ── Reference points ────────────────────────────────────────────────

/// Cutoff instant for a reference period relative to `now`.
pub fn reference_cutoff(period: RefPeriod, now: DateTime<Utc>) -> DateTime<Utc> {
    match period.days_back() {
        Some(days) => now - Duration::days(days),
        None => Utc
            .with_ymd_and_hms(now.year(), 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(now),
    }
}

/// The series point with minimum absolute distance to `target_ts`.
/// May lie after the target when the exact day was not a trading day.
pub fn nearest_point(series: &[SeriesPoint], target_ts: i64) -> Option<SeriesPoint> {
    series
        .iter()
        .min_by_key(|p| (p.timestamp - target_ts).unsigned_abs())
        .copied()
}

/// Closes nearest each reference cutoff. Periods whose nearest point is
/// more than `REF_WINDOW_DAYS` away are omitted.
pub fn reference_closes(
    series: &[SeriesPoint],
    now: DateTime<Utc>,
) -> BTreeMap<RefPeriod, f64> {
    let window = REF_WINDOW_DAYS * SECS_PER_DAY;
    RefPeriod::ALL
        .iter()
        .filter_map(|period| {
            let target = reference_cutoff(*period, now).timestamp();
            let point = nearest_point(series, target)?;
            if (point.timestamp - target).abs() <= window {
                Some((*period, point.close))
            } else {
                None
            }
        })
        .collect()
}

// ── Historical point lookup ─────────────────────────────────────────

/// Price of `symbol` on `date`: the nearest trading day at or before the
/// date, or the first available day when the date predates all history.
///
/// With `split_adjust`, splits dated after `date` are multiplied back in so
/// the result is the price as actually traded on that day.
pub fn lookup_on_date(
    symbol: &str,
    payload: &RawPayload,
    date: NaiveDate,
    today: NaiveDate,
    split_adjust: bool,
) -> Result<HistoricalPoint, ParseError> {
    let symbol = symbol.trim().to_uppercase();
    let (bars, offset, currency) = match payload {
        RawPayload::Yahoo(result) => (
            chart_bars(result),
            result.meta.gmt_offset.unwrap_or(0),
            result.meta.currency.clone().unwrap_or_else(|| "USD".into()),
        ),
        RawPayload::AlphaVantage(bundle) => (
            alphavantage_bars(bundle),
            0,
            bundle
                .overview
                .as_ref()
                .and_then(|o| o.currency.clone())
                .unwrap_or_else(|| "USD".into()),
        ),
    };

    let dated: Vec<(NaiveDate, f64)> = bars
        .iter()
        .filter_map(|b| b.point.date(offset).map(|d| (d, b.point.close)))
        .collect();

    let is_historical = date < today;
    let chosen = if is_historical {
        dated
            .iter()
            .rev()
            .find(|(d, _)| *d <= date)
            .or_else(|| dated.first())
    } else {
        dated.last()
    };

    let (actual, close) = match chosen {
        Some(found) => *found,
        None => {
            // No series: a current request can still use the live field.
            let live = match payload {
                RawPayload::Yahoo(result) if !is_historical => {
                    result.meta.regular_market_price.filter(|p| valid_price(*p))
                }
                _ => None,
            };
            match live {
                Some(p) => (today, p),
                None => return Err(ParseError::NoSeriesData(symbol)),
            }
        }
    };

    let split_factor = if split_adjust && is_historical {
        split_factor_after(&splits(payload), date)
    } else {
        1.0
    };

    let (currency, divisor) = normalize_currency(&currency);
    Ok(HistoricalPoint {
        symbol,
        price: close * split_factor / divisor,
        currency,
        date: actual,
        requested_date: date,
        days_off: (date - actual).num_days().abs(),
        is_historical,
        split_factor,
    })
}

/// Cumulative ratio of all splits dated strictly after `date`.
pub fn split_factor_after(splits: &[SplitEvent], date: NaiveDate) -> f64 {
    splits
        .iter()
        .filter(|s| s.date > date)
        .map(|s| s.ratio())
        .filter(|r| r.is_finite() && *r > 0.0)
        .product()
}

// ── Corporate actions & series ──────────────────────────────────────

/// Split events in a payload, oldest first.
pub fn splits(payload: &RawPayload) -> Vec<SplitEvent> {
    let RawPayload::Yahoo(result) = payload else {
        return Vec::new();
    };
    let offset = result.meta.gmt_offset.unwrap_or(0);
    let mut out: Vec<SplitEvent> = result
        .events
        .as_ref()
        .map(|e| {
            e.splits
                .values()
                .filter_map(|s| {
                    Some(SplitEvent {
                        date: SeriesPoint::new(s.date, 0.0).date(offset)?,
                        numerator: s.numerator,
                        denominator: s.denominator,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    out.sort_by_key(|s| s.date);
    out
}

/// Dividend events in a payload, oldest first.
pub fn dividends(payload: &RawPayload) -> Vec<DividendEvent> {
    let RawPayload::Yahoo(result) = payload else {
        return Vec::new();
    };
    let offset = result.meta.gmt_offset.unwrap_or(0);
    let (_, divisor) = normalize_currency(result.meta.currency.as_deref().unwrap_or("USD"));
    let mut out: Vec<DividendEvent> = result
        .events
        .as_ref()
        .map(|e| {
            e.dividends
                .values()
                .filter_map(|d| {
                    Some(DividendEvent {
                        date: SeriesPoint::new(d.date, 0.0).date(offset)?,
                        amount: d.amount / divisor,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    out.sort_by_key(|d| d.date);
    out
}

/// Valid closes of a payload as dated points, oldest first, one per day.
pub fn daily_closes(payload: &RawPayload) -> Vec<PricePoint> {
    let (bars, offset) = match payload {
        RawPayload::Yahoo(result) => (chart_bars(result), result.meta.gmt_offset.unwrap_or(0)),
        RawPayload::AlphaVantage(bundle) => (alphavantage_bars(bundle), 0),
    };
    let (_, divisor) = normalize_currency(raw_currency(payload).unwrap_or("USD"));

    let mut points: Vec<PricePoint> = Vec::with_capacity(bars.len());
    for bar in bars {
        let Some(date) = bar.point.date(offset) else {
            continue;
        };
        let price = bar.point.close / divisor;
        match points.last_mut() {
            // Same day twice (live bar appended): keep the latest.
            Some(last) if last.date == date => last.price = price,
            _ => points.push(PricePoint { date, price }),
        }
    }
    points
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Major-unit trading currency of a payload.
pub fn payload_currency(payload: &RawPayload) -> String {
    normalize_currency(raw_currency(payload).unwrap_or("USD")).0
}

fn raw_currency(payload: &RawPayload) -> Option<&str> {
    match payload {
        RawPayload::Yahoo(result) => result.meta.currency.as_deref(),
        RawPayload::AlphaVantage(bundle) => {
            bundle.overview.as_ref().and_then(|o| o.currency.as_deref())
        }
    }
}

/// Map minor-unit currency codes to their major unit and divisor.
pub fn normalize_currency(code: &str) -> (String, f64) {
    match code.trim() {
        "GBp" | "GBX" => ("GBP".to_string(), 100.0),
        "ZAc" | "ZAC" => ("ZAR".to_string(), 100.0),
        "ILA" => ("ILS".to_string(), 100.0),
        other if other.is_empty() => ("USD".to_string(), 1.0),
        other => (other.to_uppercase(), 1.0),
    }
}

fn valid_price(p: f64) -> bool {
    p.is_finite() && p > 0.0
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().trim_end_matches('%').parse::<f64>().ok()
}

fn chart_bars(result: &ChartResult) -> Vec<Bar> {
    let Some(series) = result.indicators.quote.first() else {
        return Vec::new();
    };
    let mut bars: Vec<Bar> = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let close = series.close.get(i).copied().flatten()?;
            if !valid_price(close) {
                return None;
            }
            Some(Bar {
                point: SeriesPoint::new(*ts, close),
                open: series.open.get(i).copied().flatten(),
            })
        })
        .collect();
    bars.sort_by_key(|b| b.point.timestamp);
    bars
}

fn alphavantage_bars(bundle: &AlphaVantageBundle) -> Vec<Bar> {
    // BTreeMap over ISO dates iterates oldest first.
    bundle
        .series
        .iter()
        .filter_map(|(day, bar)| {
            let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
            let close = parse_number(&bar.close).filter(|c| valid_price(*c))?;
            let ts = date.and_hms_opt(0, 0, 0)?.and_utc().timestamp();
            Some(Bar {
                point: SeriesPoint::new(ts, close),
                open: bar.open.as_deref().and_then(parse_number),
            })
        })
        .collect()
}
