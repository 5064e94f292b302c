use crate::config::env_or;
use crate::domain::quote::{
    average_volume, price_change, MarketData, Metric, PricePoint, QuoteSnapshot,
};
use crate::error::FetchError;
use crate::http::{self, RetryPolicy};
use crate::market::provider::MarketDataProvider;
use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

const PROVIDER: &str = "yahoo";
const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Clone)]
pub struct YahooClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl YahooClient {
    pub fn from_env() -> Result<Self> {
        let timeout_secs = env_or("YAHOO_TIMEOUT_SECS", http::DEFAULT_TIMEOUT_SECS);
        Ok(Self {
            http: http::build_client(timeout_secs)?,
            base_url: std::env::var("YAHOO_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            retry: RetryPolicy::from_env(),
        })
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for YahooClient {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch(&self, symbol: &str, history_days: u32) -> Result<MarketData, FetchError> {
        let url = format!(
            "{}/v8/finance/chart/{}",
            self.base_url.trim_end_matches('/'),
            yahoo_symbol(symbol)
        );
        let query = [
            ("range", chart_range(history_days).to_string()),
            ("interval", "1d".to_string()),
        ];

        let res = http::json_with_retry::<ChartEnvelope, _>(&self.retry, PROVIDER, || {
            self.http.get(&url).query(&query)
        })
        .await;

        let chart = match res {
            Ok((envelope, _)) => envelope.chart,
            Err(FetchError::Http { status, .. }) if status == StatusCode::NOT_FOUND => {
                return Err(no_data(symbol));
            }
            Err(err) => return Err(err),
        };

        parse_chart(symbol, chart, history_days)
    }
}

/// Yahoo writes share classes with a dash (`BRK-B`).
fn yahoo_symbol(symbol: &str) -> String {
    symbol.replace('.', "-")
}

fn chart_range(history_days: u32) -> &'static str {
    match history_days {
        0..=5 => "5d",
        6..=31 => "1mo",
        32..=92 => "3mo",
        93..=183 => "6mo",
        184..=366 => "1y",
        367..=731 => "2y",
        _ => "5y",
    }
}

fn no_data(symbol: &str) -> FetchError {
    FetchError::NoData {
        provider: PROVIDER.to_string(),
        symbol: symbol.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    currency: Option<String>,
    long_name: Option<String>,
    short_name: Option<String>,
    regular_market_price: Option<f64>,
    previous_close: Option<f64>,
    regular_market_volume: Option<u64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

// Every series is positional against `timestamp`; holidays and halts show up as nulls.
#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

fn parse_chart(symbol: &str, chart: Chart, history_days: u32) -> Result<MarketData, FetchError> {
    if let Some(err) = chart.error {
        tracing::debug!(
            symbol,
            code = err.code.as_deref().unwrap_or("-"),
            description = err.description.as_deref().unwrap_or("-"),
            "yahoo chart error"
        );
        return Err(no_data(symbol));
    }
    let Some(result) = chart.result.and_then(|r| r.into_iter().next()) else {
        return Err(no_data(symbol));
    };

    let series = result
        .indicators
        .and_then(|i| i.quote.into_iter().next())
        .unwrap_or_default();
    let mut history = bars(&result.timestamp, &series);

    let meta = result.meta;
    let as_of = meta
        .regular_market_time
        .and_then(|t| DateTime::from_timestamp(t, 0))
        .or_else(|| {
            result
                .timestamp
                .last()
                .and_then(|t| DateTime::from_timestamp(*t, 0))
        })
        .unwrap_or_else(Utc::now);

    let price = Metric::finite(meta.regular_market_price)
        .or(Metric::from_option(history.last().map(|p| p.close)));
    if !price.is_available() {
        return Err(no_data(symbol));
    }

    // `chartPreviousClose` is the close before the range start, so it is not used here.
    let market_day = as_of.date_naive();
    let previous_close = Metric::finite(meta.previous_close).or(Metric::from_option(
        history
            .iter()
            .rev()
            .find(|p| p.date < market_day)
            .map(|p| p.close),
    ));
    let (change, change_percent) = price_change(price, previous_close);

    let cutoff = market_day - Duration::days(i64::from(history_days));
    history.retain(|p| p.date > cutoff);

    let latest_bar = history.last().filter(|p| p.date == market_day);
    let quote = QuoteSnapshot {
        symbol: symbol.to_string(),
        name: meta.long_name.or(meta.short_name),
        currency: meta.currency,
        price,
        previous_close,
        change,
        change_percent,
        volume: Metric::from_option(meta.regular_market_volume)
            .or(latest_bar.map(|p| p.volume).unwrap_or_default()),
        avg_volume: average_volume(&history),
        day_high: Metric::finite(meta.regular_market_day_high)
            .or(latest_bar.map(|p| p.high).unwrap_or_default()),
        day_low: Metric::finite(meta.regular_market_day_low)
            .or(latest_bar.map(|p| p.low).unwrap_or_default()),
        market_cap: Metric::Unavailable,
        pe_ratio: Metric::Unavailable,
        dividend_yield: Metric::Unavailable,
        beta: Metric::Unavailable,
        as_of,
    };

    Ok(MarketData { quote, history })
}

fn bars(timestamps: &[i64], series: &QuoteSeries) -> Vec<PricePoint> {
    let at = |v: &[Option<f64>], i: usize| Metric::finite(v.get(i).copied().flatten());

    timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let date: NaiveDate = DateTime::from_timestamp(*ts, 0)?.date_naive();
            let close = series
                .close
                .get(i)
                .copied()
                .flatten()
                .filter(|c| c.is_finite())?;
            Some(PricePoint {
                date,
                open: at(&series.open, i),
                high: at(&series.high, i),
                low: at(&series.low, i),
                close,
                volume: Metric::from_option(series.volume.get(i).copied().flatten()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture() -> serde_json::Value {
        // 2026-02-26 .. 2026-03-02 at 14:30 UTC; 2026-02-27 close missing.
        json!({
            "chart": {
                "result": [{
                    "meta": {
                        "currency": "USD",
                        "symbol": "AAPL",
                        "longName": "Apple Inc.",
                        "regularMarketPrice": 231.5,
                        "chartPreviousClose": 200.0,
                        "regularMarketVolume": 51000000,
                        "regularMarketDayHigh": 233.0,
                        "regularMarketDayLow": 228.4,
                        "regularMarketTime": 1772481600
                    },
                    "timestamp": [1772116200, 1772202600, 1772461800],
                    "indicators": {
                        "quote": [{
                            "open": [225.0, 226.0, 229.0],
                            "high": [227.0, 228.0, 233.0],
                            "low": [224.0, null, 228.4],
                            "close": [226.5, null, 231.5],
                            "volume": [40000000, null, 51000000]
                        }]
                    }
                }],
                "error": null
            }
        })
    }

    #[test]
    fn parses_chart_into_quote_and_history() {
        let env: ChartEnvelope = serde_json::from_value(fixture()).unwrap();
        let data = parse_chart("AAPL", env.chart, 30).unwrap();

        assert_eq!(data.history.len(), 2);
        assert_eq!(data.history[0].close, 226.5);

        let q = &data.quote;
        assert_eq!(q.name.as_deref(), Some("Apple Inc."));
        assert_eq!(q.price, Metric::Available(231.5));
        // Previous trading day's close, not chartPreviousClose.
        assert_eq!(q.previous_close, Metric::Available(226.5));
        assert!(q.change_percent.is_available());
        assert_eq!(q.volume, Metric::Available(51_000_000));
        assert_eq!(q.avg_volume, Metric::Available(45_500_000.0));
        assert_eq!(q.pe_ratio, Metric::Unavailable);
    }

    #[test]
    fn chart_error_is_no_data() {
        let v = json!({
            "chart": {
                "result": null,
                "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}
            }
        });
        let env: ChartEnvelope = serde_json::from_value(v).unwrap();
        let err = parse_chart("ZZZZ", env.chart, 30).unwrap_err();
        assert!(matches!(err, FetchError::NoData { .. }));
    }

    #[test]
    fn history_is_trimmed_to_requested_days() {
        let env: ChartEnvelope = serde_json::from_value(fixture()).unwrap();
        let data = parse_chart("AAPL", env.chart, 1).unwrap();
        assert_eq!(data.history.len(), 1);
        assert_eq!(data.history[0].close, 231.5);
    }

    #[test]
    fn maps_symbols_and_ranges() {
        assert_eq!(yahoo_symbol("BRK.B"), "BRK-B");
        assert_eq!(chart_range(30), "1mo");
        assert_eq!(chart_range(90), "3mo");
        assert_eq!(chart_range(1000), "5y");
    }
}
