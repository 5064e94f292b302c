use crate::config::{env_or, Settings};
use crate::domain::quote::{Fundamentals, Metric};
use crate::error::FetchError;
use crate::http::{self, RetryPolicy, SharedRateLimiter};
use crate::market::provider::FundamentalsProvider;
use anyhow::Result;
use serde_json::{Map, Value};

const PROVIDER: &str = "alpha_vantage";
const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";
// Free tier allows 5 requests per minute.
const DEFAULT_REQUESTS_PER_MINUTE: u32 = 5;

pub struct AlphaVantageClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
    limiter: SharedRateLimiter,
}

impl AlphaVantageClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_alpha_vantage_api_key()?.to_string();
        let timeout_secs = env_or("ALPHA_VANTAGE_TIMEOUT_SECS", http::DEFAULT_TIMEOUT_SECS);
        let rpm = env_or("ALPHA_VANTAGE_RPM", DEFAULT_REQUESTS_PER_MINUTE);

        Ok(Self {
            http: http::build_client(timeout_secs)?,
            base_url: std::env::var("ALPHA_VANTAGE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_key,
            retry: RetryPolicy::from_env(),
            limiter: http::per_minute_limiter(rpm),
        })
    }
}

#[async_trait::async_trait]
impl FundamentalsProvider for AlphaVantageClient {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_fundamentals(&self, symbol: &str) -> Result<Fundamentals, FetchError> {
        let url = format!("{}/query", self.base_url.trim_end_matches('/'));
        let query = [
            ("function", "OVERVIEW".to_string()),
            ("symbol", symbol.replace('.', "-")),
            ("apikey", self.api_key.clone()),
        ];

        self.limiter.until_ready().await;
        let (body, _) = http::json_with_retry::<Map<String, Value>, _>(&self.retry, PROVIDER, || {
            self.http.get(&url).query(&query)
        })
        .await?;

        parse_overview(symbol, &body)
    }
}

// Alpha Vantage answers 200 for everything: throttling arrives as a `Note` or
// `Information` message and unknown symbols as an empty object.
fn parse_overview(symbol: &str, body: &Map<String, Value>) -> Result<Fundamentals, FetchError> {
    if body.contains_key("Note") || body.contains_key("Information") {
        return Err(FetchError::RateLimited {
            provider: PROVIDER.to_string(),
            retry_after: None,
        });
    }
    if let Some(msg) = body.get("Error Message").and_then(Value::as_str) {
        return Err(FetchError::Config {
            provider: PROVIDER.to_string(),
            detail: msg.to_string(),
        });
    }
    if body.is_empty() || !body.contains_key("Symbol") {
        return Err(FetchError::NoData {
            provider: PROVIDER.to_string(),
            symbol: symbol.to_string(),
        });
    }

    Ok(Fundamentals {
        symbol: symbol.to_string(),
        name: field_str(body, "Name"),
        market_cap: field_f64(body, "MarketCapitalization"),
        pe_ratio: field_f64(body, "PERatio"),
        dividend_yield: field_f64(body, "DividendYield"),
        beta: field_f64(body, "Beta"),
    })
}

fn field_str(body: &Map<String, Value>, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !is_placeholder(s))
        .map(str::to_string)
}

/// Numbers arrive as strings; "None", "-" and "" mean the metric does not exist.
fn field_f64(body: &Map<String, Value>, key: &str) -> Metric<f64> {
    let v = match body.get(key) {
        Some(Value::String(s)) if !is_placeholder(s.trim()) => s.trim().parse::<f64>().ok(),
        Some(Value::Number(n)) => n.as_f64(),
        _ => None,
    };
    Metric::finite(v)
}

fn is_placeholder(s: &str) -> bool {
    s.is_empty() || s == "-" || s.eq_ignore_ascii_case("none")
}
