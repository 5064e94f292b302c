use crate::config::env_or;
use crate::error::FetchError;
use anyhow::Context;
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, StatusCode};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str = concat!("tickerbuzz/", env!("CARGO_PKG_VERSION"));

const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 1000;
const MAX_ERROR_BODY_CHARS: usize = 512;
const MAX_RETRY_AFTER_SECS: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRIES,
            base_backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        Self {
            max_attempts: env_or("HTTP_RETRIES", DEFAULT_RETRIES).max(1),
            base_backoff: Duration::from_millis(env_or("HTTP_BACKOFF_MS", DEFAULT_BACKOFF_MS)),
        }
    }

    /// Backoff before retry number `attempt` (1-based): base, 2*base, 4*base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1u32 << exp)
    }
}

pub fn build_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(DEFAULT_USER_AGENT)
        .build()
        .context("failed to build http client")
}

pub type SharedRateLimiter = Arc<DefaultDirectRateLimiter>;

/// Client-side pacing so a provider's per-minute quota is not exceeded in the first place.
pub fn per_minute_limiter(requests_per_minute: u32) -> SharedRateLimiter {
    let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_minute(rpm)))
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Sends the request built by `build` and decodes the JSON body, retrying transient failures
/// (including a truncated or garbled body) with exponential backoff. HTTP 429 is returned as
/// `FetchError::RateLimited` right away.
pub async fn json_with_retry<T, F>(
    policy: &RetryPolicy,
    provider: &str,
    build: F,
) -> Result<(T, HeaderMap), FetchError>
where
    T: DeserializeOwned,
    F: Fn() -> RequestBuilder,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let res = send_once(provider, build()).await.and_then(|res| {
            serde_json::from_str::<T>(&res.body)
                .map(|parsed| (parsed, res.headers))
                .map_err(|source| FetchError::Decode {
                    provider: provider.to_string(),
                    source,
                })
        });

        match res {
            Ok(out) => return Ok(out),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let backoff = policy.backoff(attempt);
                tracing::warn!(provider, attempt, ?backoff, error = %err, "request failed; retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn send_once(provider: &str, req: RequestBuilder) -> Result<HttpResponse, FetchError> {
    let transport = |source| FetchError::Transport {
        provider: provider.to_string(),
        source,
    };

    let res = req.send().await.map_err(transport)?;
    let status = res.status();
    let headers = res.headers().clone();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited {
            provider: provider.to_string(),
            retry_after: retry_after(&headers),
        });
    }

    let body = res.text().await.map_err(transport)?;
    if !status.is_success() {
        return Err(FetchError::Http {
            provider: provider.to_string(),
            status,
            body: truncate_body(&body),
        });
    }

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_f64(headers, "retry-after").and_then(delay_from_secs)
}

/// Converts a provider-supplied wait in seconds, capped at one day. Negative or non-finite
/// values are ignored.
pub fn delay_from_secs(secs: f64) -> Option<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs.min(MAX_RETRY_AFTER_SECS)))
}

/// True when a provider's remaining-quota header says no requests are left in this period.
pub fn quota_exhausted(headers: &HeaderMap, remaining_header: &str) -> bool {
    header_f64(headers, remaining_header).is_some_and(|remaining| remaining < 1.0)
}

pub fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let mut out: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    out.push_str("...");
    out
}
