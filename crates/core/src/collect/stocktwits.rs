use crate::collect::source::MentionSource;
use crate::config::env_or;
use crate::domain::mention::{RawPost, Source};
use crate::error::FetchError;
use crate::http::{self, RetryPolicy};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;

const PROVIDER: &str = "stocktwits";
const DEFAULT_BASE_URL: &str = "https://api.stocktwits.com";
const RATE_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Public trending stream; no credentials needed.
pub struct StockTwitsClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl StockTwitsClient {
    pub fn from_env() -> Result<Self> {
        let timeout_secs = env_or("STOCKTWITS_TIMEOUT_SECS", http::DEFAULT_TIMEOUT_SECS);
        Ok(Self {
            http: http::build_client(timeout_secs)?,
            base_url: std::env::var("STOCKTWITS_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            retry: RetryPolicy::from_env(),
        })
    }
}

#[async_trait::async_trait]
impl MentionSource for StockTwitsClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn source(&self) -> Source {
        Source::StockTwits
    }

    async fn fetch_posts(&self, since: DateTime<Utc>) -> Result<Vec<RawPost>, FetchError> {
        let url = format!(
            "{}/api/2/streams/trending.json",
            self.base_url.trim_end_matches('/')
        );
        let (stream, headers) =
            http::json_with_retry::<Stream, _>(&self.retry, PROVIDER, || self.http.get(&url))
                .await?;

        let posts = stream.posts(since);
        if posts.is_empty() && http::quota_exhausted(&headers, RATE_REMAINING_HEADER) {
            return Err(FetchError::RateLimited {
                provider: PROVIDER.to_string(),
                retry_after: http::retry_after(&headers),
            });
        }
        Ok(posts)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Stream {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Clone, Deserialize)]
struct Message {
    id: u64,
    #[serde(default)]
    body: String,
    created_at: DateTime<Utc>,
}

impl Stream {
    fn posts(&self, since: DateTime<Utc>) -> Vec<RawPost> {
        self.messages
            .iter()
            .filter(|m| m.created_at >= since && !m.body.trim().is_empty())
            .map(|m| RawPost {
                source: Source::StockTwits,
                id: m.id.to_string(),
                text: m.body.clone(),
                created_at: m.created_at,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn parses_trending_stream() {
        let v = json!({
            "response": {"status": 200},
            "messages": [
                {"id": 581234567, "body": "$AMD chip sales beating expectations",
                 "created_at": "2026-03-02T14:05:11Z", "user": {"id": 1, "username": "x"},
                 "symbols": [{"symbol": "AMD"}]},
                {"id": 581234000, "body": "$SPY older", "created_at": "2026-02-20T10:00:00Z"},
                {"id": 581234001, "body": "  ", "created_at": "2026-03-02T14:00:00Z"}
            ]
        });
        let stream: Stream = serde_json::from_value(v).unwrap();
        let since = Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap();
        let posts = stream.posts(since);

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "581234567");
        assert_eq!(posts[0].source, Source::StockTwits);
        assert_eq!(posts[0].text, "$AMD chip sales beating expectations");
    }
}
