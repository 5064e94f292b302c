use crate::collect::source::MentionSource;
use crate::config::{env_or, Settings};
use crate::domain::mention::{RawPost, Source};
use crate::error::FetchError;
use crate::http::{self, RetryPolicy};
use anyhow::Result;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Deserialize;

const PROVIDER: &str = "twitter";
const DEFAULT_BASE_URL: &str = "https://api.twitter.com";
const DEFAULT_QUERY: &str =
    "($AAPL OR $TSLA OR $MSFT OR $GOOGL OR $AMZN OR $NVDA) lang:en -is:retweet";
const RATE_REMAINING_HEADER: &str = "x-rate-limit-remaining";
const RATE_RESET_HEADER: &str = "x-rate-limit-reset";
const MAX_RESULTS: u32 = 100;

// Recent search only reaches seven days back.
const SEARCH_HORIZON_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitterOptions {
    pub query: String,
    pub max_pages: u32,
}

impl Default for TwitterOptions {
    fn default() -> Self {
        Self {
            query: DEFAULT_QUERY.to_string(),
            max_pages: 1,
        }
    }
}

impl TwitterOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();
        if let Ok(q) = std::env::var("TWITTER_QUERY") {
            if !q.trim().is_empty() {
                out.query = q.trim().to_string();
            }
        }
        out.max_pages = env_or("TWITTER_MAX_PAGES", out.max_pages).clamp(1, 10);
        out
    }
}

pub struct TwitterClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
    options: TwitterOptions,
    retry: RetryPolicy,
}

impl TwitterClient {
    pub fn from_settings(settings: &Settings, options: TwitterOptions) -> Result<Self> {
        let bearer_token = settings.require_twitter_bearer_token()?.to_string();
        let timeout_secs = env_or("TWITTER_TIMEOUT_SECS", http::DEFAULT_TIMEOUT_SECS);
        Ok(Self {
            http: http::build_client(timeout_secs)?,
            base_url: std::env::var("TWITTER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            bearer_token,
            options,
            retry: RetryPolicy::from_env(),
        })
    }

    async fn search_page(
        &self,
        start_time: &str,
        next_token: Option<&str>,
    ) -> Result<SearchResponse, FetchError> {
        let url = format!(
            "{}/2/tweets/search/recent",
            self.base_url.trim_end_matches('/')
        );
        let mut query = vec![
            ("query", self.options.query.clone()),
            ("max_results", MAX_RESULTS.to_string()),
            ("tweet.fields", "created_at".to_string()),
            ("start_time", start_time.to_string()),
        ];
        if let Some(token) = next_token {
            query.push(("next_token", token.to_string()));
        }

        let (page, headers) = http::json_with_retry::<SearchResponse, _>(&self.retry, PROVIDER, || {
            self.http
                .get(&url)
                .bearer_auth(&self.bearer_token)
                .query(&query)
        })
        .await?;

        if http::quota_exhausted(&headers, RATE_REMAINING_HEADER) {
            // The reset header is an epoch timestamp, not a delay.
            let retry_after = http::header_f64(&headers, RATE_RESET_HEADER)
                .map(|reset| reset - Utc::now().timestamp() as f64)
                .filter(|secs| *secs > 0.0)
                .and_then(http::delay_from_secs);
            return Err(FetchError::RateLimited {
                provider: PROVIDER.to_string(),
                retry_after,
            });
        }

        Ok(page)
    }
}

#[async_trait::async_trait]
impl MentionSource for TwitterClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn source(&self) -> Source {
        Source::Twitter
    }

    async fn fetch_posts(&self, since: DateTime<Utc>) -> Result<Vec<RawPost>, FetchError> {
        let start_time = search_start(since, Utc::now());
        let mut out = Vec::new();
        let mut next_token: Option<String> = None;

        for page_no in 1..=self.options.max_pages {
            let page = self.search_page(&start_time, next_token.as_deref()).await?;
            let posts = page.posts(since);
            tracing::debug!(page = page_no, posts = posts.len(), "twitter search page fetched");
            out.extend(posts);

            match page.meta.and_then(|m| m.next_token) {
                Some(t) => next_token = Some(t),
                None => break,
            }
        }
        Ok(out)
    }
}

fn search_start(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    // A minute of slack so the earliest allowed instant is not already past on arrival.
    let earliest = now - Duration::days(SEARCH_HORIZON_DAYS) + Duration::minutes(1);
    since.max(earliest).to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Tweet>,
    meta: Option<SearchMeta>,
}

#[derive(Debug, Clone, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchMeta {
    next_token: Option<String>,
}

impl SearchResponse {
    fn posts(&self, since: DateTime<Utc>) -> Vec<RawPost> {
        self.data
            .iter()
            .filter_map(|t| {
                let created_at = t.created_at?;
                (created_at >= since).then(|| RawPost {
                    source: Source::Twitter,
                    id: t.id.clone(),
                    text: t.text.clone(),
                    created_at,
                })
            })
            .collect()
    }
}
