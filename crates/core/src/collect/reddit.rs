use crate::collect::source::MentionSource;
use crate::config::{env_or, Settings};
use crate::domain::mention::{RawPost, Source};
use crate::error::FetchError;
use crate::http::{self, RetryPolicy, SharedRateLimiter};
use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

const PROVIDER: &str = "reddit";
const DEFAULT_AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";
const DEFAULT_API_BASE_URL: &str = "https://oauth.reddit.com";
const DEFAULT_SUBREDDITS: &[&str] = &["wallstreetbets", "stocks", "investing"];
const DEFAULT_POST_LIMIT: u32 = 100;
const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;
const RATE_REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RATE_RESET_HEADER: &str = "x-ratelimit-reset";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedditOptions {
    pub subreddits: Vec<String>,
    /// Posts per subreddit listing (Reddit caps this at 100).
    pub post_limit: u32,
    /// Top-level comments fetched per post; 0 disables comment scraping.
    pub comments_per_post: u32,
}

impl Default for RedditOptions {
    fn default() -> Self {
        Self {
            subreddits: DEFAULT_SUBREDDITS.iter().map(|s| s.to_string()).collect(),
            post_limit: DEFAULT_POST_LIMIT,
            comments_per_post: 0,
        }
    }
}

impl RedditOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("REDDIT_SUBREDDITS") {
            let subs: Vec<String> = s
                .split(',')
                .map(|p| p.trim().trim_start_matches("r/").to_string())
                .filter(|p| !p.is_empty())
                .collect();
            if !subs.is_empty() {
                out.subreddits = subs;
            }
        }

        out.post_limit = env_or("REDDIT_POST_LIMIT", out.post_limit).clamp(1, 100);
        out.comments_per_post = env_or("REDDIT_COMMENTS_PER_POST", out.comments_per_post).min(100);
        out
    }
}

pub struct RedditClient {
    http: reqwest::Client,
    auth_url: String,
    api_base_url: String,
    client_id: String,
    client_secret: String,
    user_agent: String,
    options: RedditOptions,
    retry: RetryPolicy,
    limiter: SharedRateLimiter,

    // Application-only tokens last a day; reuse one across cycles.
    token_cache: tokio::sync::Mutex<Option<CachedToken>>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: RedditToken,
    fetched_at: DateTime<Utc>,
}

impl RedditClient {
    pub fn from_settings(settings: &Settings, options: RedditOptions) -> Result<Self> {
        let (client_id, client_secret) = settings.require_reddit_credentials()?;
        let user_agent = settings
            .reddit_user_agent
            .clone()
            .unwrap_or_else(|| http::DEFAULT_USER_AGENT.to_string());

        let timeout_secs = env_or("REDDIT_TIMEOUT_SECS", http::DEFAULT_TIMEOUT_SECS);
        let rpm = env_or("REDDIT_REQUESTS_PER_MINUTE", DEFAULT_REQUESTS_PER_MINUTE);

        Ok(Self {
            http: http::build_client(timeout_secs)?,
            auth_url: std::env::var("REDDIT_AUTH_URL")
                .unwrap_or_else(|_| DEFAULT_AUTH_URL.to_string()),
            api_base_url: std::env::var("REDDIT_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string()),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            user_agent,
            options,
            retry: RetryPolicy::from_env(),
            limiter: http::per_minute_limiter(rpm),
            token_cache: tokio::sync::Mutex::new(None),
        })
    }

    async fn get_access_token_cached(&self) -> Result<RedditToken, FetchError> {
        let mut guard = self.token_cache.lock().await;
        if let Some(cached) = guard.as_ref() {
            if !cached.token.is_stale_at(cached.fetched_at, Utc::now()) {
                return Ok(cached.token.clone());
            }
        }

        let fetched_at = Utc::now();
        let token = self.fetch_access_token().await?;
        *guard = Some(CachedToken {
            token: token.clone(),
            fetched_at,
        });
        Ok(token)
    }

    async fn fetch_access_token(&self) -> Result<RedditToken, FetchError> {
        self.limiter.until_ready().await;
        let (token, _) = http::json_with_retry::<RedditToken, _>(&self.retry, PROVIDER, || {
            self.http
                .post(&self.auth_url)
                .basic_auth(&self.client_id, Some(&self.client_secret))
                .header(USER_AGENT, &self.user_agent)
                .form(&[("grant_type", "client_credentials")])
        })
        .await?;

        if token.access_token.trim().is_empty() {
            return Err(FetchError::Config {
                provider: PROVIDER.to_string(),
                detail: "token response has no access_token".to_string(),
            });
        }
        Ok(token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        token: &RedditToken,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<(T, HeaderMap), FetchError> {
        self.limiter.until_ready().await;
        http::json_with_retry::<T, _>(&self.retry, PROVIDER, || {
            self.http
                .get(url)
                .bearer_auth(&token.access_token)
                .header(USER_AGENT, &self.user_agent)
                .query(query)
        })
        .await
    }

    async fn fetch_subreddit(
        &self,
        token: &RedditToken,
        subreddit: &str,
        since: DateTime<Utc>,
    ) -> Result<(Vec<RawPost>, HeaderMap), FetchError> {
        let url = format!(
            "{}/r/{}/hot",
            self.api_base_url.trim_end_matches('/'),
            subreddit
        );
        let query = [
            ("limit", self.options.post_limit.to_string()),
            ("raw_json", "1".to_string()),
        ];
        let (listing, headers) = self.get_json::<Listing>(token, &url, &query).await?;
        Ok((listing_posts(&listing, since), headers))
    }

    async fn fetch_comments(
        &self,
        token: &RedditToken,
        subreddit: &str,
        post_id: &str,
        since: DateTime<Utc>,
    ) -> Result<(Vec<RawPost>, HeaderMap), FetchError> {
        let url = format!(
            "{}/r/{}/comments/{}",
            self.api_base_url.trim_end_matches('/'),
            subreddit,
            post_id
        );
        let query = [
            ("limit", self.options.comments_per_post.to_string()),
            ("depth", "1".to_string()),
            ("sort", "top".to_string()),
            ("raw_json", "1".to_string()),
        ];
        let (listings, headers) = self.get_json::<Vec<Listing>>(token, &url, &query).await?;
        // [0] is the post itself, [1] its comment tree.
        let comments = listings
            .get(1)
            .map(|l| listing_comments(l, since))
            .unwrap_or_default();
        Ok((comments, headers))
    }
}

#[async_trait::async_trait]
impl MentionSource for RedditClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn source(&self) -> Source {
        Source::Reddit
    }

    async fn fetch_posts(&self, since: DateTime<Utc>) -> Result<Vec<RawPost>, FetchError> {
        let token = self.get_access_token_cached().await?;
        let mut out = Vec::new();

        for subreddit in &self.options.subreddits {
            let (posts, headers) = self.fetch_subreddit(&token, subreddit, since).await?;
            tracing::debug!(subreddit = %subreddit, posts = posts.len(), "reddit listing fetched");
            check_quota(&headers)?;

            if self.options.comments_per_post > 0 {
                for post in &posts {
                    let post_id = post.id.trim_start_matches("t3_");
                    let (comments, headers) =
                        self.fetch_comments(&token, subreddit, post_id, since).await?;
                    out.extend(comments);
                    check_quota(&headers)?;
                }
            }
            out.extend(posts);
        }

        Ok(out)
    }
}

// Reddit reports the remaining requests of the current period; once it hits zero every
// further call is rejected until the reset.
fn check_quota(headers: &HeaderMap) -> Result<(), FetchError> {
    if http::quota_exhausted(headers, RATE_REMAINING_HEADER) {
        let retry_after =
            http::header_f64(headers, RATE_RESET_HEADER).and_then(http::delay_from_secs);
        return Err(FetchError::RateLimited {
            provider: PROVIDER.to_string(),
            retry_after,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
}

impl RedditToken {
    fn is_stale_at(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if self.expires_in == 0 {
            return true;
        }
        // Refresh a little early so a token never expires mid-cycle.
        let exp = i64::try_from(self.expires_in)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| fetched_at.checked_add_signed(ttl));
        // An expiry too far out to represent never goes stale.
        let Some(exp) = exp else {
            return false;
        };
        match now.checked_add_signed(chrono::Duration::minutes(2)) {
            Some(refresh_at) => refresh_at >= exp,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Clone, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Clone, Deserialize)]
struct Thing {
    kind: String,
    data: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct PostData {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    created_utc: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct CommentData {
    id: String,
    #[serde(default)]
    body: String,
    created_utc: f64,
}

fn listing_posts(listing: &Listing, since: DateTime<Utc>) -> Vec<RawPost> {
    listing
        .data
        .children
        .iter()
        .filter(|t| t.kind == "t3")
        .filter_map(|t| serde_json::from_value::<PostData>(t.data.clone()).ok())
        .filter_map(|p| {
            let created_at = from_epoch(p.created_utc)?;
            Some(RawPost {
                source: Source::Reddit,
                id: format!("t3_{}", p.id),
                text: format!("{} {}", p.title, p.selftext).trim().to_string(),
                created_at,
            })
        })
        .filter(|p| p.created_at >= since)
        .collect()
}

// "more" placeholders and deleted comments are skipped.
fn listing_comments(listing: &Listing, since: DateTime<Utc>) -> Vec<RawPost> {
    listing
        .data
        .children
        .iter()
        .filter(|t| t.kind == "t1")
        .filter_map(|t| serde_json::from_value::<CommentData>(t.data.clone()).ok())
        .filter(|c| !c.body.is_empty() && c.body != "[deleted]" && c.body != "[removed]")
        .filter_map(|c| {
            let created_at = from_epoch(c.created_utc)?;
            Some(RawPost {
                source: Source::Reddit,
                id: format!("t1_{}", c.id),
                text: c.body,
                created_at,
            })
        })
        .filter(|p| p.created_at >= since)
        .collect()
}

fn from_epoch(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp(secs as i64, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    fn since() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn parses_hot_listing_into_posts() {
        let v = json!({
            "kind": "Listing",
            "data": {
                "after": "t3_zzz",
                "children": [
                    {"kind": "t3", "data": {
                        "id": "abc", "title": "$TSLA to the moon",
                        "selftext": "delivery numbers strong", "created_utc": 1772409600.0
                    }},
                    {"kind": "t3", "data": {
                        "id": "old", "title": "$AAPL", "selftext": "", "created_utc": 1700000000.0
                    }}
                ]
            }
        });
        let listing: Listing = serde_json::from_value(v).unwrap();
        let posts = listing_posts(&listing, since());
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "t3_abc");
        assert_eq!(posts[0].text, "$TSLA to the moon delivery numbers strong");
        assert_eq!(posts[0].source, Source::Reddit);
    }

    #[test]
    fn parses_comment_tree_and_skips_more_and_deleted() {
        let v = json!([
            {"kind": "Listing", "data": {"children": [{"kind": "t3", "data": {"id": "abc", "created_utc": 1772409600.0}}]}},
            {"kind": "Listing", "data": {"children": [
                {"kind": "t1", "data": {"id": "c1", "body": "$NVDA breaking out", "created_utc": 1772409700.0}},
                {"kind": "t1", "data": {"id": "c2", "body": "[deleted]", "created_utc": 1772409700.0}},
                {"kind": "more", "data": {"count": 12, "children": ["c3", "c4"]}}
            ]}}
        ]);
        let listings: Vec<Listing> = serde_json::from_value(v).unwrap();
        let comments = listing_comments(&listings[1], since());
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].id, "t1_c1");
        assert_eq!(comments[0].text, "$NVDA breaking out");
    }

    #[test]
    fn token_is_refreshed_before_expiry() {
        let tok: RedditToken = serde_json::from_value(json!({
            "access_token": "secret",
            "token_type": "bearer",
            "expires_in": 86400,
            "scope": "*"
        }))
        .unwrap();
        let fetched = since();
        assert!(!tok.is_stale_at(fetched, fetched + chrono::Duration::hours(1)));
        assert!(tok.is_stale_at(fetched, fetched + chrono::Duration::seconds(86400 - 60)));

        let unknown = RedditToken {
            access_token: "x".to_string(),
            expires_in: 0,
        };
        assert!(unknown.is_stale_at(fetched, fetched));

        let far = RedditToken {
            access_token: "x".to_string(),
            expires_in: 10_000_000_000_000_000,
        };
        assert!(!far.is_stale_at(fetched, fetched + chrono::Duration::days(365)));
        let max = RedditToken {
            access_token: "x".to_string(),
            expires_in: u64::MAX,
        };
        assert!(!max.is_stale_at(fetched, fetched));
    }

    #[test]
    fn exhausted_quota_is_rate_limited() {
        let mut headers = HeaderMap::new();
        headers.insert(RATE_REMAINING_HEADER, HeaderValue::from_static("0.0"));
        headers.insert(RATE_RESET_HEADER, HeaderValue::from_static("120"));
        let err = check_quota(&headers).unwrap_err();
        match err {
            FetchError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(std::time::Duration::from_secs(120)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }

        headers.insert(RATE_RESET_HEADER, HeaderValue::from_static("1e300"));
        match check_quota(&headers).unwrap_err() {
            FetchError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(std::time::Duration::from_secs(86_400)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }

        headers.insert(RATE_REMAINING_HEADER, HeaderValue::from_static("57.0"));
        assert!(check_quota(&headers).is_ok());
    }

    #[test]
    fn options_default_to_wallstreetbets_stocks_investing() {
        let opts = RedditOptions::default();
        assert_eq!(opts.subreddits, vec!["wallstreetbets", "stocks", "investing"]);
        assert_eq!(opts.post_limit, 100);
        assert_eq!(opts.comments_per_post, 0);
    }
}
