use crate::collect::source::MentionSource;
use crate::domain::mention::{RawPost, Source};
use crate::error::FetchError;
use chrono::{DateTime, Duration, Utc};

const REDDIT_POSTS: &[&str] = &[
    "TSLA to the moon! $TSLA looking bullish",
    "What do you think about $AAPL earnings?",
    "$MSFT and $GOOGL are my top picks",
    "AMD stock discussion - $AMD analysis",
    "$NVDA breaking resistance levels",
    "$SPY calls printing money",
    "Discussion on $META and social media stocks",
    "$AMZN showing strong fundamentals",
    "$TSLA breaking out today",
    "$AAPL new iPhone launch impact",
    "Bullish on $NVDA AI chips",
    "$SPY hitting new highs",
    "$MSFT cloud revenue impressive",
    "$GOOGL search dominance continues",
    "$META VR investments paying off",
    "$AMD Ryzen sales strong",
];

const TWITTER_POSTS: &[&str] = &[
    "$TSLA breaking out of consolidation pattern",
    "Bullish on $AAPL ahead of earnings",
    "$MSFT cloud growth impressive",
    "$NVDA AI narrative strong",
    "$SPY weekly calls looking good",
    "$AMZN e-commerce recovery play",
    "$META social media king",
    "$GOOGL advertising revenue up",
    "$AMD chip sales beating expectations",
    "$TSLA delivery numbers strong",
];

/// Canned posts for offline runs. Post `i` is stamped `since + i` seconds so every post
/// lands inside the cycle's window in a fixed order.
pub struct DemoSource {
    name: String,
    source: Source,
    posts: &'static [&'static str],
}

impl DemoSource {
    pub fn reddit() -> Self {
        Self {
            name: "demo-reddit".to_string(),
            source: Source::Reddit,
            posts: REDDIT_POSTS,
        }
    }

    pub fn twitter() -> Self {
        Self {
            name: "demo-twitter".to_string(),
            source: Source::Twitter,
            posts: TWITTER_POSTS,
        }
    }

    fn posts_since(&self, since: DateTime<Utc>) -> Vec<RawPost> {
        self.posts
            .iter()
            .enumerate()
            .map(|(i, text)| RawPost {
                source: self.source,
                id: format!("{}-{}", self.name, i + 1),
                text: text.to_string(),
                created_at: since + Duration::seconds(i as i64),
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl MentionSource for DemoSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> Source {
        self.source
    }

    async fn fetch_posts(&self, since: DateTime<Utc>) -> Result<Vec<RawPost>, FetchError> {
        Ok(self.posts_since(since))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_posts_fall_after_since() {
        let since = Utc::now() - Duration::hours(24);
        let posts = DemoSource::reddit().fetch_posts(since).await.unwrap();
        assert_eq!(posts.len(), 16);
        assert!(posts.iter().all(|p| p.created_at >= since));
        assert!(posts.windows(2).all(|w| w[0].created_at < w[1].created_at));

        let tweets = DemoSource::twitter().fetch_posts(since).await.unwrap();
        assert_eq!(tweets.len(), 10);
        assert!(tweets.iter().all(|p| p.source == Source::Twitter));
    }
}
