pub mod aggregate;
pub mod board;
pub mod collect;
pub mod domain;
pub mod error;
pub mod extract;
pub mod http;
pub mod market;
pub mod pipeline;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    const DEFAULT_DATA_DIR: &str = "data";
    const DEFAULT_CACHE_DIR: &str = "cache";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub reddit_client_id: Option<String>,
        pub reddit_client_secret: Option<String>,
        pub reddit_user_agent: Option<String>,
        pub twitter_bearer_token: Option<String>,
        pub alpha_vantage_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub data_dir: PathBuf,
        pub cache_dir: PathBuf,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                reddit_client_id: non_empty_var("REDDIT_CLIENT_ID"),
                reddit_client_secret: non_empty_var("REDDIT_CLIENT_SECRET"),
                reddit_user_agent: non_empty_var("REDDIT_USER_AGENT"),
                twitter_bearer_token: non_empty_var("TWITTER_BEARER_TOKEN"),
                alpha_vantage_api_key: non_empty_var("ALPHA_VANTAGE_API_KEY"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                data_dir: non_empty_var("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
                cache_dir: non_empty_var("CACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
            })
        }

        pub fn require_reddit_credentials(&self) -> anyhow::Result<(&str, &str)> {
            let id = self
                .reddit_client_id
                .as_deref()
                .context("REDDIT_CLIENT_ID is required")?;
            let secret = self
                .reddit_client_secret
                .as_deref()
                .context("REDDIT_CLIENT_SECRET is required")?;
            Ok((id, secret))
        }

        pub fn require_twitter_bearer_token(&self) -> anyhow::Result<&str> {
            self.twitter_bearer_token
                .as_deref()
                .context("TWITTER_BEARER_TOKEN is required")
        }

        pub fn require_alpha_vantage_api_key(&self) -> anyhow::Result<&str> {
            self.alpha_vantage_api_key
                .as_deref()
                .context("ALPHA_VANTAGE_API_KEY is required")
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Reads an optional tunable, falling back to `default` when unset or unparsable.
    pub fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
        let Ok(raw) = std::env::var(key) else {
            return default;
        };
        match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparsable env override");
                default
            }
        }
    }

    /// Like [`env_or`] but an unparsable value is an error instead of a silent default.
    pub fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match non_empty_var(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("invalid {key}={raw:?}: {e}")),
        }
    }
}
