use crate::domain::mention::{RawPost, Source};
use crate::error::FetchError;
use chrono::{DateTime, Utc};

#[async_trait::async_trait]
pub trait MentionSource: Send + Sync {
    /// Stable label used in logs and source reports (e.g. `reddit`, `demo-twitter`).
    fn name(&self) -> &str;

    fn source(&self) -> Source;

    /// Posts created at or after `since`. Implementations retry transient failures
    /// themselves and return `FetchError::RateLimited` once their quota is exhausted.
    async fn fetch_posts(&self, since: DateTime<Utc>) -> Result<Vec<RawPost>, FetchError>;
}
