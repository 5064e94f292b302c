use crate::collect::source::MentionSource;
use crate::domain::mention::RawPost;
use crate::domain::snapshot::{SourceReport, SourceStatus};
use crate::error::FetchError;
use crate::time::window::AggregationWindow;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

pub const DEFAULT_COLLECT_CONCURRENCY: usize = 4;

#[derive(Debug, Default)]
pub struct Collection {
    /// Posts in configured source order, then feed order within a source.
    pub posts: Vec<RawPost>,
    pub reports: Vec<SourceReport>,
}

pub struct MentionCollector {
    sources: Vec<Arc<dyn MentionSource>>,
    max_concurrency: usize,
}

impl MentionCollector {
    pub fn new(sources: Vec<Arc<dyn MentionSource>>, max_concurrency: usize) -> Self {
        Self {
            sources,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Queries every source once. A failing or rate-limited source is reported and skipped;
    /// it never fails the collection.
    pub async fn collect(&self, window: &AggregationWindow) -> Collection {
        let since = window.start;

        let mut results: Vec<(usize, Result<Vec<RawPost>, FetchError>)> =
            stream::iter(self.sources.iter().cloned().enumerate())
                .map(|(idx, source)| async move {
                    let res = source.fetch_posts(since).await;
                    (idx, res)
                })
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;
        results.sort_by_key(|(idx, _)| *idx);

        let mut out = Collection::default();
        for (idx, res) in results {
            let source = &self.sources[idx];
            let status = match res {
                Ok(posts) => {
                    let kept: Vec<RawPost> = posts
                        .into_iter()
                        .filter(|p| window.contains(p.created_at))
                        .collect();
                    tracing::info!(source = source.name(), posts = kept.len(), "source collected");
                    let status = SourceStatus::Ok { posts: kept.len() };
                    out.posts.extend(kept);
                    status
                }
                Err(FetchError::RateLimited { retry_after, .. }) => {
                    tracing::warn!(
                        source = source.name(),
                        ?retry_after,
                        "source rate limited; skipped for this cycle"
                    );
                    SourceStatus::RateLimited {
                        retry_after_secs: retry_after.map(|d| d.as_secs()),
                    }
                }
                Err(err) => {
                    tracing::error!(
                        source = source.name(),
                        provider = err.provider(),
                        error = %err,
                        "source failed"
                    );
                    SourceStatus::Failed {
                        error: err.to_string(),
                    }
                }
            };
            out.reports.push(SourceReport {
                name: source.name().to_string(),
                source: source.source(),
                status,
            });
        }
        out
    }
}
