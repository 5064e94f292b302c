use std::sync::Arc;
use tickerbuzz_core::collect::demo::DemoSource;
use tickerbuzz_core::collect::reddit::{RedditClient, RedditOptions};
use tickerbuzz_core::collect::stocktwits::StockTwitsClient;
use tickerbuzz_core::collect::twitter::{TwitterClient, TwitterOptions};
use tickerbuzz_core::collect::{collector::DEFAULT_COLLECT_CONCURRENCY, MentionSource};
use tickerbuzz_core::config::{env_or, Settings};
use tickerbuzz_core::domain::mention::Source;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOptions {
    /// Feeds to query, in order. Order decides tie-breaks between equal timestamps.
    pub sources: Vec<Source>,

    pub max_concurrency: usize,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            sources: vec![Source::Reddit, Source::Twitter, Source::StockTwits],
            max_concurrency: DEFAULT_COLLECT_CONCURRENCY,
        }
    }
}

impl SourceOptions {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("SOURCES") {
            out.sources = parse_sources(&s)?;
        }
        out.max_concurrency = env_or("COLLECT_CONCURRENCY", out.max_concurrency).max(1);

        Ok(out)
    }
}

fn parse_sources(s: &str) -> anyhow::Result<Vec<Source>> {
    let mut out = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let source = Source::parse(part)
            .ok_or_else(|| anyhow::anyhow!("unknown source in SOURCES: {part}"))?;
        if !out.contains(&source) {
            out.push(source);
        }
    }
    anyhow::ensure!(!out.is_empty(), "SOURCES must name at least one source");
    Ok(out)
}

/// Builds the configured feeds. A feed whose credentials are missing is skipped with a
/// warning so the others still run.
pub fn build_sources(
    settings: &Settings,
    opts: &SourceOptions,
    demo: bool,
) -> anyhow::Result<Vec<Arc<dyn MentionSource>>> {
    if demo {
        tracing::info!("demo mode: using canned reddit and twitter posts");
        return Ok(vec![
            Arc::new(DemoSource::reddit()),
            Arc::new(DemoSource::twitter()),
        ]);
    }

    let mut out: Vec<Arc<dyn MentionSource>> = Vec::new();
    for source in &opts.sources {
        let built: anyhow::Result<Arc<dyn MentionSource>> = match source {
            Source::Reddit => RedditClient::from_settings(settings, RedditOptions::from_env())
                .map(|c| Arc::new(c) as Arc<dyn MentionSource>),
            Source::Twitter => TwitterClient::from_settings(settings, TwitterOptions::from_env())
                .map(|c| Arc::new(c) as Arc<dyn MentionSource>),
            Source::StockTwits => {
                StockTwitsClient::from_env().map(|c| Arc::new(c) as Arc<dyn MentionSource>)
            }
        };

        match built {
            Ok(s) => out.push(s),
            Err(err) => {
                tracing::warn!(source = %source, error = %err, "source not configured; skipping");
            }
        }
    }

    anyhow::ensure!(
        !out.is_empty(),
        "no mention source is configured (set credentials or run with --demo)"
    );
    Ok(out)
}
