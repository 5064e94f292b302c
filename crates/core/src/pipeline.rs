use crate::aggregate::{dedupe_posts, order_mentions, MentionAggregator};
use crate::collect::MentionCollector;
use crate::domain::mention::Mention;
use crate::domain::snapshot::{DashboardSnapshot, Enrichment, SourceStatus};
use crate::extract::TickerExtractor;
use crate::market::Enricher;
use crate::time::window::{parse_window_length, AggregationWindow};
use anyhow::{bail, ensure};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

const DEFAULT_TOP_N: usize = 20;
const DEFAULT_WINDOW: &str = "24h";
const DEFAULT_HISTORY_DAYS: u32 = 30;
const MAX_TOP_N: usize = 100;
const MAX_HISTORY_DAYS: u32 = 365;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub top_n: usize,
    pub window: Duration,
    pub history_days: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            window: Duration::hours(24),
            history_days: DEFAULT_HISTORY_DAYS,
        }
    }
}

impl PipelineOptions {
    pub fn try_new(top_n: usize, window: &str, history_days: u32) -> anyhow::Result<Self> {
        let out = Self {
            top_n,
            window: parse_window_length(window)?,
            history_days,
        };
        out.validate()?;
        Ok(out)
    }

    /// Defaults, overridable with TOP_N / WINDOW / HISTORY_DAYS.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::resolve(None, None, None)
    }

    /// Explicit values win; a field left as `None` comes from its env var, then the default.
    /// Env vars are only read for fields that were not given.
    pub fn resolve(
        top_n: Option<usize>,
        window: Option<&str>,
        history_days: Option<u32>,
    ) -> anyhow::Result<Self> {
        use crate::config::env_parse;

        let top_n = match top_n {
            Some(n) => n,
            None => env_parse("TOP_N")?.unwrap_or(DEFAULT_TOP_N),
        };
        let window = match window {
            Some(w) => w.to_string(),
            None => env_parse::<String>("WINDOW")?.unwrap_or_else(|| DEFAULT_WINDOW.to_string()),
        };
        let history_days = match history_days {
            Some(d) => d,
            None => env_parse("HISTORY_DAYS")?.unwrap_or(DEFAULT_HISTORY_DAYS),
        };
        Self::try_new(top_n, &window, history_days)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            (1..=MAX_TOP_N).contains(&self.top_n),
            "top_n must be within 1..={MAX_TOP_N}, got {}",
            self.top_n
        );
        ensure!(
            (1..=MAX_HISTORY_DAYS).contains(&self.history_days),
            "history_days must be within 1..={MAX_HISTORY_DAYS}, got {}",
            self.history_days
        );
        ensure!(self.window > Duration::zero(), "window must be positive");
        Ok(())
    }
}

/// One collect, extract, rank, enrich pass.
pub struct Pipeline {
    collector: MentionCollector,
    extractor: TickerExtractor,
    enricher: Enricher,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        collector: MentionCollector,
        extractor: TickerExtractor,
        enricher: Enricher,
        options: PipelineOptions,
    ) -> anyhow::Result<Self> {
        options.validate()?;
        Ok(Self {
            collector,
            extractor,
            enricher,
            options,
        })
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> anyhow::Result<DashboardSnapshot> {
        let window = AggregationWindow::trailing(now, self.options.window);
        let collection = self.collector.collect(&window).await;

        let healthy = collection
            .reports
            .iter()
            .filter(|r| matches!(r.status, SourceStatus::Ok { .. }))
            .count();
        if healthy == 0 {
            // Publishing an empty board would hide the last good one.
            let names: Vec<&str> = collection.reports.iter().map(|r| r.name.as_str()).collect();
            bail!("no source returned data this cycle (sources: {})", names.join(", "));
        }

        let posts = dedupe_posts(collection.posts);
        let mut mentions: Vec<Mention> = posts
            .iter()
            .flat_map(|p| self.extractor.mentions_for(p))
            .collect();
        order_mentions(&mut mentions);

        let mut aggregator = MentionAggregator::new(window);
        aggregator.extend(&mentions);
        let stats = aggregator.stats();
        let ranks = aggregator.rank(self.options.top_n);

        tracing::info!(
            window_secs = window.length().num_seconds(),
            posts = posts.len(),
            mentions = stats.counted,
            without_ticker = stats.without_ticker,
            distinct_symbols = stats.distinct_symbols,
            ranked = ranks.len(),
            "mentions aggregated"
        );

        let mut entries = self.enricher.enrich(ranks, self.options.history_days).await;
        for entry in &mut entries {
            if let Enrichment::Ok { quote, .. } = &mut entry.market {
                if quote.name.is_none() {
                    quote.name = self
                        .extractor
                        .dictionary()
                        .name(&entry.rank.symbol)
                        .map(str::to_string);
                }
            }
        }

        let snapshot = DashboardSnapshot {
            cycle_id: Uuid::new_v4(),
            generated_at: now,
            window,
            sources: collection.reports,
            total_posts: posts.len(),
            total_mentions: stats.counted,
            entries,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::demo::DemoSource;
    use crate::collect::MentionSource;
    use crate::domain::quote::{MarketData, Metric, QuoteSnapshot};
    use crate::error::FetchError;
    use crate::extract::SymbolDictionary;
    use crate::market::{EnrichOptions, MarketDataProvider};
    use std::sync::Arc;

    struct FlatMarket;

    #[async_trait::async_trait]
    impl MarketDataProvider for FlatMarket {
        fn provider_name(&self) -> &'static str {
            "flat"
        }

        async fn fetch(&self, symbol: &str, _history_days: u32) -> Result<MarketData, FetchError> {
            if symbol == "SPY" {
                return Err(FetchError::NoData {
                    provider: "flat".to_string(),
                    symbol: symbol.to_string(),
                });
            }
            Ok(MarketData {
                quote: QuoteSnapshot {
                    symbol: symbol.to_string(),
                    name: None,
                    currency: Some("USD".to_string()),
                    price: Metric::Available(10.0),
                    previous_close: Metric::Available(10.0),
                    change: Metric::Available(0.0),
                    change_percent: Metric::Available(0.0),
                    volume: Metric::Unavailable,
                    avg_volume: Metric::Unavailable,
                    day_high: Metric::Unavailable,
                    day_low: Metric::Unavailable,
                    market_cap: Metric::Unavailable,
                    pe_ratio: Metric::Unavailable,
                    dividend_yield: Metric::Unavailable,
                    beta: Metric::Unavailable,
                    as_of: Utc::now(),
                },
                history: vec![],
            })
        }
    }

    struct DownSource;

    #[async_trait::async_trait]
    impl MentionSource for DownSource {
        fn name(&self) -> &str {
            "down"
        }

        fn source(&self) -> crate::domain::mention::Source {
            crate::domain::mention::Source::StockTwits
        }

        async fn fetch_posts(
            &self,
            _since: DateTime<Utc>,
        ) -> Result<Vec<crate::domain::mention::RawPost>, FetchError> {
            Err(FetchError::RateLimited {
                provider: "down".to_string(),
                retry_after: None,
            })
        }
    }

    fn pipeline(sources: Vec<Arc<dyn MentionSource>>, top_n: usize) -> Pipeline {
        Pipeline::new(
            MentionCollector::new(sources, 4),
            TickerExtractor::new(SymbolDictionary::builtin()).unwrap(),
            Enricher::new(Arc::new(FlatMarket), None, EnrichOptions::default()),
            PipelineOptions::try_new(top_n, "24h", 30).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn demo_cycle_ranks_and_enriches() {
        let sources: Vec<Arc<dyn MentionSource>> = vec![
            Arc::new(DemoSource::reddit()),
            Arc::new(DemoSource::twitter()),
            Arc::new(DownSource),
        ];
        let snap = pipeline(sources, 20).run_cycle(Utc::now()).await.unwrap();

        let top: Vec<_> = snap
            .ranks()
            .take(3)
            .map(|r| (r.symbol.as_str(), r.mention_count))
            .collect();
        assert_eq!(top, vec![("TSLA", 4), ("AAPL", 3), ("MSFT", 3)]);
        assert_eq!(snap.entries.len(), 9);
        assert_eq!(snap.total_posts, 26);
        assert_eq!(snap.sources.len(), 3);

        let spy = snap.entry("spy").unwrap();
        assert!(matches!(spy.market, Enrichment::Failed { .. }));
        let tsla = snap.entry("TSLA").unwrap().market.quote().unwrap();
        assert_eq!(tsla.name.as_deref(), Some("Tesla, Inc."));
    }

    #[tokio::test]
    async fn top_n_limits_entries() {
        let sources: Vec<Arc<dyn MentionSource>> = vec![Arc::new(DemoSource::twitter())];
        let snap = pipeline(sources, 2).run_cycle(Utc::now()).await.unwrap();
        assert_eq!(snap.entries.len(), 2);
        assert_eq!(snap.entries[0].rank.symbol, "TSLA");
    }

    #[tokio::test]
    async fn all_sources_down_fails_the_cycle() {
        let sources: Vec<Arc<dyn MentionSource>> = vec![Arc::new(DownSource)];
        assert!(pipeline(sources, 20).run_cycle(Utc::now()).await.is_err());
    }

    #[test]
    fn rejects_out_of_range_options() {
        assert!(PipelineOptions::try_new(0, "24h", 30).is_err());
        assert!(PipelineOptions::try_new(20, "0h", 30).is_err());
        assert!(PipelineOptions::try_new(20, "24h", 0).is_err());
        assert!(PipelineOptions::try_new(20, "90m", 30).is_ok());
    }

    #[test]
    fn explicit_options_skip_env_lookup() {
        std::env::set_var("HISTORY_DAYS", "lots");
        let opts = PipelineOptions::resolve(Some(5), Some("6h"), Some(10)).unwrap();
        assert_eq!(opts.top_n, 5);
        assert_eq!(opts.window, Duration::hours(6));
        assert_eq!(opts.history_days, 10);

        let err = PipelineOptions::resolve(Some(5), Some("6h"), None).unwrap_err();
        assert!(err.to_string().contains("HISTORY_DAYS"));
        std::env::remove_var("HISTORY_DAYS");
    }
}
