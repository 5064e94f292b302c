use crate::config::env_or;
use crate::domain::quote::{Fundamentals, MarketData};
use crate::domain::rank::TickerRank;
use crate::domain::snapshot::{Enrichment, TickerEntry};
use crate::error::FetchError;
use crate::market::cache::TtlCache;
use crate::market::provider::{FundamentalsProvider, MarketDataProvider};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_ENRICH_CONCURRENCY: usize = 4;
const DEFAULT_QUOTE_TTL_SECS: u64 = 300;
const DEFAULT_FUNDAMENTALS_TTL_SECS: u64 = 6 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichOptions {
    pub max_concurrency: usize,
    pub quote_ttl: Duration,
    pub fundamentals_ttl: Duration,
    /// On-disk cache directory; `None` keeps the cache in memory only.
    pub cache_dir: Option<PathBuf>,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_ENRICH_CONCURRENCY,
            quote_ttl: Duration::from_secs(DEFAULT_QUOTE_TTL_SECS),
            fundamentals_ttl: Duration::from_secs(DEFAULT_FUNDAMENTALS_TTL_SECS),
            cache_dir: None,
        }
    }
}

impl EnrichOptions {
    pub fn from_env(cache_dir: Option<PathBuf>) -> Self {
        Self {
            max_concurrency: env_or("ENRICH_CONCURRENCY", DEFAULT_ENRICH_CONCURRENCY).max(1),
            quote_ttl: Duration::from_secs(env_or("QUOTE_CACHE_TTL_SECS", DEFAULT_QUOTE_TTL_SECS)),
            fundamentals_ttl: Duration::from_secs(env_or(
                "FUNDAMENTALS_CACHE_TTL_SECS",
                DEFAULT_FUNDAMENTALS_TTL_SECS,
            )),
            cache_dir,
        }
    }
}

/// Attaches market data to ranked symbols. One symbol failing never affects the others.
pub struct Enricher {
    market: Arc<dyn MarketDataProvider>,
    fundamentals: Option<Arc<dyn FundamentalsProvider>>,
    quote_cache: TtlCache<MarketData>,
    fundamentals_cache: TtlCache<Fundamentals>,
    max_concurrency: usize,
}

impl Enricher {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        fundamentals: Option<Arc<dyn FundamentalsProvider>>,
        options: EnrichOptions,
    ) -> Self {
        let mut quote_cache = TtlCache::new("quote", options.quote_ttl);
        let mut fundamentals_cache = TtlCache::new("fundamentals", options.fundamentals_ttl);
        if let Some(dir) = &options.cache_dir {
            quote_cache = quote_cache.with_disk(dir);
            fundamentals_cache = fundamentals_cache.with_disk(dir);
        }

        Self {
            market,
            fundamentals,
            quote_cache,
            fundamentals_cache,
            max_concurrency: options.max_concurrency.max(1),
        }
    }

    /// Entries come back in the order of `ranks`.
    pub async fn enrich(&self, ranks: Vec<TickerRank>, history_days: u32) -> Vec<TickerEntry> {
        stream::iter(ranks)
            .map(|rank| async move {
                let market = self.enrich_one(&rank.symbol, history_days).await;
                TickerEntry { rank, market }
            })
            .buffered(self.max_concurrency)
            .collect()
            .await
    }

    async fn enrich_one(&self, symbol: &str, history_days: u32) -> Enrichment {
        let key = format!("{symbol}_{history_days}d");
        let data = self
            .quote_cache
            .get_or_fetch(&key, || self.market.fetch(symbol, history_days))
            .await;

        let MarketData { mut quote, history } = match data {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(
                    symbol,
                    provider = self.market.provider_name(),
                    error = %err,
                    "market data unavailable"
                );
                return Enrichment::Failed {
                    error: err.to_string(),
                };
            }
        };

        match self.fetch_fundamentals(symbol).await {
            Some(Ok(f)) => quote.apply_fundamentals(&f),
            Some(Err(err)) => {
                tracing::warn!(symbol, error = %err, "fundamentals unavailable; keeping quote");
            }
            None => {}
        }

        Enrichment::Ok { quote, history }
    }

    async fn fetch_fundamentals(&self, symbol: &str) -> Option<Result<Fundamentals, FetchError>> {
        let provider = self.fundamentals.as_ref()?;
        Some(
            self.fundamentals_cache
                .get_or_fetch(symbol, || provider.fetch_fundamentals(symbol))
                .await,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::{Metric, QuoteSnapshot};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeMarket {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MarketDataProvider for FakeMarket {
        fn provider_name(&self) -> &'static str {
            "fake"
        }

        async fn fetch(&self, symbol: &str, _history_days: u32) -> Result<MarketData, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if symbol == "GONE" {
                return Err(FetchError::NoData {
                    provider: "fake".to_string(),
                    symbol: symbol.to_string(),
                });
            }
            Ok(MarketData {
                quote: QuoteSnapshot {
                    symbol: symbol.to_string(),
                    name: None,
                    currency: Some("USD".to_string()),
                    price: Metric::Available(100.0),
                    previous_close: Metric::Available(95.0),
                    change: Metric::Available(5.0),
                    change_percent: Metric::Available(5.26),
                    volume: Metric::Available(1_000),
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

    struct FakeFundamentals;

    #[async_trait::async_trait]
    impl FundamentalsProvider for FakeFundamentals {
        fn provider_name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_fundamentals(&self, symbol: &str) -> Result<Fundamentals, FetchError> {
            if symbol == "NOFUND" {
                return Err(FetchError::RateLimited {
                    provider: "fake".to_string(),
                    retry_after: None,
                });
            }
            Ok(Fundamentals {
                symbol: symbol.to_string(),
                name: Some(format!("{symbol} Corp")),
                market_cap: Metric::Available(1e12),
                pe_ratio: Metric::Unavailable,
                dividend_yield: Metric::Available(0.005),
                beta: Metric::Available(1.2),
            })
        }
    }

    fn rank(symbol: &str, n: u32) -> TickerRank {
        TickerRank {
            symbol: symbol.to_string(),
            mention_count: 10 - n,
            rank: n,
        }
    }

    #[tokio::test]
    async fn one_failed_symbol_does_not_affect_others() {
        let market = Arc::new(FakeMarket {
            calls: AtomicUsize::new(0),
        });
        let enricher = Enricher::new(
            market.clone(),
            Some(Arc::new(FakeFundamentals)),
            EnrichOptions::default(),
        );

        let entries = enricher
            .enrich(vec![rank("TSLA", 1), rank("GONE", 2), rank("NOFUND", 3)], 30)
            .await;

        let symbols: Vec<_> = entries.iter().map(|e| e.rank.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["TSLA", "GONE", "NOFUND"]);

        let tsla = entries[0].market.quote().unwrap();
        assert_eq!(tsla.name.as_deref(), Some("TSLA Corp"));
        assert_eq!(tsla.market_cap, Metric::Available(1e12));
        assert_eq!(tsla.pe_ratio, Metric::Unavailable);

        assert!(matches!(entries[1].market, Enrichment::Failed { .. }));

        let nofund = entries[2].market.quote().unwrap();
        assert_eq!(nofund.price, Metric::Available(100.0));
        assert_eq!(nofund.market_cap, Metric::Unavailable);
    }

    #[tokio::test]
    async fn repeated_cycles_hit_the_quote_cache() {
        let market = Arc::new(FakeMarket {
            calls: AtomicUsize::new(0),
        });
        let enricher = Enricher::new(market.clone(), None, EnrichOptions::default());

        enricher.enrich(vec![rank("AAPL", 1)], 30).await;
        enricher.enrich(vec![rank("AAPL", 1)], 30).await;
        assert_eq!(market.calls.load(Ordering::SeqCst), 1);
    }
}
