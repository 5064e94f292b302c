use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tickerbuzz_core::collect::MentionCollector;
use tickerbuzz_core::config::{env_or, Settings};
use tickerbuzz_core::domain::snapshot::CycleFailure;
use tickerbuzz_core::extract::{SymbolDictionary, TickerExtractor};
use tickerbuzz_core::market::alpha_vantage::AlphaVantageClient;
use tickerbuzz_core::market::yahoo::YahooClient;
use tickerbuzz_core::market::{EnrichOptions, Enricher, FundamentalsProvider};
use tickerbuzz_core::pipeline::{Pipeline, PipelineOptions};
use tickerbuzz_core::storage;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod sources;

const DEFAULT_SNAPSHOT_RETENTION: usize = 48;

#[derive(Debug, Parser)]
#[command(name = "tickerbuzz_worker")]
struct Args {
    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Seconds between cycles when running continuously.
    #[arg(long, default_value_t = 900)]
    interval_secs: u64,

    /// Number of ranked tickers to keep [default: 20, or TOP_N].
    #[arg(long)]
    top_n: Option<usize>,

    /// Trailing aggregation window, e.g. 24h, 90m, 7d [default: 24h, or WINDOW].
    #[arg(long)]
    window: Option<String>,

    /// Days of daily price history per ticker [default: 30, or HISTORY_DAYS].
    #[arg(long)]
    history_days: Option<u32>,

    /// Run the cycle but do not write anything to DATA_DIR.
    #[arg(long)]
    dry_run: bool,

    /// Use canned posts instead of the live feeds.
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let options = resolve_options(&args)?;

    let dictionary = SymbolDictionary::from_env().await?;
    let extractor = TickerExtractor::new(dictionary)?
        .with_bare_symbols(env_or("ALLOW_BARE_SYMBOLS", false));

    let source_opts = sources::SourceOptions::from_env()?;
    let feeds = sources::build_sources(&settings, &source_opts, args.demo)?;
    let collector = MentionCollector::new(feeds, source_opts.max_concurrency);
    tracing::info!(sources = ?collector.source_names(), "mention sources ready");

    let enricher = build_enricher(&settings)?;
    let pipeline = Pipeline::new(collector, extractor, enricher, options)?;

    if !args.dry_run {
        storage::prepare(&settings.data_dir).await?;
    }

    tracing::info!(
        once = args.once,
        interval_secs = args.interval_secs,
        top_n = pipeline.options().top_n,
        history_days = pipeline.options().history_days,
        dry_run = args.dry_run,
        demo = args.demo,
        "worker started"
    );

    loop {
        let res = run_once(&pipeline, &settings, args.dry_run).await;
        if args.once {
            res?;
            break;
        }
        if let Err(err) = res {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "cycle bookkeeping failed; will retry next interval");
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.interval_secs)) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                break;
            }
        }
    }

    Ok(())
}

fn resolve_options(args: &Args) -> anyhow::Result<PipelineOptions> {
    PipelineOptions::resolve(args.top_n, args.window.as_deref(), args.history_days)
}

fn build_enricher(settings: &Settings) -> anyhow::Result<Enricher> {
    let market = Arc::new(YahooClient::from_env()?);

    let fundamentals: Option<Arc<dyn FundamentalsProvider>> =
        match AlphaVantageClient::from_settings(settings) {
            Ok(c) => Some(Arc::new(c)),
            Err(err) => {
                tracing::warn!(error = %err, "fundamentals disabled; P/E and market cap stay unavailable");
                None
            }
        };

    let options = EnrichOptions::from_env(Some(settings.cache_dir.join("market")));
    Ok(Enricher::new(market, fundamentals, options))
}

async fn run_once(pipeline: &Pipeline, settings: &Settings, dry_run: bool) -> anyhow::Result<()> {
    let data_dir = settings.data_dir.as_path();
    if dry_run {
        return run_cycle(pipeline, data_dir, true).await;
    }

    let Some(lock) =
        storage::lock::try_acquire_cycle_lock(data_dir, storage::lock::DEFAULT_STALE_AFTER).await?
    else {
        tracing::warn!("cycle lock not acquired; another run in progress");
        return Ok(());
    };

    let res = run_cycle(pipeline, data_dir, false).await;
    release_lock(lock).await;
    res
}

/// Logs instead of failing: the cycle already ran and the lock is reclaimed once stale.
async fn release_lock(lock: storage::lock::CycleLock) -> bool {
    let path = lock.path().to_path_buf();
    match storage::lock::release_cycle_lock(lock).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %format!("{err:#}"),
                "cycle lock left behind"
            );
            false
        }
    }
}

async fn run_cycle(pipeline: &Pipeline, data_dir: &Path, dry_run: bool) -> anyhow::Result<()> {
    let generated_at = chrono::Utc::now();
    match pipeline.run_cycle(generated_at).await {
        Ok(snapshot) if dry_run => {
            for entry in &snapshot.entries {
                let price = entry.market.quote().and_then(|q| q.price.as_option().copied());
                tracing::info!(
                    rank = entry.rank.rank,
                    symbol = %entry.rank.symbol,
                    mentions = entry.rank.mention_count,
                    ?price,
                    "ranked"
                );
            }
            tracing::info!(cycle_id = %snapshot.cycle_id, dry_run = true, "cycle complete");
        }
        Ok(snapshot) => {
            let path = storage::snapshots::persist_success(data_dir, &snapshot).await?;
            let retention = env_or("SNAPSHOT_RETENTION", DEFAULT_SNAPSHOT_RETENTION).max(1);
            let pruned = storage::snapshots::prune_history(data_dir, retention).await?;
            tracing::info!(
                cycle_id = %snapshot.cycle_id,
                entries = snapshot.entries.len(),
                path = %path.display(),
                pruned,
                "persisted dashboard snapshot"
            );
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            let failure = CycleFailure {
                cycle_id: uuid::Uuid::new_v4(),
                generated_at,
                error: format!("{:#}", err),
            };
            if !dry_run {
                storage::snapshots::persist_failure(data_dir, &failure).await?;
            }
            tracing::error!(cycle_id = %failure.cycle_id, error = %err, "cycle failed");
        }
    }
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_cycle_flags() {
        let args = Args::parse_from([
            "tickerbuzz_worker",
            "--once",
            "--top-n",
            "5",
            "--window",
            "90m",
            "--demo",
        ]);
        assert!(args.once);
        assert!(args.demo);
        assert_eq!(args.interval_secs, 900);

        let opts = resolve_options(&args).unwrap();
        assert_eq!(opts.top_n, 5);
        assert_eq!(opts.window, chrono::Duration::minutes(90));
    }

    #[test]
    fn cli_window_overrides_bad_env() {
        std::env::set_var("WINDOW", "forever");
        let args = Args::parse_from(["tickerbuzz_worker", "--window", "12h"]);
        let opts = resolve_options(&args).unwrap();
        assert_eq!(opts.window, chrono::Duration::hours(12));

        let args = Args::parse_from(["tickerbuzz_worker"]);
        assert!(resolve_options(&args).is_err());
        std::env::remove_var("WINDOW");
    }

    #[tokio::test]
    async fn lock_release_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let lock = storage::lock::try_acquire_cycle_lock(dir.path(), storage::lock::DEFAULT_STALE_AFTER)
            .await
            .unwrap()
            .unwrap();
        let path = lock.path().to_path_buf();

        // A directory in place of the lock file cannot be removed with remove_file.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        assert!(!release_lock(lock).await);

        std::fs::remove_dir(&path).unwrap();
        let lock = storage::lock::try_acquire_cycle_lock(dir.path(), storage::lock::DEFAULT_STALE_AFTER)
            .await
            .unwrap()
            .unwrap();
        assert!(release_lock(lock).await);
        assert!(!path.exists());
    }

    #[test]
    fn rejects_bad_window() {
        let args = Args::parse_from(["tickerbuzz_worker", "--window", "soon"]);
        assert!(resolve_options(&args).is_err());
    }
}
