use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tickerbuzz_core::board::SnapshotBoard;
use tickerbuzz_core::config::{env_or, Settings};
use tickerbuzz_core::domain::rank::TickerRank;
use tickerbuzz_core::domain::snapshot::{DashboardSnapshot, Enrichment, SourceReport};
use tickerbuzz_core::extract::is_valid_symbol;
use tickerbuzz_core::storage::snapshots::read_latest;
use tickerbuzz_core::time::window::AggregationWindow;

const DEFAULT_RELOAD_INTERVAL_SECS: u64 = 5;

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

    let state = AppState {
        board: Arc::new(SnapshotBoard::new()),
        data_dir: settings.data_dir.clone(),
    };

    if let Err(e) = reload_latest(&state).await {
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(error = %e, "initial snapshot load failed; serving without data");
    }

    let reload_every =
        Duration::from_secs(env_or("RELOAD_INTERVAL_SECS", DEFAULT_RELOAD_INTERVAL_SECS).max(1));
    tokio::spawn(reload_loop(state.clone(), reload_every));

    let app = router(state);

    let port: u16 = env_or("PORT", 3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/snapshots/latest", get(get_latest_snapshot))
        .route("/rankings", get(get_rankings))
        .route("/tickers/:symbol", get(get_ticker))
        .route("/sources", get(get_sources))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Clone)]
struct AppState {
    board: Arc<SnapshotBoard>,
    data_dir: PathBuf,
}

/// Picks up the worker's `latest.json` when a newer cycle has been written.
async fn reload_latest(state: &AppState) -> anyhow::Result<bool> {
    let Some(snapshot) = read_latest(&state.data_dir).await? else {
        return Ok(false);
    };
    let cycle_id = snapshot.cycle_id;
    let published = state.board.publish(snapshot).await;
    if published {
        tracing::info!(%cycle_id, "published new snapshot");
    }
    Ok(published)
}

async fn reload_loop(state: AppState, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        if let Err(e) = reload_latest(&state).await {
            // A half-written or corrupt file only delays the swap; keep serving the old one.
            tracing::warn!(error = %e, "snapshot reload failed");
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn current(state: &AppState) -> Result<Arc<DashboardSnapshot>, StatusCode> {
    state
        .board
        .latest()
        .await
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

async fn get_latest_snapshot(
    State(state): State<AppState>,
) -> Result<Json<DashboardSnapshot>, StatusCode> {
    let snapshot = current(&state).await?;
    Ok(Json(snapshot.as_ref().clone()))
}

#[derive(Debug, Serialize)]
struct RankingRow {
    rank: u32,
    symbol: String,
    name: Option<String>,
    mentions: u32,
    price: Option<f64>,
    change_percent: Option<f64>,
    market_status: &'static str,
}

#[derive(Debug, Serialize)]
struct Rankings {
    cycle_id: uuid::Uuid,
    generated_at: DateTime<Utc>,
    window: AggregationWindow,
    rows: Vec<RankingRow>,
}

async fn get_rankings(State(state): State<AppState>) -> Result<Json<Rankings>, StatusCode> {
    let snapshot = current(&state).await?;

    let rows = snapshot
        .entries
        .iter()
        .map(|e| {
            let quote = e.market.quote();
            RankingRow {
                rank: e.rank.rank,
                symbol: e.rank.symbol.clone(),
                name: quote.and_then(|q| q.name.clone()),
                mentions: e.rank.mention_count,
                price: quote.and_then(|q| q.price.as_option().copied()),
                change_percent: quote.and_then(|q| q.change_percent.as_option().copied()),
                market_status: match e.market {
                    Enrichment::Ok { .. } => "ok",
                    Enrichment::Failed { .. } => "unavailable",
                },
            }
        })
        .collect();

    Ok(Json(Rankings {
        cycle_id: snapshot.cycle_id,
        generated_at: snapshot.generated_at,
        window: snapshot.window,
        rows,
    }))
}

#[derive(Debug, Serialize)]
struct TickerDetail {
    generated_at: DateTime<Utc>,
    rank: TickerRank,
    market: Enrichment,
}

async fn get_ticker(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<TickerDetail>, StatusCode> {
    let symbol = symbol.trim().trim_start_matches('$').to_ascii_uppercase();
    if !is_valid_symbol(&symbol) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let snapshot = current(&state).await?;
    let entry = snapshot.entry(&symbol).ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(TickerDetail {
        generated_at: snapshot.generated_at,
        rank: entry.rank.clone(),
        market: entry.market.clone(),
    }))
}

#[derive(Debug, Serialize)]
struct SourcesView {
    generated_at: DateTime<Utc>,
    total_posts: usize,
    total_mentions: usize,
    sources: Vec<SourceReport>,
}

async fn get_sources(State(state): State<AppState>) -> Result<Json<SourcesView>, StatusCode> {
    let snapshot = current(&state).await?;
    Ok(Json(SourcesView {
        generated_at: snapshot.generated_at,
        total_posts: snapshot.total_posts,
        total_mentions: snapshot.total_mentions,
        sources: snapshot.sources.clone(),
    }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
