mod api;
mod cache;
mod config;
mod error;
mod feed;
mod ingest;
mod source;
mod store;
mod types;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::{router, ApiState};
use crate::cache::FeedCache;
use crate::config::Config;
use crate::error::Result;
use crate::ingest::{IngestOptions, IngestScheduler, Reconciler, RetryPolicy};
use crate::source::GammaClient;
use crate::store::MarketRepo;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let connect_options =
        SqliteConnectOptions::from_str(&format!("sqlite:{}", cfg.db_path))?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    let repo = MarketRepo::new(pool);
    let cache = Arc::new(FeedCache::new());
    let source = Arc::new(GammaClient::new(&cfg.gamma_api_url)?);

    // --- Ingestion reconciler + scheduler ---
    let opts = IngestOptions {
        page_size: cfg.page_size,
        max_pages: cfg.max_pages,
        resolved_window_hours: cfg.resolved_window_hours,
        stale_recheck_minutes: cfg.stale_recheck_minutes,
        ..IngestOptions::default()
    };
    let reconciler = Arc::new(Reconciler::new(
        source,
        repo.clone(),
        Arc::clone(&cache),
        opts,
    ));

    let scheduler = IngestScheduler::new(
        Arc::clone(&reconciler),
        Duration::from_secs(cfg.ingest_interval_secs),
        RetryPolicy::default(),
    );
    tokio::spawn(async move { scheduler.run().await });

    // --- HTTP API server ---
    let api_state = ApiState {
        repo,
        cache,
        reconciler,
        hero_weights: cfg.hero_weights.clone(),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
