use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::cache::{FeedCache, KEY_CATEGORIES, KEY_ERRORS_HOURLY};
use crate::config::{cache_ttl, FEED_QUERY_LIMIT, RESOLVED_WINDOW_HOURS, STALENESS_THRESHOLD_MINUTES};
use crate::error::AppError;
use crate::feed::scoring::{interesting_score, HeroWeights};
use crate::feed::{build_editorial_market, compose_feed, FeedInputs};
use crate::ingest::Reconciler;
use crate::store::{FeedRow, MarketRepo};
use crate::types::Category;

#[derive(Clone)]
pub struct ApiState {
    pub repo: MarketRepo,
    pub cache: Arc<FeedCache>,
    pub reconciler: Arc<Reconciler>,
    pub hero_weights: HeroWeights,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/feed", get(get_editorial_feed))
        .route("/api/markets", get(get_markets))
        .route("/api/markets/:id", get(get_market_detail))
        .route("/api/categories", get(get_categories))
        .route("/api/health", get(get_health))
        .route("/api/ingest", post(trigger_ingest))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct FeedQuery {
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct MarketsQuery {
    pub category: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct MarketCard {
    pub id: String,
    pub question: String,
    pub category: String,
    pub current_price: f64,
    pub price_24h_ago: Option<f64>,
    pub delta: Option<f64>,
    pub volume: f64,
    pub resolution_date: Option<DateTime<Utc>>,
    pub status: String,
    pub image_url: Option<String>,
    pub slug: Option<String>,
}

#[derive(Serialize)]
pub struct MarketsResponse {
    pub markets: Vec<MarketCard>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Serialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

#[derive(Serialize)]
pub struct MarketDetail {
    pub id: String,
    pub question: String,
    pub description: Option<String>,
    pub category: String,
    pub current_price: f64,
    pub price_24h_ago: Option<f64>,
    pub delta: Option<f64>,
    pub volume: f64,
    pub open_interest: f64,
    pub resolution_date: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub status: String,
    pub outcomes: Option<Vec<String>>,
    pub image_url: Option<String>,
    pub slug: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub price_history: Vec<PricePoint>,
}

#[derive(Serialize)]
pub struct CategoryInfo {
    pub name: String,
    pub slug: String,
    pub market_count: i64,
    pub featured_market_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub last_ingestion: Option<DateTime<Utc>>,
    pub staleness_minutes: Option<f64>,
    pub api_error_rate: f64,
    pub database_connected: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// The pre-computed editorial layout in a single response: hero, clusters,
/// sections, ticker, movers, recently resolved.
async fn get_editorial_feed(
    State(state): State<ApiState>,
    Query(params): Query<FeedQuery>,
) -> Result<Json<Value>, AppError> {
    // An unknown category falls back to the unfiltered feed.
    let category = params.category.as_deref().and_then(Category::from_slug);
    let cache_key = format!(
        "feed:editorial:{}",
        category.map(|c| c.as_str()).unwrap_or("all")
    );
    if let Some(cached) = state.cache.get(&cache_key) {
        return Ok(Json(cached));
    }

    let now = Utc::now();
    let now_ts = now.timestamp();

    let rows = state.repo.load_feed_rows(category, now_ts, FEED_QUERY_LIMIT).await?;
    let markets = rows.iter().map(build_editorial_market).collect();
    let total_markets = state.repo.count_active(category).await?;
    let resolved_rows = state
        .repo
        .load_recently_resolved(now_ts, RESOLVED_WINDOW_HOURS * 3600, 10)
        .await?;
    let recently_resolved = resolved_rows.iter().map(build_editorial_market).collect();
    let last_sync = state
        .repo
        .last_sync_ts()
        .await?
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single());

    let layout = compose_feed(
        FeedInputs { markets, recently_resolved, total_markets, last_sync },
        &state.hero_weights,
    );

    let value = serde_json::to_value(&layout)?;
    state.cache.set(&cache_key, value.clone(), Duration::from_secs(cache_ttl::EDITORIAL_FEED));
    Ok(Json(value))
}

/// Paginated market cards with latest snapshot data.
async fn get_markets(
    State(state): State<ApiState>,
    Query(params): Query<MarketsQuery>,
) -> Result<Json<Value>, AppError> {
    let category = match params.category.as_deref() {
        Some(raw) => Some(
            Category::from_slug(raw)
                .ok_or_else(|| AppError::InvalidParam(format!("unknown category: {raw}")))?,
        ),
        None => None,
    };
    let sort = params.sort.as_deref().unwrap_or("interesting");
    if sort != "interesting" && sort != "trending" {
        return Err(AppError::InvalidParam(format!("unknown sort: {sort}")));
    }
    let limit = params.limit.unwrap_or(50);
    if !(1..=100).contains(&limit) {
        return Err(AppError::InvalidParam("limit must be between 1 and 100".to_string()));
    }
    let offset = params.offset.unwrap_or(0).max(0);

    let cache_key = format!(
        "feed:{}:{}:{}:{}",
        category.map(|c| c.as_str()).unwrap_or("all"),
        sort,
        limit,
        offset
    );
    if let Some(cached) = state.cache.get(&cache_key) {
        return Ok(Json(cached));
    }

    let now = Utc::now();
    let rows = state.repo.load_feed_rows(category, now.timestamp(), FEED_QUERY_LIMIT).await?;
    let total = state.repo.count_active(category).await?;

    // 24h volume ranks over the loaded set, for the interesting score.
    let ranks = volume_ranks(&rows);

    let mut indexed: Vec<(usize, f64, f64)> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let delta = row
                .price_24h_ago
                .map(|day_ago| (row.current_price - day_ago).abs())
                .unwrap_or(0.0);
            let score = interesting_score(
                delta,
                ranks[i],
                row.resolution_date.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                now,
                row.current_price,
                rows.len(),
            );
            (i, delta, score)
        })
        .collect();

    match sort {
        "trending" => indexed.sort_by(|a, b| b.1.total_cmp(&a.1).then(rows[b.0].volume.total_cmp(&rows[a.0].volume))),
        _ => indexed.sort_by(|a, b| b.2.total_cmp(&a.2)),
    }

    let markets: Vec<MarketCard> = indexed
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .map(|&(i, delta, _)| market_card(&rows[i], delta))
        .collect();

    let response = MarketsResponse { markets, total, limit, offset };
    let value = serde_json::to_value(&response)?;
    state.cache.set(&cache_key, value.clone(), Duration::from_secs(cache_ttl::MARKET_FEED));
    Ok(Json(value))
}

/// Single market with a 7-day price history.
async fn get_market_detail(
    State(state): State<ApiState>,
    Path(market_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let cache_key = format!("market:{market_id}");
    if let Some(cached) = state.cache.get(&cache_key) {
        return Ok(Json(cached));
    }

    let row = state
        .repo
        .market_detail(&market_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("market {market_id}")))?;

    let now_ts = Utc::now().timestamp();
    let latest = state.repo.latest_snapshot(&market_id).await?;
    let price_24h_ago = state.repo.price_24h_ago(&market_id, now_ts).await?;
    let history = state.repo.price_history(&market_id, now_ts - 7 * 86_400).await?;

    let current_price = latest.as_ref().map(|s| s.yes_price).unwrap_or(0.5);
    let detail = MarketDetail {
        id: row.id,
        question: row.question,
        description: row.description,
        category: row.category,
        current_price,
        price_24h_ago,
        delta: price_24h_ago.map(|p| (current_price - p).abs()),
        volume: latest.as_ref().map(|s| s.volume).unwrap_or(0.0),
        open_interest: latest.as_ref().map(|s| s.open_interest).unwrap_or(0.0),
        resolution_date: row.resolution_date.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        created_at: Utc.timestamp_opt(row.created_at, 0).single(),
        status: row.status,
        outcomes: row.outcomes.as_deref().and_then(|s| serde_json::from_str(s).ok()),
        image_url: row.image_url,
        slug: row.slug,
        last_updated: Utc.timestamp_opt(row.last_updated, 0).single(),
        price_history: history
            .into_iter()
            .filter_map(|p| {
                Utc.timestamp_opt(p.ts, 0)
                    .single()
                    .map(|timestamp| PricePoint { timestamp, price: p.price })
            })
            .collect(),
    };

    let value = serde_json::to_value(&detail)?;
    state.cache.set(&cache_key, value.clone(), Duration::from_secs(cache_ttl::MARKET_DETAIL));
    Ok(Json(value))
}

/// Category listing with market counts and featured market ids.
async fn get_categories(State(state): State<ApiState>) -> Result<Json<Value>, AppError> {
    if let Some(cached) = state.cache.get(KEY_CATEGORIES) {
        return Ok(Json(cached));
    }

    let mut categories = Vec::with_capacity(Category::ALL.len());
    for category in Category::ALL {
        let market_count = state.repo.count_active(Some(category)).await?;
        let featured_market_ids = state.repo.featured_market_ids(category, 10).await?;
        categories.push(CategoryInfo {
            name: category.display_name().to_string(),
            slug: category.as_str().to_string(),
            market_count,
            featured_market_ids,
        });
    }

    let value = serde_json::to_value(&categories)?;
    state.cache.set(KEY_CATEGORIES, value.clone(), Duration::from_secs(cache_ttl::CATEGORIES));
    Ok(Json(value))
}

/// Health check with ingestion status. Degrades rather than failing: a
/// stale or error-prone system still serves the last-known-good feed.
async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let mut status = "healthy";

    let database_connected = state.repo.ping().await.is_ok();
    if !database_connected {
        status = "degraded";
    }

    let last_ingestion = state.cache.last_ingestion();
    let staleness_minutes = last_ingestion.map(|at| {
        let minutes = (Utc::now() - at).num_seconds() as f64 / 60.0;
        (minutes * 10.0).round() / 10.0
    });
    if staleness_minutes.is_some_and(|m| m > STALENESS_THRESHOLD_MINUTES as f64) {
        status = "stale";
    }

    // Rough estimate: ~4 ingestion runs per hour at the default cadence.
    let error_count = state.cache.counter(KEY_ERRORS_HOURLY);
    let api_error_rate = ((error_count as f64 / 4.0).min(1.0) * 1000.0).round() / 1000.0;
    if api_error_rate > 0.05 {
        status = "degraded";
    }

    Json(HealthResponse {
        status: status.to_string(),
        last_ingestion,
        staleness_minutes,
        api_error_rate,
        database_connected,
    })
}

/// Manually trigger an ingestion cycle. Runs in the background so the
/// request returns immediately; the scheduler remains the normal driver.
async fn trigger_ingest(State(state): State<ApiState>) -> Json<Value> {
    let reconciler = Arc::clone(&state.reconciler);
    tokio::spawn(async move {
        match reconciler.run_cycle(Utc::now()).await {
            Ok(stats) => info!(written = stats.written, "manual ingestion complete"),
            Err(e) => error!("manual ingestion failed: {e}"),
        }
    });
    Json(serde_json::json!({
        "status": "started",
        "message": "Ingestion started in background. Check /api/health for status.",
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// 1-based rank of each row by volume descending.
fn volume_ranks(rows: &[FeedRow]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| rows[b].volume.total_cmp(&rows[a].volume));
    let mut ranks = vec![0usize; rows.len()];
    for (rank, &idx) in order.iter().enumerate() {
        ranks[idx] = rank + 1;
    }
    ranks
}

fn market_card(row: &FeedRow, delta: f64) -> MarketCard {
    MarketCard {
        id: row.id.clone(),
        question: row.question.clone(),
        category: row.category.clone(),
        current_price: row.current_price,
        price_24h_ago: row.price_24h_ago,
        delta: row.price_24h_ago.map(|_| delta),
        volume: row.volume,
        resolution_date: row.resolution_date.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        status: row.status.clone(),
        image_url: row.image_url.clone(),
        slug: row.slug.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, volume: f64) -> FeedRow {
        FeedRow {
            id: id.to_string(),
            question: String::new(),
            category: "other".to_string(),
            resolution_date: None,
            status: "active".to_string(),
            slug: None,
            image_url: None,
            current_price: 0.5,
            price_24h_ago: None,
            volume,
        }
    }

    #[test]
    fn volume_ranks_are_one_based_descending() {
        let rows = vec![row("a", 10.0), row("b", 30.0), row("c", 20.0)];
        assert_eq!(volume_ranks(&rows), vec![3, 1, 2]);
    }

    #[test]
    fn card_delta_is_absent_without_history() {
        let card = market_card(&row("a", 10.0), 0.0);
        assert!(card.delta.is_none());
    }
}
