use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{Connection, Sqlite, Transaction};
use tracing::{debug, error, info, warn};

use crate::cache::{FeedCache, KEY_CATEGORIES, KEY_ERRORS_HOURLY, KEY_FEED_PREFIX, KEY_MARKET_PREFIX, KEY_REQUESTS_DAILY};
use crate::error::Result;
use crate::source::{ListQuery, MarketSource};
use crate::store::MarketRepo;
use crate::types::NormalizedMarket;

const HOUR: Duration = Duration::from_secs(3600);
const DAY: Duration = Duration::from_secs(86_400);

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub page_size: usize,
    pub max_pages: usize,
    pub resolved_window_hours: i64,
    pub stale_recheck_minutes: i64,
    pub stale_batch_limit: i64,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            page_size: crate::config::PAGE_SIZE,
            max_pages: crate::config::MAX_PAGES,
            resolved_window_hours: crate::config::RESOLVED_WINDOW_HOURS,
            stale_recheck_minutes: crate::config::STALE_RECHECK_MINUTES,
            stale_batch_limit: crate::config::STALE_BATCH_LIMIT,
        }
    }
}

#[derive(Debug, Default)]
pub struct CycleStats {
    /// Raw records returned across both listing passes.
    pub listed: usize,
    /// Distinct markets after the id merge.
    pub merged: usize,
    /// Markets upserted with a snapshot this cycle.
    pub written: usize,
    /// Per-market failures (isolated, cycle continues).
    pub errors: usize,
    /// Stale markets repaired by direct id lookup.
    pub stale_refetched: usize,
}

/// One ingestion cycle: fetch, merge, repair staleness, write, invalidate.
///
/// The cycle fails outright only when the upstream listing or the store is
/// unreachable; a single market failing to write is counted and logged to
/// `ingestion_errors` without aborting the rest.
pub struct Reconciler {
    source: Arc<dyn MarketSource>,
    repo: MarketRepo,
    cache: Arc<FeedCache>,
    opts: IngestOptions,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn MarketSource>,
        repo: MarketRepo,
        cache: Arc<FeedCache>,
        opts: IngestOptions,
    ) -> Self {
        Self { source, repo, cache, opts }
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleStats> {
        match self.cycle_inner(now).await {
            Ok(stats) => {
                if stats.errors > 0 {
                    self.cache.incr_counter(KEY_ERRORS_HOURLY, stats.errors as i64, HOUR);
                }
                Ok(stats)
            }
            Err(e) => {
                self.cache.incr_counter(KEY_ERRORS_HOURLY, 1, HOUR);
                Err(e)
            }
        }
    }

    async fn cycle_inner(&self, now: DateTime<Utc>) -> Result<CycleStats> {
        let mut stats = CycleStats::default();
        let mut merged: HashMap<String, NormalizedMarket> = HashMap::new();

        // Pass 1: active listings, volume-descending, bounded pages.
        for page in 0..self.opts.max_pages {
            let query = ListQuery::active_page(self.opts.page_size, page * self.opts.page_size);
            let batch = self.source.list_markets(&query).await?;
            self.cache.incr_counter(KEY_REQUESTS_DAILY, 1, DAY);
            if batch.is_empty() {
                break;
            }
            stats.listed += batch.len();
            let short_page = batch.len() < self.opts.page_size;
            for market in batch {
                merged.insert(market.id.clone(), market);
            }
            if short_page {
                break;
            }
        }

        // Pass 2: recently resolved, newest close first. Stop once a page
        // dips past the recency window — older resolutions are already stored.
        let window_start = now - chrono::Duration::hours(self.opts.resolved_window_hours);
        for page in 0..self.opts.max_pages {
            let query = ListQuery::resolved_page(self.opts.page_size, page * self.opts.page_size);
            let batch = self.source.list_markets(&query).await?;
            self.cache.incr_counter(KEY_REQUESTS_DAILY, 1, DAY);
            if batch.is_empty() {
                break;
            }
            stats.listed += batch.len();
            let short_page = batch.len() < self.opts.page_size;
            let oldest_close = batch.iter().filter_map(|m| m.closed_time).min();
            for market in batch {
                // Last write wins: a market present in both passes keeps the
                // resolved-pass version.
                merged.insert(market.id.clone(), market);
            }
            if short_page || oldest_close.is_some_and(|t| t < window_start) {
                break;
            }
        }

        // Pass 3: staleness reconciliation. Bulk pagination can miss markets
        // that have in fact resolved; re-fetch them individually.
        let now_ts = now.timestamp();
        let stale_ids = self
            .repo
            .stale_active_ids(now_ts, self.opts.stale_recheck_minutes * 60, self.opts.stale_batch_limit)
            .await?;
        for id in stale_ids {
            if merged.contains_key(&id) {
                continue;
            }
            match self.source.fetch_market(&id).await {
                Ok(Some(market)) => {
                    stats.stale_refetched += 1;
                    merged.insert(market.id.clone(), market);
                }
                Ok(None) => debug!(market_id = %id, "stale market unknown upstream"),
                Err(e) => {
                    stats.errors += 1;
                    warn!(market_id = %id, "stale re-fetch failed: {e}");
                }
            }
        }

        stats.merged = merged.len();
        if merged.is_empty() {
            warn!("no markets fetched, skipping ingestion");
            return Ok(stats);
        }

        // All writes in one transaction; each market under its own savepoint
        // so a bad record rolls back alone.
        let mut tx = self.repo.pool().begin().await?;
        for market in merged.values() {
            match write_market(&mut tx, market, now_ts).await {
                Ok(()) => stats.written += 1,
                Err(e) => {
                    stats.errors += 1;
                    error!(market_id = %market.id, "market write failed: {e}");
                    if let Err(log_err) =
                        MarketRepo::log_ingestion_error(&mut *tx, &market.id, now_ts, &e.to_string()).await
                    {
                        warn!(market_id = %market.id, "error log insert failed: {log_err}");
                    }
                }
            }
        }
        tx.commit().await?;

        // Best-effort aggregate refresh.
        if let Err(e) = self.repo.refresh_trending(now_ts).await {
            error!("trending refresh failed: {e}");
        }

        // Serve fresh data from here on.
        self.cache.set_last_ingestion(now);
        self.cache.delete_prefix(KEY_FEED_PREFIX);
        self.cache.delete_prefix(KEY_MARKET_PREFIX);
        self.cache.delete(KEY_CATEGORIES);

        // Data-quality check: anything still active past its deadline is a
        // gap the next staleness pass should close.
        match self.repo.count_active_past_deadline(now_ts).await {
            Ok(0) => {}
            Ok(n) => warn!(count = n, "active markets past resolution deadline"),
            Err(e) => warn!("data-quality check failed: {e}"),
        }

        info!(
            listed = stats.listed,
            merged = stats.merged,
            written = stats.written,
            stale_refetched = stats.stale_refetched,
            errors = stats.errors,
            "ingestion cycle complete"
        );
        Ok(stats)
    }
}

async fn write_market(
    tx: &mut Transaction<'_, Sqlite>,
    market: &NormalizedMarket,
    ts: i64,
) -> Result<()> {
    let mut sp = (&mut **tx).begin().await?;
    MarketRepo::upsert_market(&mut *sp, market, ts).await?;
    MarketRepo::insert_snapshot(&mut *sp, market, ts).await?;
    sp.commit().await?;
    Ok(())
}
