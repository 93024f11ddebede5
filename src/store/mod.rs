pub mod models;

pub use models::{FeedRow, MarketDetailRow, PricePointRow, SnapshotRow};

use sqlx::{Executor, Sqlite, SqlitePool};

use crate::error::Result;
use crate::types::{Category, NormalizedMarket};

const DAY_SECS: i64 = 86_400;

/// All SQL in one place. Write operations take an executor so the reconciler
/// can run them inside its cycle transaction; reads go through the pool.
#[derive(Clone)]
pub struct MarketRepo {
    pool: SqlitePool,
}

impl MarketRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -- writes (executor-generic, usable inside a transaction) --

    /// Insert-or-update by id. `created_at` is preserved on update.
    pub async fn upsert_market<'e, E: Executor<'e, Database = Sqlite>>(
        exec: E,
        m: &NormalizedMarket,
        now_ts: i64,
    ) -> Result<()> {
        let outcomes = match &m.outcomes {
            Some(list) => Some(serde_json::to_string(list)?),
            None => None,
        };
        sqlx::query(
            r#"
            INSERT INTO markets (id, question, description, category, resolution_date,
                closed_time, resolution_status, created_at, status, last_updated,
                outcomes, image_url, slug)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                question = excluded.question,
                description = excluded.description,
                category = excluded.category,
                resolution_date = excluded.resolution_date,
                closed_time = excluded.closed_time,
                resolution_status = excluded.resolution_status,
                status = excluded.status,
                last_updated = excluded.last_updated,
                outcomes = excluded.outcomes,
                image_url = excluded.image_url,
                slug = excluded.slug
            "#,
        )
        .bind(&m.id)
        .bind(&m.question)
        .bind(&m.description)
        .bind(m.category.as_str())
        .bind(m.resolution_date.map(|d| d.timestamp()))
        .bind(m.closed_time.map(|d| d.timestamp()))
        .bind(&m.resolution_status)
        .bind(m.created_at.timestamp())
        .bind(m.status.as_str())
        .bind(now_ts)
        .bind(outcomes)
        .bind(&m.image_url)
        .bind(&m.slug)
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Append-only snapshot insert; a duplicate (market_id, ts) is a no-op.
    pub async fn insert_snapshot<'e, E: Executor<'e, Database = Sqlite>>(
        exec: E,
        m: &NormalizedMarket,
        ts: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (market_id, ts, yes_price, no_price, volume, open_interest)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(market_id, ts) DO NOTHING
            "#,
        )
        .bind(&m.id)
        .bind(ts)
        .bind(m.yes_price)
        .bind(m.no_price)
        .bind(m.volume)
        .bind(m.open_interest)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn log_ingestion_error<'e, E: Executor<'e, Database = Sqlite>>(
        exec: E,
        market_id: &str,
        ts: i64,
        message: &str,
    ) -> Result<()> {
        let truncated: String = message.chars().take(500).collect();
        sqlx::query(
            "INSERT INTO ingestion_errors (market_id, ts, error_message, retry_count) VALUES (?, ?, ?, 0)",
        )
        .bind(market_id)
        .bind(ts)
        .bind(truncated)
        .execute(exec)
        .await?;
        Ok(())
    }

    // -- staleness reconciliation --

    /// Markets still `active` whose deadline has passed and whose last update
    /// is older than the recheck window. These are bulk-listing gaps the
    /// reconciler repairs by direct id lookup.
    pub async fn stale_active_ids(
        &self,
        now_ts: i64,
        recheck_secs: i64,
        limit: i64,
    ) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM markets
            WHERE status = 'active'
              AND resolution_date IS NOT NULL
              AND resolution_date < ?
              AND last_updated < ?
            ORDER BY resolution_date ASC
            LIMIT ?
            "#,
        )
        .bind(now_ts)
        .bind(now_ts - recheck_secs)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Data-quality check: active markets whose deadline has already passed.
    pub async fn count_active_past_deadline(&self, now_ts: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM markets WHERE status = 'active' AND resolution_date IS NOT NULL AND resolution_date < ?",
        )
        .bind(now_ts)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // -- feed inputs --

    /// Active markets with their latest and 24h-ago snapshot prices,
    /// volume-descending, capped.
    pub async fn load_feed_rows(
        &self,
        category: Option<Category>,
        now_ts: i64,
        limit: i64,
    ) -> Result<Vec<FeedRow>> {
        let sql = format!(
            r#"
            SELECT m.id, m.question, m.category, m.resolution_date, m.status, m.slug, m.image_url,
                COALESCE((SELECT s.yes_price FROM snapshots s
                          WHERE s.market_id = m.id ORDER BY s.ts DESC LIMIT 1), 0.5) AS current_price,
                (SELECT s.yes_price FROM snapshots s
                 WHERE s.market_id = m.id AND s.ts <= ? ORDER BY s.ts DESC LIMIT 1) AS price_24h_ago,
                COALESCE((SELECT s.volume FROM snapshots s
                          WHERE s.market_id = m.id ORDER BY s.ts DESC LIMIT 1), 0.0) AS volume
            FROM markets m
            WHERE m.status = 'active' {}
            ORDER BY volume DESC
            LIMIT ?
            "#,
            if category.is_some() { "AND m.category = ?" } else { "" },
        );

        let mut query = sqlx::query_as::<_, FeedRow>(&sql).bind(now_ts - DAY_SECS);
        if let Some(c) = category {
            query = query.bind(c.as_str());
        }
        Ok(query.bind(limit).fetch_all(&self.pool).await?)
    }

    pub async fn count_active(&self, category: Option<Category>) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM markets m WHERE m.status = 'active' {}",
            if category.is_some() { "AND m.category = ?" } else { "" },
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        if let Some(c) = category {
            query = query.bind(c.as_str());
        }
        Ok(query.fetch_one(&self.pool).await?)
    }

    /// Markets resolved within the window, most recent first.
    pub async fn load_recently_resolved(
        &self,
        now_ts: i64,
        window_secs: i64,
        limit: i64,
    ) -> Result<Vec<FeedRow>> {
        Ok(sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT m.id, m.question, m.category, m.resolution_date, m.status, m.slug, m.image_url,
                COALESCE((SELECT s.yes_price FROM snapshots s
                          WHERE s.market_id = m.id ORDER BY s.ts DESC LIMIT 1), 0.5) AS current_price,
                NULL AS price_24h_ago,
                COALESCE((SELECT s.volume FROM snapshots s
                          WHERE s.market_id = m.id ORDER BY s.ts DESC LIMIT 1), 0.0) AS volume
            FROM markets m
            WHERE m.status = 'resolved'
              AND COALESCE(m.closed_time, m.last_updated) >= ?
            ORDER BY COALESCE(m.closed_time, m.last_updated) DESC
            LIMIT ?
            "#,
        )
        .bind(now_ts - window_secs)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Timestamp of the newest snapshot, i.e. the last completed sync.
    pub async fn last_sync_ts(&self) -> Result<Option<i64>> {
        let ts: Option<i64> = sqlx::query_scalar("SELECT MAX(ts) FROM snapshots")
            .fetch_one(&self.pool)
            .await?;
        Ok(ts)
    }

    // -- market detail --

    pub async fn market_detail(&self, id: &str) -> Result<Option<MarketDetailRow>> {
        Ok(sqlx::query_as::<_, MarketDetailRow>(
            r#"
            SELECT id, question, description, category, resolution_date, created_at,
                   status, outcomes, image_url, slug, last_updated
            FROM markets WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn latest_snapshot(&self, market_id: &str) -> Result<Option<SnapshotRow>> {
        Ok(sqlx::query_as::<_, SnapshotRow>(
            "SELECT market_id, ts, yes_price, no_price, volume, open_interest
             FROM snapshots WHERE market_id = ? ORDER BY ts DESC LIMIT 1",
        )
        .bind(market_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn price_24h_ago(&self, market_id: &str, now_ts: i64) -> Result<Option<f64>> {
        Ok(sqlx::query_scalar(
            "SELECT yes_price FROM snapshots WHERE market_id = ? AND ts <= ? ORDER BY ts DESC LIMIT 1",
        )
        .bind(market_id)
        .bind(now_ts - DAY_SECS)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn price_history(&self, market_id: &str, since_ts: i64) -> Result<Vec<PricePointRow>> {
        Ok(sqlx::query_as::<_, PricePointRow>(
            "SELECT ts, yes_price AS price FROM snapshots
             WHERE market_id = ? AND ts >= ? ORDER BY ts ASC",
        )
        .bind(market_id)
        .bind(since_ts)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Top active markets per category by latest volume, for category pages.
    pub async fn featured_market_ids(&self, category: Category, limit: i64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT m.id
            FROM markets m
            WHERE m.category = ? AND m.status = 'active'
            ORDER BY COALESCE((SELECT s.volume FROM snapshots s
                               WHERE s.market_id = m.id ORDER BY s.ts DESC LIMIT 1), 0) DESC
            LIMIT ?
            "#,
        )
        .bind(category.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    // -- trending aggregate --

    /// Recompute the trending table from the latest snapshots. Best-effort;
    /// the caller treats failure as non-fatal.
    pub async fn refresh_trending(&self, now_ts: i64) -> Result<()> {
        sqlx::query("DELETE FROM trending").execute(&self.pool).await?;
        sqlx::query(
            r#"
            INSERT INTO trending (market_id, delta, volume, computed_at)
            SELECT m.id,
                ABS(
                    COALESCE((SELECT s.yes_price FROM snapshots s
                              WHERE s.market_id = m.id ORDER BY s.ts DESC LIMIT 1), 0.5)
                    - COALESCE((SELECT s.yes_price FROM snapshots s
                                WHERE s.market_id = m.id AND s.ts <= ? ORDER BY s.ts DESC LIMIT 1),
                               (SELECT s.yes_price FROM snapshots s
                                WHERE s.market_id = m.id ORDER BY s.ts DESC LIMIT 1),
                               0.5)
                ),
                COALESCE((SELECT s.volume FROM snapshots s
                          WHERE s.market_id = m.id ORDER BY s.ts DESC LIMIT 1), 0),
                ?
            FROM markets m
            WHERE m.status = 'active'
            "#,
        )
        .bind(now_ts - DAY_SECS)
        .bind(now_ts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketStatus, NormalizedMarket};
    use chrono::{TimeZone, Utc};

    fn market(id: &str) -> NormalizedMarket {
        NormalizedMarket {
            id: id.to_string(),
            question: format!("Will {id} happen?"),
            description: String::new(),
            category: Category::Other,
            resolution_date: None,
            closed_time: None,
            resolution_status: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            status: MarketStatus::Active,
            outcomes: Some(vec!["Yes".to_string(), "No".to_string()]),
            image_url: None,
            slug: None,
            yes_price: 0.6,
            no_price: 0.4,
            volume: 1000.0,
            open_interest: 50.0,
        }
    }

    #[tokio::test]
    async fn upsert_updates_in_place() {
        let pool = test_pool().await;
        let repo = MarketRepo::new(pool.clone());

        let mut m = market("m1");
        MarketRepo::upsert_market(&pool, &m, 100).await.unwrap();
        m.question = "Updated?".to_string();
        m.status = MarketStatus::Resolved;
        MarketRepo::upsert_market(&pool, &m, 200).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM markets")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let detail = repo.market_detail("m1").await.unwrap().unwrap();
        assert_eq!(detail.question, "Updated?");
        assert_eq!(detail.status, "resolved");
        assert_eq!(detail.last_updated, 200);
        // created_at survives the update
        assert_eq!(detail.created_at, m.created_at.timestamp());
    }

    #[tokio::test]
    async fn duplicate_snapshot_is_a_noop() {
        let pool = test_pool().await;
        let m = market("m1");
        MarketRepo::upsert_market(&pool, &m, 100).await.unwrap();
        MarketRepo::insert_snapshot(&pool, &m, 100).await.unwrap();
        MarketRepo::insert_snapshot(&pool, &m, 100).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM snapshots")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn stale_query_selects_only_overdue_and_unrefreshed() {
        let pool = test_pool().await;
        let repo = MarketRepo::new(pool.clone());
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let now_ts = now.timestamp();

        // Deadline 2 days past, last updated 90 minutes ago — stale.
        let mut overdue = market("overdue");
        overdue.resolution_date = Some(now - chrono::Duration::days(2));
        MarketRepo::upsert_market(&pool, &overdue, now_ts - 90 * 60).await.unwrap();

        // Deadline 2 days past but updated 10 minutes ago — not stale.
        let mut fresh = market("fresh");
        fresh.resolution_date = Some(now - chrono::Duration::days(2));
        MarketRepo::upsert_market(&pool, &fresh, now_ts - 10 * 60).await.unwrap();

        // Deadline in the future — never stale.
        let mut future = market("future");
        future.resolution_date = Some(now + chrono::Duration::days(2));
        MarketRepo::upsert_market(&pool, &future, now_ts - 90 * 60).await.unwrap();

        let stale = repo.stale_active_ids(now_ts, 60 * 60, 50).await.unwrap();
        assert_eq!(stale, vec!["overdue".to_string()]);

        // Both past-deadline markets trip the data-quality counter.
        assert_eq!(repo.count_active_past_deadline(now_ts).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn feed_rows_carry_latest_and_day_ago_prices() {
        let pool = test_pool().await;
        let repo = MarketRepo::new(pool.clone());
        let now_ts = 1_000_000i64;

        let mut m = market("m1");
        MarketRepo::upsert_market(&pool, &m, now_ts).await.unwrap();

        // Old snapshot (25h ago), then a fresh one.
        m.yes_price = 0.40;
        MarketRepo::insert_snapshot(&pool, &m, now_ts - 25 * 3600).await.unwrap();
        m.yes_price = 0.55;
        m.volume = 9999.0;
        MarketRepo::insert_snapshot(&pool, &m, now_ts).await.unwrap();

        let rows = repo.load_feed_rows(None, now_ts, 500).await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert!((row.current_price - 0.55).abs() < 1e-9);
        assert!((row.price_24h_ago.unwrap() - 0.40).abs() < 1e-9);
        assert!((row.volume - 9999.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn recently_resolved_respects_window() {
        let pool = test_pool().await;
        let repo = MarketRepo::new(pool.clone());
        let now_ts = 1_000_000i64;

        let mut recent = market("recent");
        recent.status = MarketStatus::Resolved;
        recent.closed_time = Some(Utc.timestamp_opt(now_ts - 3600, 0).unwrap());
        MarketRepo::upsert_market(&pool, &recent, now_ts).await.unwrap();

        let mut old = market("old");
        old.status = MarketStatus::Resolved;
        old.closed_time = Some(Utc.timestamp_opt(now_ts - 3 * 86_400, 0).unwrap());
        MarketRepo::upsert_market(&pool, &old, now_ts).await.unwrap();

        let rows = repo.load_recently_resolved(now_ts, 86_400, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "recent");
    }

    #[tokio::test]
    async fn refresh_trending_computes_abs_delta() {
        let pool = test_pool().await;
        let repo = MarketRepo::new(pool.clone());
        let now_ts = 1_000_000i64;

        let mut m = market("m1");
        MarketRepo::upsert_market(&pool, &m, now_ts).await.unwrap();
        m.yes_price = 0.70;
        MarketRepo::insert_snapshot(&pool, &m, now_ts - 25 * 3600).await.unwrap();
        m.yes_price = 0.50;
        MarketRepo::insert_snapshot(&pool, &m, now_ts).await.unwrap();

        repo.refresh_trending(now_ts).await.unwrap();
        let (delta,): (f64,) =
            sqlx::query_as("SELECT delta FROM trending WHERE market_id = 'm1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!((delta - 0.20).abs() < 1e-9);
    }
}
