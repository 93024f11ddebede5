/// Database row types. Timestamps are unix seconds; chrono conversion
/// happens at the call sites that need it.

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedRow {
    pub id: String,
    pub question: String,
    pub category: String,
    pub resolution_date: Option<i64>,
    pub status: String,
    pub slug: Option<String>,
    pub image_url: Option<String>,
    pub current_price: f64,
    pub price_24h_ago: Option<f64>,
    pub volume: f64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct MarketDetailRow {
    pub id: String,
    pub question: String,
    pub description: Option<String>,
    pub category: String,
    pub resolution_date: Option<i64>,
    pub created_at: i64,
    pub status: String,
    pub outcomes: Option<String>,
    pub image_url: Option<String>,
    pub slug: Option<String>,
    pub last_updated: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SnapshotRow {
    pub market_id: String,
    pub ts: i64,
    pub yes_price: f64,
    pub no_price: f64,
    pub volume: f64,
    pub open_interest: f64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct PricePointRow {
    pub ts: i64,
    pub price: f64,
}
