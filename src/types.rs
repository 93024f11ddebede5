use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Politics,
    Crypto,
    Sports,
    Tech,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Politics,
        Category::Crypto,
        Category::Sports,
        Category::Tech,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Politics => "politics",
            Category::Crypto => "crypto",
            Category::Sports => "sports",
            Category::Tech => "tech",
            Category::Other => "other",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Politics => "Politics",
            Category::Crypto => "Crypto",
            Category::Sports => "Sports",
            Category::Tech => "Tech",
            Category::Other => "Other",
        }
    }

    /// Parse one of our own taxonomy slugs. Unknown input is None, not Other —
    /// API query params must reject junk rather than silently widen to "other".
    pub fn from_slug(s: &str) -> Option<Category> {
        match s {
            "politics" => Some(Category::Politics),
            "crypto" => Some(Category::Crypto),
            "sports" => Some(Category::Sports),
            "tech" => Some(Category::Tech),
            "other" => Some(Category::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Map an upstream category/group label onto the fixed taxonomy.
/// Case-insensitive, whitespace-trimmed; anything unmapped is `other`.
pub fn map_category(raw: &str) -> Category {
    match raw.trim().to_lowercase().as_str() {
        "politics" | "us-politics" | "us politics" | "world-politics" | "elections"
        | "geopolitics" => Category::Politics,
        "crypto" | "cryptocurrency" | "bitcoin" | "ethereum" | "defi" | "nft" => Category::Crypto,
        "sports" | "nfl" | "nba" | "mlb" | "soccer" | "football" | "mma" => Category::Sports,
        "tech" | "technology" | "ai" | "science" | "space" => Category::Tech,
        _ => Category::Other,
    }
}

// ---------------------------------------------------------------------------
// Market lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Active,
    Resolved,
}

impl MarketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::Active => "active",
            MarketStatus::Resolved => "resolved",
        }
    }

    pub fn from_str(s: &str) -> MarketStatus {
        match s {
            "resolved" => MarketStatus::Resolved,
            _ => MarketStatus::Active,
        }
    }
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Normalized upstream record
// ---------------------------------------------------------------------------

/// One market as reduced from a raw upstream listing: metadata plus the
/// price observation that becomes this cycle's snapshot row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMarket {
    pub id: String,
    pub question: String,
    pub description: String,
    pub category: Category,
    pub resolution_date: Option<DateTime<Utc>>,
    pub closed_time: Option<DateTime<Utc>>,
    pub resolution_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: MarketStatus,
    pub outcomes: Option<Vec<String>>,
    pub image_url: Option<String>,
    pub slug: Option<String>,
    pub yes_price: f64,
    pub no_price: f64,
    pub volume: f64,
    pub open_interest: f64,
}

/// A field the normalizer could not parse and replaced with its default.
/// Surfaced alongside the record so malformed-payload handling stays testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAnomaly {
    Prices,
    Volume,
    Liquidity,
    EndDate,
    CreatedDate,
    ClosedTime,
    Outcomes,
}

impl std::fmt::Display for FieldAnomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FieldAnomaly::Prices => "prices",
            FieldAnomaly::Volume => "volume",
            FieldAnomaly::Liquidity => "liquidity",
            FieldAnomaly::EndDate => "end_date",
            FieldAnomaly::CreatedDate => "created_date",
            FieldAnomaly::ClosedTime => "closed_time",
            FieldAnomaly::Outcomes => "outcomes",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Editorial (one feed computation, never persisted)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorialMarket {
    pub id: String,
    pub question: String,
    pub headline: String,
    pub summary: String,
    pub category: Category,
    pub current_price: f64,
    /// 0-100 scale, rounded.
    pub probability: i64,
    pub price_24h_ago: Option<f64>,
    /// Signed 24h change in percentage points, rounded to 1 decimal.
    pub change_24h: f64,
    pub volume: f64,
    pub resolution_date: Option<DateTime<Utc>>,
    pub status: MarketStatus,
    pub slug: Option<String>,
    pub image_url: Option<String>,
    pub cluster_id: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: u32,
    pub title: String,
    pub tag: String,
    pub markets: Vec<EditorialMarket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeroSection {
    pub primary: Option<EditorialMarket>,
    pub secondary: Vec<EditorialMarket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSection {
    pub label: String,
    pub card_variant: String,
    pub grid_cols: u8,
    pub markets: Vec<EditorialMarket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerItem {
    /// Headline truncated to 40 chars.
    pub label: String,
    pub change: f64,
    pub probability: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedMeta {
    pub total_markets: i64,
    pub last_sync: Option<DateTime<Utc>>,
    pub sources_status: BTreeMap<String, String>,
}

/// The composed feed: everything a client renders in one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedLayout {
    pub hero: HeroSection,
    pub clusters: Vec<Cluster>,
    pub sections: Vec<FeedSection>,
    pub ticker: Vec<TickerItem>,
    pub movers: Vec<EditorialMarket>,
    pub recently_resolved: Vec<EditorialMarket>,
    pub meta: FeedMeta,
}
