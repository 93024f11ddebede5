use crate::error::{AppError, Result};
use crate::feed::scoring::HeroWeights;

pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";

/// How often the reconciler runs a full ingestion cycle (seconds).
pub const INGEST_INTERVAL_SECS: u64 = 120;

/// Page size for upstream listing requests.
pub const PAGE_SIZE: usize = 100;

/// Maximum listing pages fetched per pass (active and resolved each).
pub const MAX_PAGES: usize = 5;

/// Recently-resolved pass stops once a page's oldest closed_time is older than this.
pub const RESOLVED_WINDOW_HOURS: i64 = 24;

/// Active markets past their resolution deadline are re-fetched individually
/// once their last update is older than this.
pub const STALE_RECHECK_MINUTES: i64 = 60;

/// Max markets re-fetched per cycle by the staleness pass.
pub const STALE_BATCH_LIMIT: i64 = 50;

/// Max attempts for a failed cycle before waiting for the next tick,
/// with delays base * multiplier^attempt (60s, 180s, 540s).
pub const RETRY_MAX_ATTEMPTS: u32 = 3;
pub const RETRY_BASE_DELAY_SECS: u64 = 60;
pub const RETRY_MULTIPLIER: u32 = 3;

/// Cache TTLs (seconds).
pub mod cache_ttl {
    pub const EDITORIAL_FEED: u64 = 60;
    pub const MARKET_FEED: u64 = 300;
    pub const MARKET_DETAIL: u64 = 300;
    pub const CATEGORIES: u64 = 3600;
}

/// Health reports `stale` once the last ingestion is older than this.
pub const STALENESS_THRESHOLD_MINUTES: i64 = 30;

/// Markets loaded per feed computation (volume-descending cap).
pub const FEED_QUERY_LIMIT: i64 = 500;

/// Ticker and movers length.
pub const TICKER_COUNT: usize = 8;

#[derive(Debug, Clone)]
pub struct Config {
    pub gamma_api_url: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Seconds between ingestion cycles (INGEST_INTERVAL_SECS)
    pub ingest_interval_secs: u64,
    /// Upstream page size (INGEST_PAGE_SIZE)
    pub page_size: usize,
    /// Upstream page cap per pass (INGEST_MAX_PAGES)
    pub max_pages: usize,
    /// Recency window for the resolved pass, hours (RESOLVED_WINDOW_HOURS)
    pub resolved_window_hours: i64,
    /// Staleness recheck window, minutes (STALE_RECHECK_MINUTES)
    pub stale_recheck_minutes: i64,
    /// Hero scoring weights, overridable via HERO_* env vars.
    pub hero_weights: HeroWeights,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            gamma_api_url: std::env::var("GAMMA_API_URL")
                .unwrap_or_else(|_| GAMMA_API_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "polyfeed.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            ingest_interval_secs: env_parse("INGEST_INTERVAL_SECS", INGEST_INTERVAL_SECS),
            page_size: env_parse("INGEST_PAGE_SIZE", PAGE_SIZE),
            max_pages: env_parse("INGEST_MAX_PAGES", MAX_PAGES),
            resolved_window_hours: env_parse("RESOLVED_WINDOW_HOURS", RESOLVED_WINDOW_HOURS),
            stale_recheck_minutes: env_parse("STALE_RECHECK_MINUTES", STALE_RECHECK_MINUTES),
            hero_weights: hero_weights_from_env(),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn hero_weights_from_env() -> HeroWeights {
    let d = HeroWeights::default();
    HeroWeights {
        movement: env_parse("HERO_WEIGHT_MOVEMENT", d.movement),
        significance: env_parse("HERO_WEIGHT_SIGNIFICANCE", d.significance),
        volatility: env_parse("HERO_WEIGHT_VOLATILITY", d.volatility),
        sigmoid_steepness: env_parse("HERO_SIGMOID_STEEPNESS", d.sigmoid_steepness),
        sigmoid_midpoint: env_parse("HERO_SIGMOID_MIDPOINT", d.sigmoid_midpoint),
        min_change_threshold: env_parse("HERO_MIN_CHANGE_THRESHOLD", d.min_change_threshold),
        max_volume_log: env_parse("HERO_MAX_VOLUME_LOG", d.max_volume_log),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("POLYFEED_TEST_BAD_PORT", "not-a-number");
        let v: u16 = env_parse("POLYFEED_TEST_BAD_PORT", 42);
        assert_eq!(v, 42);
        std::env::remove_var("POLYFEED_TEST_BAD_PORT");
    }

    #[test]
    fn default_hero_weights_match_documented_values() {
        let w = HeroWeights::default();
        assert!((w.movement - 0.4).abs() < 1e-9);
        assert!((w.significance - 0.5).abs() < 1e-9);
        assert!((w.volatility - 0.1).abs() < 1e-9);
        assert!((w.sigmoid_midpoint - 8.0).abs() < 1e-9);
    }
}
