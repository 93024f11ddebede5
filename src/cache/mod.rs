use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;

pub const KEY_FEED_PREFIX: &str = "feed:";
pub const KEY_MARKET_PREFIX: &str = "market:";
pub const KEY_CATEGORIES: &str = "categories";
pub const KEY_ERRORS_HOURLY: &str = "errors:hourly";
pub const KEY_REQUESTS_DAILY: &str = "requests:daily";

struct Entry {
    value: Value,
    expires_at: Instant,
}

struct Counter {
    count: i64,
    expires_at: Instant,
}

/// Last-writer-wins in-memory KV with TTL expiry, plus expiring counters and
/// the last-ingestion timestamp. Injected as an `Arc` collaborator; the
/// serving path reads it, the reconciler writes and invalidates it.
#[derive(Default)]
pub struct FeedCache {
    entries: DashMap<String, Entry>,
    counters: DashMap<String, Counter>,
    last_ingestion: std::sync::Mutex<Option<DateTime<Utc>>>,
}

impl FeedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let entry = self.entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            Entry { value, expires_at: Instant::now() + ttl },
        );
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn delete_prefix(&self, prefix: &str) {
        self.entries.retain(|k, _| !k.starts_with(prefix));
    }

    // -- counters --

    /// Increment a counter, refreshing its TTL. An expired counter restarts
    /// from zero before the increment.
    pub fn incr_counter(&self, key: &str, count: i64, ttl: Duration) {
        let now = Instant::now();
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| Counter { count: 0, expires_at: now + ttl });
        if entry.expires_at <= now {
            entry.count = 0;
        }
        entry.count += count;
        entry.expires_at = now + ttl;
    }

    pub fn counter(&self, key: &str) -> i64 {
        match self.counters.get(key) {
            Some(c) if c.expires_at > Instant::now() => c.count,
            _ => 0,
        }
    }

    // -- ingestion bookkeeping --

    pub fn set_last_ingestion(&self, at: DateTime<Utc>) {
        if let Ok(mut guard) = self.last_ingestion.lock() {
            *guard = Some(at);
        }
    }

    pub fn last_ingestion(&self) -> Option<DateTime<Utc>> {
        self.last_ingestion.lock().ok().and_then(|g| *g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_get_roundtrip_and_expiry() {
        let cache = FeedCache::new();
        cache.set("feed:all", json!({"x": 1}), Duration::from_secs(60));
        assert_eq!(cache.get("feed:all"), Some(json!({"x": 1})));

        cache.set("feed:gone", json!(2), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("feed:gone"), None);
    }

    #[test]
    fn delete_prefix_clears_only_matching_keys() {
        let cache = FeedCache::new();
        cache.set("feed:all", json!(1), Duration::from_secs(60));
        cache.set("feed:crypto", json!(2), Duration::from_secs(60));
        cache.set("market:m1", json!(3), Duration::from_secs(60));

        cache.delete_prefix(KEY_FEED_PREFIX);
        assert_eq!(cache.get("feed:all"), None);
        assert_eq!(cache.get("feed:crypto"), None);
        assert_eq!(cache.get("market:m1"), Some(json!(3)));
    }

    #[test]
    fn counters_accumulate_and_expire() {
        let cache = FeedCache::new();
        cache.incr_counter(KEY_ERRORS_HOURLY, 1, Duration::from_secs(60));
        cache.incr_counter(KEY_ERRORS_HOURLY, 2, Duration::from_secs(60));
        assert_eq!(cache.counter(KEY_ERRORS_HOURLY), 3);

        cache.incr_counter("short", 5, Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.counter("short"), 0);
        // A new increment after expiry starts over rather than resuming.
        cache.incr_counter("short", 1, Duration::from_secs(60));
        assert_eq!(cache.counter("short"), 1);
    }

    #[test]
    fn last_ingestion_roundtrip() {
        let cache = FeedCache::new();
        assert!(cache.last_ingestion().is_none());
        let at = Utc::now();
        cache.set_last_ingestion(at);
        assert_eq!(cache.last_ingestion(), Some(at));
    }
}
