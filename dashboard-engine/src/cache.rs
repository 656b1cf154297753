//! FILENAME: dashboard-engine/src/cache.rs
//! Result Cache - Computed metric values keyed by a filter-state fingerprint.
//!
//! The cache is an optimization only: every value it holds can be
//! recomputed, and a dashboard computed with `NoopCache` is identical to one
//! computed with `InMemoryCache`. Keys do not cover row data or
//! definitions, so callers invalidate when those change.
//!
//! Key format: `{dashboardId}:{groupId}:{metricId}:{level:value|level:value}`
//! with the pairs sorted, so map iteration order never changes a key.

use metric_engine::logging::CACHE;
use metric_engine::{log_debug, HierarchyFilterValue};
use rustc_hash::FxHashMap;

use crate::result::{CacheStats, ComputedMetricValue};

/// Builds the fingerprint of one metric under one filter state.
pub fn generate_cache_key(
    dashboard_id: &str,
    group_id: &str,
    metric_id: &str,
    filter_pairs: &[HierarchyFilterValue],
) -> String {
    let mut pairs: Vec<(&str, &str)> = filter_pairs
        .iter()
        .map(|p| (p.level.as_str(), p.value.as_str()))
        .collect();
    pairs.sort_unstable();

    let serialized = pairs
        .iter()
        .map(|(level, value)| format!("{}:{}", level, value))
        .collect::<Vec<_>>()
        .join("|");

    format!("{}:{}:{}:{}", dashboard_id, group_id, metric_id, serialized)
}

/// Key store behind the aggregator. Time is passed in as epoch milliseconds.
pub trait MetricCache {
    /// Returns a live entry; an entry whose expiry is in the past is treated
    /// as absent.
    fn get(&mut self, key: &str, now: i64) -> Option<ComputedMetricValue>;

    /// Stores a value that expires `ttl_ms` after `now`.
    fn set(&mut self, key: String, value: ComputedMetricValue, ttl_ms: u64, now: i64);

    /// Without a pattern clears everything; with one removes the keys that
    /// contain it. Returns the number of removed entries.
    fn invalidate(&mut self, pattern: Option<&str>) -> usize;

    fn stats(&self, now: i64) -> CacheStats;
}

#[derive(Debug, Clone, PartialEq)]
struct CacheEntry {
    value: ComputedMetricValue,
    expires_at: i64,
}

impl CacheEntry {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at < now
    }
}

/// Hash-map cache with lazy expiry on read.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: FxHashMap<String, CacheEntry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        InMemoryCache::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn sweep_expired(&mut self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        let removed = before - self.entries.len();
        if removed > 0 {
            log_debug!(CACHE, "swept {} expired entries", removed);
        }
        removed
    }
}

impl MetricCache for InMemoryCache {
    fn get(&mut self, key: &str, now: i64) -> Option<ComputedMetricValue> {
        let expired = self.entries.get(key)?.is_expired(now);
        if expired {
            self.entries.remove(key);
            log_debug!(CACHE, "expired {}", key);
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }

    fn set(&mut self, key: String, value: ComputedMetricValue, ttl_ms: u64, now: i64) {
        let ttl = i64::try_from(ttl_ms).unwrap_or(i64::MAX);
        self.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now.saturating_add(ttl),
            },
        );
    }

    fn invalidate(&mut self, pattern: Option<&str>) -> usize {
        let before = self.entries.len();
        match pattern {
            None => self.entries.clear(),
            Some(p) => self.entries.retain(|k, _| !k.contains(p)),
        }
        let removed = before - self.entries.len();
        log_debug!(CACHE, "invalidate pattern={:?} removed={}", pattern, removed);
        removed
    }

    fn stats(&self, now: i64) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            expired: self.entries.values().filter(|e| e.is_expired(now)).count(),
        }
    }
}

/// A cache that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl MetricCache for NoopCache {
    fn get(&mut self, _key: &str, _now: i64) -> Option<ComputedMetricValue> {
        None
    }

    fn set(&mut self, _key: String, _value: ComputedMetricValue, _ttl_ms: u64, _now: i64) {}

    fn invalidate(&mut self, _pattern: Option<&str>) -> usize {
        0
    }

    fn stats(&self, _now: i64) -> CacheStats {
        CacheStats::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(metric_id: &str, v: f64) -> ComputedMetricValue {
        ComputedMetricValue {
            metric_id: metric_id.into(),
            group_id: "g".into(),
            value: Some(v),
            formatted_value: v.to_string(),
            record_count: 1,
            computed_at: 0,
            error: None,
        }
    }

    #[test]
    fn key_ignores_pair_order() {
        let a = [
            HierarchyFilterValue::new("region", "North"),
            HierarchyFilterValue::new("city", "Oslo"),
        ];
        let b = [
            HierarchyFilterValue::new("city", "Oslo"),
            HierarchyFilterValue::new("region", "North"),
        ];

        let key = generate_cache_key("d", "g", "m", &a);
        assert_eq!(key, generate_cache_key("d", "g", "m", &b));
        assert_eq!(key, "d:g:m:city:Oslo|region:North");
        assert_eq!(generate_cache_key("d", "g", "m", &[]), "d:g:m:");
    }

    #[test]
    fn expired_entry_is_absent_and_evicted() {
        let mut cache = InMemoryCache::new();
        cache.set("k".into(), value("m", 1.0), 100, 1_000);

        assert_eq!(cache.get("k", 1_100).map(|v| v.value), Some(Some(1.0)));
        assert!(cache.get("k", 1_101).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_by_substring_or_everything() {
        let mut cache = InMemoryCache::new();
        cache.set("d1:g1:a:".into(), value("a", 1.0), 1_000, 0);
        cache.set("d1:g2:a:".into(), value("a", 2.0), 1_000, 0);
        cache.set("d2:g1:a:".into(), value("a", 3.0), 1_000, 0);

        assert_eq!(cache.invalidate(Some("d1:g1:")), 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.invalidate(None), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn stats_count_expired_without_evicting() {
        let mut cache = InMemoryCache::new();
        cache.set("a".into(), value("a", 1.0), 10, 0);
        cache.set("b".into(), value("b", 2.0), 1_000, 0);

        assert_eq!(cache.stats(500), CacheStats { size: 2, expired: 1 });
        assert_eq!(cache.sweep_expired(500), 1);
        assert_eq!(cache.stats(500), CacheStats { size: 1, expired: 0 });
    }

    #[test]
    fn noop_cache_never_hits() {
        let mut cache = NoopCache;
        cache.set("k".into(), value("m", 1.0), 1_000, 0);
        assert!(cache.get("k", 0).is_none());
        assert_eq!(cache.stats(0).size, 0);
    }
}
