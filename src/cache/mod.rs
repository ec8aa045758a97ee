//! Caching module for Diligence-RS
//!
//! Caches collaborator results keyed by (collaborator, normalized query).
//! Entries carry their fetch time and TTL; an expired entry is a miss.

use crate::matcher::normalize_entity;
use crate::query::Query;
use crate::records::CollaboratorRecord;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cache key: collaborator plus normalized query key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub collaborator: String,
    pub query_key: String,
}

impl CacheKey {
    pub fn new(collaborator: impl Into<String>, query_key: impl Into<String>) -> Self {
        Self {
            collaborator: collaborator.into(),
            query_key: query_key.into(),
        }
    }
}

/// A cached result set
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub records: Arc<Vec<CollaboratorRecord>>,
    pub fetched_at: DateTime<Utc>,
    stored: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn new(records: Vec<CollaboratorRecord>, ttl: Duration) -> Self {
        Self {
            records: Arc::new(records),
            fetched_at: Utc::now(),
            stored: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.stored.elapsed() >= self.ttl
    }
}

/// Expires each entry after its own TTL
struct EntryExpiry;

impl Expiry<CacheKey, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Cache for collaborator results
pub struct ResultCache {
    cache: Cache<CacheKey, CacheEntry>,
}

impl ResultCache {
    /// Create a new result cache bounded to `max_entries`, evicting least recently used
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(EntryExpiry)
            .build();

        Self { cache }
    }

    /// Get a cached result; expired entries are removed and reported as a miss
    pub async fn get(&self, collaborator: &str, query_key: &str) -> Option<CacheEntry> {
        let key = CacheKey::new(collaborator, query_key);
        let entry = self.cache.get(&key).await?;
        if entry.is_expired() {
            self.cache.invalidate(&key).await;
            return None;
        }
        Some(entry)
    }

    /// Store a complete result set with the collaborator's TTL
    pub async fn put(
        &self,
        collaborator: &str,
        query_key: &str,
        records: Vec<CollaboratorRecord>,
        ttl: Duration,
    ) {
        if ttl.is_zero() {
            return;
        }
        self.cache
            .insert(CacheKey::new(collaborator, query_key), CacheEntry::new(records, ttl))
            .await;
    }

    /// Remove a cached result
    pub async fn remove(&self, collaborator: &str, query_key: &str) {
        self.cache
            .invalidate(&CacheKey::new(collaborator, query_key))
            .await;
    }

    /// Clear the entire cache
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Get cache size
    pub fn size(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Apply pending evictions; mostly useful before reading `size`
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

/// Generate the normalized cache key for a query
///
/// Built from the normalized entity core name and everything else that changes
/// what a collaborator returns. The date window enters at day granularity, so
/// queries on the same day share results while other reference dates do not.
pub fn query_cache_key(query: &Query) -> String {
    use sha2::{Digest, Sha256};

    let entity = normalize_entity(&query.entity_name);

    let mut hasher = Sha256::new();
    hasher.update(entity.core.as_bytes());
    hasher.update(b"|");
    hasher.update(entity.legal_form.as_deref().unwrap_or_default().as_bytes());
    hasher.update(b"|");
    if let Some(ref contact) = query.contact_person {
        hasher.update(contact.to_lowercase().as_bytes());
    }
    hasher.update(b"|");
    hasher.update(query.registry_id.as_deref().unwrap_or_default().as_bytes());
    hasher.update(b"|");
    for trade in &query.trade_names {
        hasher.update(normalize_entity(trade).core.as_bytes());
        hasher.update(b",");
    }
    hasher.update(b"|");
    hasher.update(query.website.as_deref().unwrap_or_default().as_bytes());
    hasher.update(b"|");
    hasher.update(query.lookback.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(query.depth.as_str().as_bytes());
    hasher.update(b"|");
    let range = query.date_range();
    if let Some(from) = range.from {
        hasher.update(from.date_naive().to_string().as_bytes());
    }
    hasher.update(b"..");
    hasher.update(range.to.date_naive().to_string().as_bytes());

    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::SourceCategory;

    fn records() -> Vec<CollaboratorRecord> {
        vec![
            CollaboratorRecord::new("news", SourceCategory::News, "first"),
            CollaboratorRecord::new("news", SourceCategory::News, "second"),
        ]
    }

    #[tokio::test]
    async fn test_put_then_get_returns_same_records() {
        let cache = ResultCache::new(100);
        let stored = records();
        cache.put("news", "k", stored.clone(), Duration::from_secs(60)).await;

        let entry = cache.get("news", "k").await.unwrap();
        assert_eq!(*entry.records, stored);
        assert!(cache.get("legal", "k").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = ResultCache::new(100);
        cache.put("news", "k", records(), Duration::from_millis(50)).await;
        assert!(cache.get("news", "k").await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get("news", "k").await.is_none());
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        let cache = ResultCache::new(10);
        for i in 0..50 {
            cache
                .put("news", &format!("k{}", i), records(), Duration::from_secs(60))
                .await;
        }
        cache.sync().await;
        assert!(cache.size() <= 10);
    }

    #[test]
    fn test_query_key_ignores_legal_form_spelling() {
        let a = Query::new("Acme B.V.");
        let b = Query::new("ACME  BV");
        let c = Query::new("Acme N.V.");
        assert_eq!(query_cache_key(&a), query_cache_key(&b));
        assert_ne!(query_cache_key(&a), query_cache_key(&c));
    }

    #[test]
    fn test_query_key_follows_date_window() {
        use chrono::{TimeZone, Utc};

        let morning = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2020, 1, 1, 8, 0, 0).unwrap();

        let key = |as_of| query_cache_key(&Query::new("Acme B.V.").as_of(as_of));
        assert_eq!(key(morning), key(evening));
        assert_ne!(key(morning), key(earlier));
    }
}
