use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::db::{StoreError, StorePool, SCHEMA_VERSION};

/// The payload of a completed lookup. A lookup that ran to completion but
/// found nothing is stored with all value fields `None` (and confidence 0) so
/// reruns do not spend budget repeating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheValue {
    pub uom: Option<String>,
    pub pack_quantity: Option<u32>,
    pub supplier: Option<String>,
    /// Evidence notes recorded at resolution time (source URLs, quotes).
    pub notes: Vec<String>,
}

impl CacheValue {
    pub fn empty() -> Self {
        Self { uom: None, pack_quantity: None, supplier: None, notes: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.uom.is_none() && self.pack_quantity.is_none() && self.supplier.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub query_key: String,
    pub value: CacheValue,
    pub confidence: f32,
    pub obtained_at: DateTime<Utc>,
    pub ttl: Duration,
    pub schema_version: i64,
}

impl CacheEntry {
    /// Expired or written under a stale schema — treated as absent on read.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        if self.schema_version != SCHEMA_VERSION {
            return true;
        }
        let age = now.signed_duration_since(self.obtained_at);
        age.num_seconds() > self.ttl.as_secs() as i64
    }
}

/// Durable, process-shared cache of lookup results, keyed by canonical query
/// key. Writes are last-write-wins; entries are replaced, never mutated.
#[derive(Clone)]
pub struct LookupCache {
    pool: StorePool,
}

impl LookupCache {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, query_key: &str) -> Result<Option<CacheEntry>, StoreError> {
        self.get_at(query_key, Utc::now()).await
    }

    pub async fn put(
        &self,
        query_key: &str,
        field_kind: &str,
        value: &CacheValue,
        confidence: f32,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.put_at(query_key, field_kind, value, confidence, ttl, Utc::now())
            .await
    }

    /// Clock-injected variant of [`get`]; stale entries read as `None` but are
    /// not deleted eagerly.
    pub async fn get_at(
        &self,
        query_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>, StoreError> {
        let row: Option<(String, f64, i64, i64, i64)> = sqlx::query_as(
            "SELECT value, confidence, obtained_at, ttl_secs, schema_version \
             FROM lookup_cache WHERE query_key = ?",
        )
        .bind(query_key)
        .fetch_optional(&self.pool)
        .await?;

        let Some((value_json, confidence, obtained_at, ttl_secs, schema_version)) = row else {
            return Ok(None);
        };

        let entry = CacheEntry {
            query_key: query_key.to_string(),
            value: serde_json::from_str(&value_json)?,
            confidence: confidence as f32,
            obtained_at: Utc
                .timestamp_opt(obtained_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
            ttl: Duration::from_secs(ttl_secs.max(0) as u64),
            schema_version,
        };

        if entry.is_stale(now) {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    pub async fn put_at(
        &self,
        query_key: &str,
        field_kind: &str,
        value: &CacheValue,
        confidence: f32,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let value_json = serde_json::to_string(value)?;
        sqlx::query(
            "INSERT OR REPLACE INTO lookup_cache \
             (query_key, field_kind, value, confidence, obtained_at, ttl_secs, schema_version) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(query_key)
        .bind(field_kind)
        .bind(value_json)
        .bind(confidence as f64)
        .bind(now.timestamp())
        .bind(ttl.as_secs() as i64)
        .bind(SCHEMA_VERSION)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_store_in_memory;
    use chrono::Duration as ChronoDuration;

    fn sample_value() -> CacheValue {
        CacheValue {
            uom: Some("CS".into()),
            pack_quantity: Some(12),
            supplier: None,
            notes: vec!["https://example.com/item".into()],
        }
    }

    #[tokio::test]
    async fn put_then_get_returns_value_before_expiry() {
        let pool = open_store_in_memory().await.unwrap();
        let cache = LookupCache::new(pool);

        cache
            .put("uom:widget 12pk", "uom", &sample_value(), 0.8, Duration::from_secs(3600))
            .await
            .unwrap();

        let entry = cache.get("uom:widget 12pk").await.unwrap().unwrap();
        assert_eq!(entry.value, sample_value());
        assert!((entry.confidence - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent() {
        let pool = open_store_in_memory().await.unwrap();
        let cache = LookupCache::new(pool);
        let now = Utc::now();

        cache
            .put_at("uom:old", "uom", &sample_value(), 0.8, Duration::from_secs(60), now)
            .await
            .unwrap();

        let later = now + ChronoDuration::seconds(61);
        assert!(cache.get_at("uom:old", later).await.unwrap().is_none());
        // Just inside the TTL it is still present.
        let within = now + ChronoDuration::seconds(59);
        assert!(cache.get_at("uom:old", within).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn put_replaces_existing_entry() {
        let pool = open_store_in_memory().await.unwrap();
        let cache = LookupCache::new(pool);

        cache
            .put("uom:k", "uom", &sample_value(), 0.5, Duration::from_secs(3600))
            .await
            .unwrap();
        let mut replacement = sample_value();
        replacement.pack_quantity = Some(24);
        cache
            .put("uom:k", "uom", &replacement, 0.9, Duration::from_secs(3600))
            .await
            .unwrap();

        let entry = cache.get("uom:k").await.unwrap().unwrap();
        assert_eq!(entry.value.pack_quantity, Some(24));
        assert!((entry.confidence - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let pool = open_store_in_memory().await.unwrap();
        let cache = LookupCache::new(pool);
        assert!(cache.get("uom:nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_value_roundtrips() {
        let pool = open_store_in_memory().await.unwrap();
        let cache = LookupCache::new(pool);
        cache
            .put("uom:nothing found", "uom", &CacheValue::empty(), 0.0, Duration::from_secs(3600))
            .await
            .unwrap();
        let entry = cache.get("uom:nothing found").await.unwrap().unwrap();
        assert!(entry.value.is_empty());
        assert_eq!(entry.confidence, 0.0);
    }
}
