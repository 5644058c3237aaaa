//! Positive and negative schema caches.
//!
//! Positive entries map between ids, raw schema text and versions within one
//! subject. Negative entries remember a recent "not found" answer so repeated
//! lookups for an unknown id or schema do not hit the registry. Storing a
//! positive entry always drops the negative entry for the same key.

use moka::future::Cache;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub positive_ttl: Duration,
    pub negative_ttl: Duration,
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            positive_ttl: Duration::from_secs(24 * 60 * 60),
            negative_ttl: Duration::from_secs(60),
            max_entries: 10_000,
        }
    }
}

type IdKey = (String, i32);
type SchemaKey = (String, String);

#[derive(Clone)]
pub struct SchemaCaches {
    id_to_schema: Cache<IdKey, String>,
    schema_to_id: Cache<SchemaKey, i32>,
    schema_to_version: Cache<SchemaKey, i32>,
    missing_id: Cache<IdKey, Instant>,
    missing_schema: Cache<SchemaKey, Instant>,
}

fn build<K, V>(ttl: Duration, max_entries: u64) -> Cache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    Cache::builder()
        .max_capacity(max_entries)
        .time_to_live(ttl)
        .build()
}

impl SchemaCaches {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            id_to_schema: build(config.positive_ttl, config.max_entries),
            schema_to_id: build(config.positive_ttl, config.max_entries),
            schema_to_version: build(config.positive_ttl, config.max_entries),
            missing_id: build(config.negative_ttl, config.max_entries),
            missing_schema: build(config.negative_ttl, config.max_entries),
        }
    }

    pub async fn schema_by_id(&self, subject: &str, id: i32) -> Option<String> {
        self.id_to_schema.get(&(subject.to_string(), id)).await
    }

    pub async fn id_by_schema(&self, subject: &str, schema: &str) -> Option<i32> {
        self.schema_to_id
            .get(&(subject.to_string(), schema.to_string()))
            .await
    }

    pub async fn version_by_schema(&self, subject: &str, schema: &str) -> Option<i32> {
        self.schema_to_version
            .get(&(subject.to_string(), schema.to_string()))
            .await
    }

    pub async fn is_missing_id(&self, subject: &str, id: i32) -> bool {
        self.missing_id.contains_key(&(subject.to_string(), id))
    }

    pub async fn is_missing_schema(&self, subject: &str, schema: &str) -> bool {
        self.missing_schema
            .contains_key(&(subject.to_string(), schema.to_string()))
    }

    pub async fn mark_missing_id(&self, subject: &str, id: i32) {
        self.missing_id
            .insert((subject.to_string(), id), Instant::now())
            .await;
    }

    pub async fn mark_missing_schema(&self, subject: &str, schema: &str) {
        self.missing_schema
            .insert((subject.to_string(), schema.to_string()), Instant::now())
            .await;
    }

    /// Record that `schema` is registered under `subject` with `id` (and
    /// `version`, when known), indexing it every way it can be looked up.
    pub async fn store(&self, subject: &str, id: i32, schema: &str, version: Option<i32>) {
        let id_key = (subject.to_string(), id);
        let schema_key = (subject.to_string(), schema.to_string());

        self.missing_id.invalidate(&id_key).await;
        self.missing_schema.invalidate(&schema_key).await;

        self.id_to_schema.insert(id_key, schema.to_string()).await;
        if let Some(version) = version {
            self.schema_to_version
                .insert(schema_key.clone(), version)
                .await;
        }
        self.schema_to_id.insert(schema_key, id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_indexes_every_direction() {
        let caches = SchemaCaches::new(&CacheConfig::default());
        caches.store("t-value", 4, "\"long\"", Some(2)).await;

        assert_eq!(
            caches.schema_by_id("t-value", 4).await.as_deref(),
            Some("\"long\"")
        );
        assert_eq!(caches.id_by_schema("t-value", "\"long\"").await, Some(4));
        assert_eq!(
            caches.version_by_schema("t-value", "\"long\"").await,
            Some(2)
        );
        assert_eq!(caches.schema_by_id("t-key", 4).await, None);
    }

    #[tokio::test]
    async fn test_store_clears_negative_entries() {
        let caches = SchemaCaches::new(&CacheConfig::default());
        caches.mark_missing_id("t-value", 4).await;
        caches.mark_missing_schema("t-value", "\"long\"").await;
        assert!(caches.is_missing_id("t-value", 4).await);
        assert!(caches.is_missing_schema("t-value", "\"long\"").await);

        caches.store("t-value", 4, "\"long\"", None).await;
        assert!(!caches.is_missing_id("t-value", 4).await);
        assert!(!caches.is_missing_schema("t-value", "\"long\"").await);
        assert_eq!(caches.version_by_schema("t-value", "\"long\"").await, None);
    }

    #[tokio::test]
    async fn test_negative_entries_expire() {
        let caches = SchemaCaches::new(&CacheConfig {
            negative_ttl: Duration::from_millis(50),
            ..CacheConfig::default()
        });
        caches.mark_missing_id("t-value", 9).await;
        assert!(caches.is_missing_id("t-value", 9).await);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!caches.is_missing_id("t-value", 9).await);
    }
}
