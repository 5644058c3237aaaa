//! Cached registry access and schema resolution for produce/consume calls.

use crate::cache::{CacheConfig, SchemaCaches};
use crate::client::SchemaRegistryClient;
use kafka_rest_types::{subject_name, EmbeddedFormat, Error, RegisteredSchema, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Registry client fronted by [`SchemaCaches`].
///
/// Every operation follows the same pattern under the subject's lock: a
/// recent negative answer fails fast, a positive cache hit returns without a
/// call, otherwise the registry is asked and its answer is indexed every way
/// it can later be looked up. A "not found" answer (HTTP 404) is remembered
/// in the negative cache.
pub struct CachedSchemaManager {
    client: SchemaRegistryClient,
    caches: SchemaCaches,
    subject_locks: SubjectLocks,
}

type SubjectLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

struct SubjectGuard<'a> {
    locks: &'a SubjectLocks,
    subject: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for SubjectGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // New handles are only cloned under this mutex: two remaining
        // references are the map's and ours.
        let idle = locks
            .get(&self.subject)
            .is_some_and(|entry| Arc::ptr_eq(entry, &self.lock))
            && Arc::strong_count(&self.lock) == 2;
        if idle {
            locks.remove(&self.subject);
        }
    }
}

impl CachedSchemaManager {
    pub fn new(client: SchemaRegistryClient, config: &CacheConfig) -> Self {
        Self {
            client,
            caches: SchemaCaches::new(config),
            subject_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Serialize registry work per subject. The map entry is dropped again
    /// once no caller holds or waits on it.
    async fn subject_lock(&self, subject: &str) -> SubjectGuard<'_> {
        let lock = {
            let mut locks = self
                .subject_locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks
                .entry(subject.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let guard = lock.clone().lock_owned().await;
        SubjectGuard {
            locks: &self.subject_locks,
            subject: subject.to_string(),
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn subject_lock_count(&self) -> usize {
        self.subject_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub async fn get_raw_schema_by_id(&self, subject: &str, schema_id: i32) -> Result<String> {
        let _guard = self.subject_lock(subject).await;

        if self.caches.is_missing_id(subject, schema_id).await {
            return Err(Error::SchemaNotFound(format!(
                "Schema id: {schema_id} not found"
            )));
        }
        if let Some(schema) = self.caches.schema_by_id(subject, schema_id).await {
            return Ok(schema);
        }

        debug!("Fetching schema id {schema_id} for subject {subject}");
        match self.client.get_raw_schema_by_id(schema_id).await {
            Ok(schema) => {
                self.caches.store(subject, schema_id, &schema, None).await;
                Ok(schema)
            }
            Err(e) => {
                if e.is_not_found() {
                    self.caches.mark_missing_id(subject, schema_id).await;
                }
                Err(e)
            }
        }
    }

    pub async fn get_id_by_raw_schema(
        &self,
        format: EmbeddedFormat,
        subject: &str,
        schema: &str,
    ) -> Result<i32> {
        let _guard = self.subject_lock(subject).await;

        if let Some(id) = self.caches.id_by_schema(subject, schema).await {
            return Ok(id);
        }
        let found = self.lookup(format, subject, schema).await?;
        Ok(found.schema_id)
    }

    pub async fn get_version_by_raw_schema(
        &self,
        format: EmbeddedFormat,
        subject: &str,
        schema: &str,
    ) -> Result<i32> {
        let _guard = self.subject_lock(subject).await;

        if let Some(version) = self.caches.version_by_schema(subject, schema).await {
            return Ok(version);
        }
        let found = self.lookup(format, subject, schema).await?;
        Ok(found.schema_version)
    }

    /// Register `schema` under `subject` (a no-op on the registry side when it
    /// already exists) and return its id.
    pub async fn register_and_get_id(
        &self,
        format: EmbeddedFormat,
        subject: &str,
        schema: &str,
    ) -> Result<i32> {
        let _guard = self.subject_lock(subject).await;

        if let Some(id) = self.caches.id_by_schema(subject, schema).await {
            return Ok(id);
        }

        let response = self
            .client
            .register_schema(subject, format.schema_type(), schema)
            .await?;
        let Some(id) = response.id else {
            return Err(Error::RegistryInternal(format!(
                "Registry returned no id registering {subject}"
            )));
        };
        info!("Registered schema id {id} under subject {subject}");
        self.caches.store(subject, id, schema, response.version).await;

        // Confluent registries answer a register with the id only
        if response.version.is_none() {
            if let Err(e) = self.lookup(format, subject, schema).await {
                warn!("No version for schema id {id} under subject {subject}: {e}");
            }
        }
        Ok(id)
    }

    /// The subject's latest schema. Always asks the registry.
    pub async fn get_latest_schema(
        &self,
        format: EmbeddedFormat,
        subject: &str,
    ) -> Result<RegisteredSchema> {
        let _guard = self.subject_lock(subject).await;

        let response = self.client.latest_schema(subject).await?;
        let (Some(schema_id), Some(schema_version), Some(schema)) =
            (response.id, response.version, response.schema)
        else {
            return Err(Error::RegistryInternal(format!(
                "Incomplete latest schema response for subject {subject}"
            )));
        };

        self.caches
            .store(subject, schema_id, &schema, Some(schema_version))
            .await;
        Ok(RegisteredSchema {
            subject: subject.to_string(),
            schema_id,
            schema_version,
            schema,
            schema_type: response
                .schema_type
                .unwrap_or_else(|| format.schema_type()),
        })
    }

    /// Lookup by raw schema text. Caller holds the subject lock.
    async fn lookup(
        &self,
        format: EmbeddedFormat,
        subject: &str,
        schema: &str,
    ) -> Result<RegisteredSchema> {
        if self.caches.is_missing_schema(subject, schema).await {
            return Err(Error::SchemaNotFound(format!(
                "Schema not found under subject {subject}"
            )));
        }

        debug!("Looking up schema under subject {subject}");
        let response = match self
            .client
            .lookup_schema(subject, format.schema_type(), schema)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if e.is_not_found() {
                    self.caches.mark_missing_schema(subject, schema).await;
                }
                return Err(e);
            }
        };

        let (Some(schema_id), Some(schema_version)) = (response.id, response.version) else {
            return Err(Error::RegistryInternal(format!(
                "Incomplete lookup response for subject {subject}"
            )));
        };
        self.caches
            .store(subject, schema_id, schema, Some(schema_version))
            .await;

        Ok(RegisteredSchema {
            subject: subject.to_string(),
            schema_id,
            schema_version,
            schema: schema.to_string(),
            schema_type: format.schema_type(),
        })
    }
}

/// Resolves the schema a produce or consume call should use for a topic's
/// key or value.
#[derive(Clone)]
pub struct SchemaManager {
    cache: Arc<CachedSchemaManager>,
}

impl SchemaManager {
    pub fn new(cache: Arc<CachedSchemaManager>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &CachedSchemaManager {
        &self.cache
    }

    /// - with `schema_id`: the schema registered under that id;
    /// - with `raw_schema`: its id, registering it if the subject does not
    ///   have it yet;
    /// - with neither: the subject's latest schema.
    pub async fn get_schema(
        &self,
        topic: &str,
        format: EmbeddedFormat,
        schema_id: Option<i32>,
        raw_schema: Option<&str>,
        is_key: bool,
    ) -> Result<RegisteredSchema> {
        let subject = subject_name(topic, is_key);

        if let Some(schema_id) = schema_id {
            let schema = self.cache.get_raw_schema_by_id(&subject, schema_id).await?;
            let schema_version = self
                .cache
                .get_version_by_raw_schema(format, &subject, &schema)
                .await?;
            return Ok(RegisteredSchema {
                subject,
                schema_id,
                schema_version,
                schema,
                schema_type: format.schema_type(),
            });
        }

        if let Some(raw_schema) = raw_schema {
            let schema_id = match self
                .cache
                .get_id_by_raw_schema(format, &subject, raw_schema)
                .await
            {
                Ok(id) => id,
                Err(e) if e.is_not_found() => {
                    self.cache
                        .register_and_get_id(format, &subject, raw_schema)
                        .await?
                }
                Err(e) => return Err(e),
            };
            let schema_version = self
                .cache
                .get_version_by_raw_schema(format, &subject, raw_schema)
                .await?;
            return Ok(RegisteredSchema {
                subject,
                schema_id,
                schema_version,
                schema: raw_schema.to_string(),
                schema_type: format.schema_type(),
            });
        }

        self.cache.get_latest_schema(format, &subject).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RegistryConfig;
    use std::time::Duration;

    fn unreachable_manager() -> Arc<CachedSchemaManager> {
        let mut config = RegistryConfig::new("http://127.0.0.1:9");
        config.request_timeout = Duration::from_secs(2);
        let client = SchemaRegistryClient::new(&config).unwrap();
        Arc::new(CachedSchemaManager::new(client, &CacheConfig::default()))
    }

    #[tokio::test]
    async fn test_subject_locks_are_released() {
        let cache = unreachable_manager();

        let calls = (0..32).map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move {
                let subject = format!("topic-{}-value", i % 4);
                cache.get_raw_schema_by_id(&subject, i).await
            })
        });
        for result in futures::future::join_all(calls).await {
            assert!(result.unwrap().is_err());
        }

        assert_eq!(cache.subject_lock_count(), 0);
    }

    #[tokio::test]
    async fn test_subject_lock_held_while_in_use() {
        let cache = unreachable_manager();

        let guard = cache.subject_lock("orders-value").await;
        assert_eq!(cache.subject_lock_count(), 1);
        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move {
                let _guard = cache.subject_lock("orders-value").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert_eq!(cache.subject_lock_count(), 1);

        waiter.await.unwrap();
        assert_eq!(cache.subject_lock_count(), 0);
    }
}
