//! Bounded pool of consumer sessions keyed by `(group, instance)`.

use crate::broker::ConsumerFactory;
use crate::config::{ConsumerInstanceConfig, ConsumerSessionConfig};
use crate::convert::RecordConverter;
use crate::session::{ConsumerSession, SessionKey};
use kafka_rest_codec::SchemaCodec;
use kafka_rest_schema_registry::SchemaManager;
use kafka_rest_types::{BrokerSettings, Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of live sessions; creation fails beyond it
    pub capacity: usize,
    /// Idle time after which a session expires
    pub session_ttl: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 25,
            session_ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// Live consumer sessions.
///
/// The map lock is held only to insert, look up or remove entries; it is
/// independent of every session's own lock. A full pool never evicts: new
/// sessions are refused until one is deleted or expires.
pub struct ConsumerPool {
    sessions: Mutex<HashMap<SessionKey, Arc<ConsumerSession>>>,
    factory: Arc<dyn ConsumerFactory>,
    broker: BrokerSettings,
    codec: SchemaCodec,
    schemas: SchemaManager,
    config: PoolConfig,
}

impl ConsumerPool {
    pub fn new(
        factory: Arc<dyn ConsumerFactory>,
        broker: BrokerSettings,
        codec: SchemaCodec,
        schemas: SchemaManager,
        config: PoolConfig,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            factory,
            broker,
            codec,
            schemas,
            config,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionKey, Arc<ConsumerSession>>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_room(
        &self,
        sessions: &HashMap<SessionKey, Arc<ConsumerSession>>,
        key: &SessionKey,
    ) -> Result<()> {
        if sessions.len() >= self.config.capacity {
            return Err(Error::PoolFull(self.config.capacity));
        }
        if sessions.contains_key(key) {
            return Err(Error::ConsumerAlreadyExists {
                group: key.group.clone(),
                instance: key.instance.clone(),
            });
        }
        Ok(())
    }

    /// Create a session in `group` and return its instance name.
    pub async fn create(&self, group: &str, request: &ConsumerInstanceConfig) -> Result<String> {
        let instance = request.instance_name();
        let key = SessionKey::new(group, instance.clone());

        self.check_room(&self.sessions(), &key)?;

        let client_config = request.client_config(&self.broker, group, &instance);
        let client = self.factory.create(&client_config)?;
        let config = ConsumerSessionConfig::resolve(request.format, &client_config);
        let converter = RecordConverter::new(request.format, &self.codec, &self.schemas);
        let session = Arc::new(ConsumerSession::new(
            key.clone(),
            config,
            converter,
            client,
            self.config.session_ttl,
        ));

        let inserted = {
            let mut sessions = self.sessions();
            self.check_room(&sessions, &key).map(|()| {
                sessions.insert(key.clone(), session.clone());
                sessions.len()
            })
        };
        match inserted {
            Ok(len) => {
                info!(
                    "Added consumer {} ({}) to pool, {len}/{} in use",
                    key,
                    request.format,
                    self.config.capacity
                );
                Ok(instance)
            }
            Err(e) => {
                // lost a race for the same key or the last slot
                session.close().await;
                Err(e)
            }
        }
    }

    /// Look up a session and refresh its expiration.
    pub fn get(&self, key: &SessionKey) -> Result<Arc<ConsumerSession>> {
        let session = self
            .sessions()
            .get(key)
            .cloned()
            .ok_or_else(|| key.not_found())?;
        session.touch();
        Ok(session)
    }

    /// Take a session out of the pool. Its expiration is refreshed so the
    /// caller holds a live session until it is closed.
    pub fn remove(&self, key: &SessionKey) -> Result<Arc<ConsumerSession>> {
        let session = self.sessions().remove(key).ok_or_else(|| key.not_found())?;
        session.touch();
        info!("Removed consumer {} from pool", key);
        Ok(session)
    }

    /// Remove a session and close its broker consumer.
    pub async fn delete(&self, key: &SessionKey) -> Result<()> {
        let session = self.remove(key)?;
        session.close().await;
        Ok(())
    }

    /// Take every session whose expiration is at or before `now` out of the pool.
    pub fn remove_expired(&self, now: Instant) -> Vec<Arc<ConsumerSession>> {
        let mut sessions = self.sessions();
        let expired: Vec<SessionKey> = sessions
            .iter()
            .filter(|(_, session)| session.expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|key| {
                warn!("Consumer {} expired", key);
                sessions.remove(&key)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Close every session. Used on process exit.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<ConsumerSession>> =
            self.sessions().drain().map(|(_, session)| session).collect();
        info!("Closing {} consumer sessions", sessions.len());
        for session in sessions {
            session.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{unused_schemas, FakeConsumerFactory};
    use kafka_rest_types::EmbeddedFormat;

    fn pool(factory: &FakeConsumerFactory, config: PoolConfig) -> ConsumerPool {
        ConsumerPool::new(
            Arc::new(factory.clone()),
            BrokerSettings::new("localhost:9092"),
            SchemaCodec::default(),
            unused_schemas(),
            config,
        )
    }

    fn named(name: &str) -> ConsumerInstanceConfig {
        ConsumerInstanceConfig {
            name: Some(name.to_string()),
            ..ConsumerInstanceConfig::new(EmbeddedFormat::Json)
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let factory = FakeConsumerFactory::default();
        let pool = pool(&factory, PoolConfig::default());

        let instance = pool.create("g1", &named("c1")).await.unwrap();
        assert_eq!(instance, "c1");
        assert_eq!(factory.consumer.client_ids(), vec!["c1"]);

        let session = pool.get(&SessionKey::new("g1", "c1")).unwrap();
        assert_eq!(session.format(), EmbeddedFormat::Json);
        assert!(session.expires_at() > Instant::now());
        assert!(session.expires_at() <= Instant::now() + Duration::from_secs(5 * 60));
    }

    #[tokio::test]
    async fn test_generated_instance_names_are_unique() {
        let factory = FakeConsumerFactory::default();
        let pool = pool(&factory, PoolConfig::default());
        let config = ConsumerInstanceConfig::new(EmbeddedFormat::Binary);

        let a = pool.create("g1", &config).await.unwrap();
        let b = pool.create("g1", &config).await.unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("kafka-rest-consumer-"));
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_key_is_rejected() {
        let factory = FakeConsumerFactory::default();
        let pool = pool(&factory, PoolConfig::default());

        pool.create("g1", &named("c1")).await.unwrap();
        let err = pool.create("g1", &named("c1")).await.unwrap_err();
        assert_eq!(err.code(), 40901);

        // same instance name in another group is a different key
        pool.create("g2", &named("c1")).await.unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn test_capacity_without_eviction() {
        let factory = FakeConsumerFactory::default();
        let pool = pool(
            &factory,
            PoolConfig {
                capacity: 2,
                ..PoolConfig::default()
            },
        );

        pool.create("g", &named("a")).await.unwrap();
        pool.create("g", &named("b")).await.unwrap();
        let err = pool.create("g", &named("c")).await.unwrap_err();
        assert_eq!(err.code(), 3001);
        assert!(pool.get(&SessionKey::new("g", "a")).is_ok());
        assert!(pool.get(&SessionKey::new("g", "b")).is_ok());

        pool.delete(&SessionKey::new("g", "a")).await.unwrap();
        pool.create("g", &named("c")).await.unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(factory.consumer.close_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_session() {
        let factory = FakeConsumerFactory::default();
        let pool = pool(&factory, PoolConfig::default());
        let key = SessionKey::new("g", "nope");

        assert_eq!(pool.get(&key).unwrap_err().code(), 40402);
        assert_eq!(pool.remove(&key).unwrap_err().code(), 40402);
        assert_eq!(pool.delete(&key).await.unwrap_err().code(), 40402);
    }

    #[tokio::test]
    async fn test_remove_refreshes_expiration() {
        let factory = FakeConsumerFactory::default();
        let pool = pool(
            &factory,
            PoolConfig {
                session_ttl: Duration::from_millis(50),
                ..PoolConfig::default()
            },
        );
        pool.create("g", &named("a")).await.unwrap();
        let key = SessionKey::new("g", "a");
        let before = pool.get(&key).unwrap().expires_at();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let session = pool.remove(&key).unwrap();
        assert!(session.expires_at() > before);
        assert!(!session.expired(Instant::now()));
        assert!(format!("{session:?}").contains("ConsumerSession"));
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_remove_expired() {
        let factory = FakeConsumerFactory::default();
        let pool = pool(
            &factory,
            PoolConfig {
                session_ttl: Duration::from_millis(50),
                ..PoolConfig::default()
            },
        );
        pool.create("g", &named("old")).await.unwrap();

        assert!(pool.remove_expired(Instant::now()).is_empty());
        let expired = pool.remove_expired(Instant::now() + Duration::from_millis(100));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].key(), &SessionKey::new("g", "old"));
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let factory = FakeConsumerFactory::default();
        let pool = pool(&factory, PoolConfig::default());
        pool.create("g", &named("a")).await.unwrap();
        pool.create("g", &named("b")).await.unwrap();

        pool.shutdown().await;
        assert!(pool.is_empty());
        assert_eq!(factory.consumer.close_count(), 2);
    }
}
