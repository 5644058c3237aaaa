use async_trait::async_trait;
use kafka_rest_types::{BrokerSettings, Error, Result};
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub const CLIENT_ID_PREFIX: &str = "kafka-rest-producer-";

/// How long a send may wait for room in the local queue.
const QUEUE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Bounded wait for outstanding sends in [`ProducerSession::stop`]
    pub drain_timeout: Duration,
    /// Pause applied before and after rebuilding a missing client
    pub restart_cooldown: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
            restart_cooldown: Duration::from_secs(10),
        }
    }
}

/// One record to send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProduceRecord {
    pub topic: String,
    pub partition: Option<i32>,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    /// Milliseconds since the epoch
    pub timestamp: Option<i64>,
}

impl ProduceRecord {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn partition(mut self, partition: Option<i32>) -> Self {
        self.partition = partition;
        self
    }

    pub fn key(mut self, key: impl Into<Option<Vec<u8>>>) -> Self {
        self.key = key.into();
        self
    }

    pub fn value(mut self, value: impl Into<Option<Vec<u8>>>) -> Self {
        self.value = value.into();
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Broker acknowledgment of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProduceResult {
    pub partition: i32,
    pub offset: i64,
}

#[async_trait]
pub trait RecordProducer: Send + Sync {
    async fn produce(&self, record: ProduceRecord) -> Result<ProduceResult>;
}

/// The shared broker producer.
///
/// The client slot is empty after [`stop`](Self::stop) or a fatal send
/// error; the next produce call rebuilds it. Rebuilds are serialized, so
/// concurrent callers never create two replacement clients.
pub struct ProducerSession {
    settings: ClientConfig,
    config: ProducerConfig,
    client: RwLock<Option<FutureProducer>>,
    rebuild: Mutex<()>,
}

impl ProducerSession {
    pub fn new(broker: BrokerSettings, config: ProducerConfig) -> Result<Self> {
        let settings = producer_config(&broker);
        let client = create_client(&settings)?;
        Ok(Self {
            settings,
            config,
            client: RwLock::new(Some(client)),
            rebuild: Mutex::new(()),
        })
    }

    fn slot(&self) -> RwLockReadGuard<'_, Option<FutureProducer>> {
        self.client
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn slot_mut(&self) -> RwLockWriteGuard<'_, Option<FutureProducer>> {
        self.client
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.slot().is_some()
    }

    /// The live client, rebuilt first when the slot is empty.
    async fn client(&self) -> Result<FutureProducer> {
        let current = self.slot().clone();
        if let Some(client) = current {
            return Ok(client);
        }

        let _rebuild = self.rebuild.lock().await;
        let current = self.slot().clone();
        if let Some(client) = current {
            return Ok(client);
        }

        warn!("Producer client is missing, restarting");
        tokio::time::sleep(self.config.restart_cooldown).await;
        let client = create_client(&self.settings)?;
        tokio::time::sleep(self.config.restart_cooldown).await;
        *self.slot_mut() = Some(client.clone());
        info!("Producer client restarted");
        Ok(client)
    }

    /// Drain outstanding sends for up to the drain timeout, then drop the client.
    pub async fn stop(&self) {
        let Some(client) = self.slot_mut().take() else {
            return;
        };
        let drain_timeout = self.config.drain_timeout;
        let flushed = tokio::task::spawn_blocking(move || {
            let outcome = client.flush(Timeout::After(drain_timeout));
            drop(client);
            outcome
        })
        .await;
        match flushed {
            Ok(Ok(())) => info!("Producer stopped"),
            Ok(Err(e)) => warn!("Producer stopped with unflushed records: {e}"),
            Err(e) => error!("Producer flush task failed: {e}"),
        }
    }

    /// Drop the client after an error the client cannot recover from.
    fn discard(&self, cause: &KafkaError) {
        if self.slot_mut().take().is_some() {
            error!("Discarding producer client after fatal error: {cause}");
        }
    }
}

#[async_trait]
impl RecordProducer for ProducerSession {
    async fn produce(&self, record: ProduceRecord) -> Result<ProduceResult> {
        let client = self.client().await?;

        let mut future_record = FutureRecord::<[u8], [u8]>::to(&record.topic);
        if let Some(partition) = record.partition {
            future_record = future_record.partition(partition);
        }
        if let Some(key) = &record.key {
            future_record = future_record.key(key.as_slice());
        }
        if let Some(value) = &record.value {
            future_record = future_record.payload(value.as_slice());
        }
        if let Some(timestamp) = record.timestamp {
            future_record = future_record.timestamp(timestamp);
        }

        debug!("Producing to {} (partition {:?})", record.topic, record.partition);
        match client.send(future_record, QUEUE_TIMEOUT).await {
            Ok((partition, offset)) => Ok(ProduceResult { partition, offset }),
            Err((e, _)) => {
                if is_fatal(&e) {
                    self.discard(&e);
                }
                debug!("Produce to {} failed: {e}", record.topic);
                Err(Error::from(e))
            }
        }
    }
}

/// Producer client properties on top of the shared broker settings.
pub fn producer_config(broker: &BrokerSettings) -> ClientConfig {
    let mut config = broker.client_config();
    config
        .set("acks", "1")
        .set("client.id", format!("{CLIENT_ID_PREFIX}{}", uuid::Uuid::new_v4()));
    config
}

fn create_client(settings: &ClientConfig) -> Result<FutureProducer> {
    settings.create().map_err(|e| {
        error!("Failed to create producer client: {e}");
        Error::from(e)
    })
}

fn is_fatal(err: &KafkaError) -> bool {
    matches!(
        err.rdkafka_error_code(),
        Some(RDKafkaErrorCode::Fatal)
            | Some(RDKafkaErrorCode::Authentication)
            | Some(RDKafkaErrorCode::SaslAuthenticationFailed)
    )
}
