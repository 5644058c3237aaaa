//! Consume orchestration: translate REST calls into pool and session calls.

use crate::dto::SubscriptionRequest;
use kafka_rest_consumer::{
    spawn_read, ConsumerInstanceConfig, ConsumerPool, ConsumerSession, ReadBudget, SessionKey,
};
use kafka_rest_types::{
    ConsumerRecord, EmbeddedFormat, Error, Result, TopicPartition, TopicPartitionOffset,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub struct ConsumeAction {
    pool: Arc<ConsumerPool>,
    poll_floor: Duration,
}

impl ConsumeAction {
    pub fn new(pool: Arc<ConsumerPool>, poll_floor: Duration) -> Self {
        Self { pool, poll_floor }
    }

    pub fn pool(&self) -> &Arc<ConsumerPool> {
        &self.pool
    }

    fn session(&self, group: &str, instance: &str) -> Result<Arc<ConsumerSession>> {
        self.pool.get(&SessionKey::new(group, instance))
    }

    /// Returns the new instance's name.
    pub async fn create_consumer(&self, group: &str, config: ConsumerInstanceConfig) -> Result<String> {
        self.pool.create(group, &config).await
    }

    pub async fn delete_consumer(&self, group: &str, instance: &str) -> Result<()> {
        info!("Destroying consumer {instance} in group {group}");
        self.pool.delete(&SessionKey::new(group, instance)).await
    }

    pub async fn subscribe(&self, group: &str, instance: &str, request: SubscriptionRequest) -> Result<()> {
        request.validate()?;
        info!("Subscribing consumer {instance} in group {group}");
        self.session(group, instance)?
            .subscribe(request.topics, request.topic_pattern)
            .await
    }

    pub async fn subscription(&self, group: &str, instance: &str) -> Result<Vec<String>> {
        self.session(group, instance)?.subscription().await
    }

    pub async fn unsubscribe(&self, group: &str, instance: &str) -> Result<()> {
        info!("Unsubscribing consumer {instance} in group {group}");
        self.session(group, instance)?.unsubscribe().await
    }

    /// `None` commits everything consumed so far.
    pub async fn commit_offsets(
        &self,
        group: &str,
        instance: &str,
        offsets: Option<Vec<TopicPartitionOffset>>,
    ) -> Result<()> {
        info!("Committing offsets for consumer {instance} in group {group}");
        let session = self.session(group, instance)?;
        let result = session.commit(offsets.as_deref()).await;
        if let Err(e) = &result {
            error!("Failed to commit offsets for {}: {e}", session.key());
        }
        result
    }

    pub async fn committed(
        &self,
        group: &str,
        instance: &str,
        partitions: &[TopicPartition],
    ) -> Result<Vec<TopicPartitionOffset>> {
        self.session(group, instance)?.committed(partitions).await
    }

    pub async fn assign(&self, group: &str, instance: &str, partitions: &[TopicPartition]) -> Result<()> {
        info!("Assigning partitions to consumer {instance} in group {group}");
        self.session(group, instance)?.assign(partitions).await
    }

    pub async fn assignment(&self, group: &str, instance: &str) -> Result<Vec<TopicPartition>> {
        self.session(group, instance)?.assignment().await
    }

    pub async fn seek(&self, group: &str, instance: &str, offsets: &[TopicPartitionOffset]) -> Result<()> {
        info!("Seeking consumer {instance} in group {group}");
        self.session(group, instance)?.seek(offsets).await
    }

    pub async fn seek_to_beginning(
        &self,
        group: &str,
        instance: &str,
        partitions: &[TopicPartition],
    ) -> Result<()> {
        self.session(group, instance)?
            .seek_to_beginning(partitions)
            .await
    }

    pub async fn seek_to_end(&self, group: &str, instance: &str, partitions: &[TopicPartition]) -> Result<()> {
        self.session(group, instance)?.seek_to_end(partitions).await
    }

    /// Run a bounded read. `requested` must match the session's format when
    /// given; `timeout_ms` and `max_bytes` are capped by the session's limits.
    pub async fn read_records(
        &self,
        group: &str,
        instance: &str,
        requested: Option<EmbeddedFormat>,
        timeout_ms: Option<i64>,
        max_bytes: Option<i64>,
    ) -> Result<Vec<ConsumerRecord>> {
        let session = self.session(group, instance)?;
        if let Some(format) = requested {
            session.check_format(format)?;
        }
        let budget = ReadBudget::new(session.config(), timeout_ms, max_bytes);
        spawn_read(session, budget, self.poll_floor)
            .await
            .map_err(|_| Error::UnexpectedNonKafka("read task ended without a result".to_string()))?
    }
}
