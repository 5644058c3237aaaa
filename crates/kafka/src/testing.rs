//! In-memory broker consumer for tests.

use crate::broker::{BrokerConsumer, ConsumerFactory};
use kafka_rest_schema_registry::{
    CacheConfig, CachedSchemaManager, RegistryConfig, SchemaManager, SchemaRegistryClient,
};
use kafka_rest_types::{RawRecord, TopicPartition, TopicPartitionOffset};
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, KafkaResult, RDKafkaErrorCode};
use rdkafka::Offset;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeState {
    queue: VecDeque<RawRecord>,
    subscription: Vec<String>,
    patterns: Vec<String>,
    assignment: Vec<TopicPartition>,
    seeks: Vec<(TopicPartition, Offset)>,
    commits: Vec<TopicPartitionOffset>,
    stored_offsets: HashMap<(String, i32), i64>,
    consumed_commits: usize,
    fail_commits: bool,
    close_count: usize,
    client_ids: Vec<String>,
}

/// Cloneable handle: every clone observes the same state, so a test can keep
/// one while a session owns another.
#[derive(Clone, Default)]
pub struct FakeConsumer {
    state: Arc<Mutex<FakeState>>,
}

impl FakeConsumer {
    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Make a record available to the next poll.
    pub fn push(&self, record: RawRecord) {
        self.state().queue.push_back(record);
    }

    pub fn fail_commits(&self) {
        self.state().fail_commits = true;
    }

    pub fn patterns(&self) -> Vec<String> {
        self.state().patterns.clone()
    }

    pub fn seeks(&self) -> Vec<(TopicPartition, Offset)> {
        self.state().seeks.clone()
    }

    pub fn committed_offsets(&self) -> Vec<TopicPartitionOffset> {
        self.state().commits.clone()
    }

    pub fn consumed_commits(&self) -> usize {
        self.state().consumed_commits
    }

    pub fn close_count(&self) -> usize {
        self.state().close_count
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.state().client_ids.clone()
    }
}

impl BrokerConsumer for FakeConsumer {
    fn subscribe(&self, topics: &[String]) -> KafkaResult<()> {
        self.state().subscription = topics.to_vec();
        Ok(())
    }

    fn subscribe_pattern(&self, pattern: &str) -> KafkaResult<()> {
        self.state().patterns.push(pattern.to_string());
        Ok(())
    }

    fn unsubscribe(&self) {
        self.state().subscription.clear();
    }

    fn subscription(&self) -> KafkaResult<Vec<String>> {
        Ok(self.state().subscription.clone())
    }

    fn assign(&self, partitions: &[TopicPartition]) -> KafkaResult<()> {
        self.state().assignment = partitions.to_vec();
        Ok(())
    }

    fn assignment(&self) -> KafkaResult<Vec<TopicPartition>> {
        Ok(self.state().assignment.clone())
    }

    fn seek(&self, partition: &TopicPartition, offset: Offset) -> KafkaResult<()> {
        self.state().seeks.push((partition.clone(), offset));
        Ok(())
    }

    fn commit(&self, offsets: &[TopicPartitionOffset]) -> KafkaResult<()> {
        let mut state = self.state();
        if state.fail_commits {
            return Err(KafkaError::ConsumerCommit(
                RDKafkaErrorCode::RebalanceInProgress,
            ));
        }
        for tpo in offsets {
            state
                .stored_offsets
                .insert((tpo.topic.clone(), tpo.partition), tpo.offset);
        }
        state.commits.extend_from_slice(offsets);
        Ok(())
    }

    fn commit_consumed(&self) -> KafkaResult<()> {
        let mut state = self.state();
        if state.fail_commits {
            return Err(KafkaError::ConsumerCommit(
                RDKafkaErrorCode::RebalanceInProgress,
            ));
        }
        state.consumed_commits += 1;
        Ok(())
    }

    fn committed(&self, partitions: &[TopicPartition]) -> KafkaResult<Vec<TopicPartitionOffset>> {
        let state = self.state();
        Ok(partitions
            .iter()
            .filter_map(|tp| {
                state
                    .stored_offsets
                    .get(&(tp.topic.clone(), tp.partition))
                    .map(|offset| TopicPartitionOffset::new(&tp.topic, tp.partition, *offset))
            })
            .collect())
    }

    fn poll(&self) -> Option<KafkaResult<RawRecord>> {
        self.state().queue.pop_front().map(Ok)
    }

    fn close(self: Box<Self>) {
        self.state().close_count += 1;
    }
}

/// Hands out clones of one [`FakeConsumer`] and records the client ids asked for.
#[derive(Clone, Default)]
pub struct FakeConsumerFactory {
    pub consumer: FakeConsumer,
}

impl ConsumerFactory for FakeConsumerFactory {
    fn create(&self, config: &ClientConfig) -> KafkaResult<Box<dyn BrokerConsumer>> {
        if let Some(client_id) = config.get("client.id") {
            self.consumer.state().client_ids.push(client_id.to_string());
        }
        Ok(Box::new(self.consumer.clone()))
    }
}

pub fn raw_record(topic: &str, partition: i32, offset: i64, value: &[u8]) -> RawRecord {
    RawRecord {
        topic: topic.to_string(),
        partition,
        offset,
        key: None,
        value: Some(value.to_vec()),
        timestamp: None,
    }
}

/// A schema manager pointing at a registry that is never contacted.
pub fn unused_schemas() -> SchemaManager {
    let client = SchemaRegistryClient::new(&RegistryConfig::new("http://127.0.0.1:9"))
        .expect("static registry url");
    SchemaManager::new(Arc::new(CachedSchemaManager::new(
        client,
        &CacheConfig::default(),
    )))
}
