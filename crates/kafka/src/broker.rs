//! The broker-consumer seam.
//!
//! Sessions talk to Kafka only through [`BrokerConsumer`], so pool, session
//! and read-task behavior can be exercised with an in-memory fake.

use kafka_rest_types::{RawRecord, TopicPartition, TopicPartitionOffset};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer};
use rdkafka::error::KafkaResult;
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use std::time::Duration;

/// One exclusive broker-consumer client.
///
/// Callers serialize every call; implementations need not be reentrant.
pub trait BrokerConsumer: Send + Sync {
    fn subscribe(&self, topics: &[String]) -> KafkaResult<()>;

    /// `pattern` is a regular expression starting with `^`.
    fn subscribe_pattern(&self, pattern: &str) -> KafkaResult<()>;

    fn unsubscribe(&self);

    fn subscription(&self) -> KafkaResult<Vec<String>>;

    fn assign(&self, partitions: &[TopicPartition]) -> KafkaResult<()>;

    fn assignment(&self) -> KafkaResult<Vec<TopicPartition>>;

    fn seek(&self, partition: &TopicPartition, offset: Offset) -> KafkaResult<()>;

    /// Synchronously commit exactly the given offsets.
    fn commit(&self, offsets: &[TopicPartitionOffset]) -> KafkaResult<()>;

    /// Asynchronously commit the current consumed positions.
    fn commit_consumed(&self) -> KafkaResult<()>;

    /// Committed offsets; partitions without one are left out.
    fn committed(&self, partitions: &[TopicPartition]) -> KafkaResult<Vec<TopicPartitionOffset>>;

    /// Zero-wait poll for one record.
    fn poll(&self) -> Option<KafkaResult<RawRecord>>;

    fn close(self: Box<Self>);
}

/// Builds broker-consumer clients for new sessions.
pub trait ConsumerFactory: Send + Sync {
    fn create(&self, config: &ClientConfig) -> KafkaResult<Box<dyn BrokerConsumer>>;
}

/// [`BrokerConsumer`] over librdkafka.
pub struct RdKafkaConsumer {
    consumer: BaseConsumer,
    request_timeout: Duration,
}

impl RdKafkaConsumer {
    pub fn new(config: &ClientConfig) -> KafkaResult<Self> {
        let request_timeout = config
            .get("request.timeout.ms")
            .and_then(|ms| ms.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(30));
        Ok(Self {
            consumer: config.create()?,
            request_timeout,
        })
    }
}

fn partition_list(partitions: &[TopicPartition]) -> TopicPartitionList {
    let mut tpl = TopicPartitionList::with_capacity(partitions.len());
    for tp in partitions {
        tpl.add_partition(&tp.topic, tp.partition);
    }
    tpl
}

impl BrokerConsumer for RdKafkaConsumer {
    fn subscribe(&self, topics: &[String]) -> KafkaResult<()> {
        let topics: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer.subscribe(&topics)
    }

    fn subscribe_pattern(&self, pattern: &str) -> KafkaResult<()> {
        // librdkafka treats a topic starting with '^' as a regex subscription
        self.consumer.subscribe(&[pattern])
    }

    fn unsubscribe(&self) {
        self.consumer.unsubscribe();
    }

    fn subscription(&self) -> KafkaResult<Vec<String>> {
        let tpl = self.consumer.subscription()?;
        Ok(tpl
            .elements()
            .iter()
            .map(|e| e.topic().to_string())
            .collect())
    }

    fn assign(&self, partitions: &[TopicPartition]) -> KafkaResult<()> {
        self.consumer.assign(&partition_list(partitions))
    }

    fn assignment(&self) -> KafkaResult<Vec<TopicPartition>> {
        let tpl = self.consumer.assignment()?;
        Ok(tpl
            .elements()
            .iter()
            .map(|e| TopicPartition::new(e.topic(), e.partition()))
            .collect())
    }

    fn seek(&self, partition: &TopicPartition, offset: Offset) -> KafkaResult<()> {
        self.consumer.seek(
            &partition.topic,
            partition.partition,
            offset,
            self.request_timeout,
        )
    }

    fn commit(&self, offsets: &[TopicPartitionOffset]) -> KafkaResult<()> {
        let mut tpl = TopicPartitionList::with_capacity(offsets.len());
        for tpo in offsets {
            tpl.add_partition_offset(&tpo.topic, tpo.partition, Offset::Offset(tpo.offset))?;
        }
        self.consumer.commit(&tpl, CommitMode::Sync)
    }

    fn commit_consumed(&self) -> KafkaResult<()> {
        self.consumer.commit_consumer_state(CommitMode::Async)
    }

    fn committed(&self, partitions: &[TopicPartition]) -> KafkaResult<Vec<TopicPartitionOffset>> {
        let tpl = self
            .consumer
            .committed_offsets(partition_list(partitions), self.request_timeout)?;
        Ok(tpl
            .elements()
            .iter()
            .filter_map(|e| match e.offset() {
                Offset::Offset(offset) => Some(TopicPartitionOffset::new(
                    e.topic(),
                    e.partition(),
                    offset,
                )),
                _ => None,
            })
            .collect())
    }

    fn poll(&self) -> Option<KafkaResult<RawRecord>> {
        self.consumer.poll(Duration::ZERO).map(|result| {
            result.map(|msg| RawRecord {
                topic: msg.topic().to_string(),
                partition: msg.partition(),
                offset: msg.offset(),
                key: msg.key().map(|k| k.to_vec()),
                value: msg.payload().map(|v| v.to_vec()),
                timestamp: msg.timestamp().to_millis(),
            })
        })
    }

    fn close(self: Box<Self>) {
        self.consumer.unsubscribe();
        // dropping the client leaves the group and releases its resources
    }
}

pub struct RdKafkaConsumerFactory;

impl ConsumerFactory for RdKafkaConsumerFactory {
    fn create(&self, config: &ClientConfig) -> KafkaResult<Box<dyn BrokerConsumer>> {
        Ok(Box::new(RdKafkaConsumer::new(config)?))
    }
}
