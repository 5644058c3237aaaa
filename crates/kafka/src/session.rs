//! One consumer instance living across independent HTTP calls.

use crate::broker::BrokerConsumer;
use crate::config::ConsumerSessionConfig;
use crate::convert::RecordConverter;
use crate::read_task::{ReadBudget, ReadTaskState};
use kafka_rest_types::{
    ConsumerRecord, EmbeddedFormat, Error, RawRecord, Result, TopicPartition,
    TopicPartitionOffset,
};
use rdkafka::Offset;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pool key of a consumer session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub group: String,
    pub instance: String,
}

impl SessionKey {
    pub fn new(group: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            instance: instance.into(),
        }
    }

    pub(crate) fn not_found(&self) -> Error {
        Error::ConsumerNotFound {
            group: self.group.clone(),
            instance: self.instance.clone(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.instance)
    }
}

struct SessionState {
    /// `None` once closed
    client: Option<Box<dyn BrokerConsumer>>,
    buffer: VecDeque<RawRecord>,
}

/// A consumer session: an exclusive broker consumer plus the records polled
/// from it that no read has returned yet.
///
/// Every broker call runs under the session's single async lock, so calls
/// for one session never interleave. The expiration instant has its own
/// lock and can be checked without waiting for a running read.
pub struct ConsumerSession {
    key: SessionKey,
    config: ConsumerSessionConfig,
    converter: RecordConverter,
    ttl: Duration,
    expires_at: Mutex<Instant>,
    state: tokio::sync::Mutex<SessionState>,
}

impl fmt::Debug for ConsumerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerSession")
            .field("key", &self.key)
            .field("format", &self.config.format)
            .finish_non_exhaustive()
    }
}

impl ConsumerSession {
    pub fn new(
        key: SessionKey,
        config: ConsumerSessionConfig,
        converter: RecordConverter,
        client: Box<dyn BrokerConsumer>,
        ttl: Duration,
    ) -> Self {
        Self {
            key,
            config,
            converter,
            ttl,
            expires_at: Mutex::new(Instant::now() + ttl),
            state: tokio::sync::Mutex::new(SessionState {
                client: Some(client),
                buffer: VecDeque::new(),
            }),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn config(&self) -> &ConsumerSessionConfig {
        &self.config
    }

    pub fn format(&self) -> EmbeddedFormat {
        self.config.format
    }

    /// A read must ask for the format the session was created with.
    pub fn check_format(&self, requested: EmbeddedFormat) -> Result<()> {
        if requested != self.config.format {
            return Err(Error::FormatMismatch {
                requested: requested.to_string(),
                configured: self.config.format.to_string(),
            });
        }
        Ok(())
    }

    pub fn expired(&self, now: Instant) -> bool {
        *self.expires_at_guard() <= now
    }

    pub fn expires_at(&self) -> Instant {
        *self.expires_at_guard()
    }

    pub fn touch(&self) {
        *self.expires_at_guard() = Instant::now() + self.ttl;
    }

    fn expires_at_guard(&self) -> std::sync::MutexGuard<'_, Instant> {
        self.expires_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` against the broker consumer under the session lock.
    async fn with_client<T>(&self, f: impl FnOnce(&dyn BrokerConsumer) -> Result<T>) -> Result<T> {
        let state = self.state.lock().await;
        let client = state.client.as_deref().ok_or_else(|| self.key.not_found())?;
        let result = f(client);
        drop(state);
        self.touch();
        result
    }

    /// Subscribe to a topic list or, when no list is given, a topic pattern.
    pub async fn subscribe(&self, topics: Option<Vec<String>>, pattern: Option<String>) -> Result<()> {
        self.with_client(|client| {
            if let Some(topics) = topics {
                debug!("{} subscribing to {:?}", self.key, topics);
                client.subscribe(&topics)?;
            } else if let Some(pattern) = pattern {
                let pattern = if pattern.starts_with('^') {
                    pattern
                } else {
                    format!("^{pattern}")
                };
                debug!("{} subscribing to pattern {}", self.key, pattern);
                client.subscribe_pattern(&pattern)?;
            }
            Ok(())
        })
        .await
    }

    pub async fn unsubscribe(&self) -> Result<()> {
        self.with_client(|client| {
            client.unsubscribe();
            Ok(())
        })
        .await
    }

    pub async fn subscription(&self) -> Result<Vec<String>> {
        self.with_client(|client| Ok(client.subscription()?)).await
    }

    pub async fn assign(&self, partitions: &[TopicPartition]) -> Result<()> {
        self.with_client(|client| Ok(client.assign(partitions)?))
            .await
    }

    pub async fn assignment(&self) -> Result<Vec<TopicPartition>> {
        self.with_client(|client| Ok(client.assignment()?)).await
    }

    pub async fn seek(&self, offsets: &[TopicPartitionOffset]) -> Result<()> {
        self.with_client(|client| {
            for tpo in offsets {
                client.seek(&tpo.topic_partition(), Offset::Offset(tpo.offset))?;
            }
            Ok(())
        })
        .await
    }

    pub async fn seek_to_beginning(&self, partitions: &[TopicPartition]) -> Result<()> {
        self.seek_to(partitions, Offset::Beginning).await
    }

    pub async fn seek_to_end(&self, partitions: &[TopicPartition]) -> Result<()> {
        self.seek_to(partitions, Offset::End).await
    }

    async fn seek_to(&self, partitions: &[TopicPartition], offset: Offset) -> Result<()> {
        self.with_client(|client| {
            for tp in partitions {
                client.seek(tp, offset)?;
            }
            Ok(())
        })
        .await
    }

    /// `None` commits the consumed positions asynchronously; explicit offsets
    /// are committed synchronously as the next offset to read (`offset + 1`).
    pub async fn commit(&self, offsets: Option<&[TopicPartitionOffset]>) -> Result<()> {
        self.with_client(|client| {
            let result = match offsets {
                None => client.commit_consumed(),
                Some(offsets) => {
                    let next: Vec<TopicPartitionOffset> = offsets
                        .iter()
                        .map(|tpo| TopicPartitionOffset {
                            offset: tpo.offset + 1,
                            ..tpo.clone()
                        })
                        .collect();
                    client.commit(&next)
                }
            };
            result.map_err(|e| {
                warn!("{} commit failed: {e}", self.key);
                Error::CommitFailed(e.to_string())
            })
        })
        .await
    }

    pub async fn committed(&self, partitions: &[TopicPartition]) -> Result<Vec<TopicPartitionOffset>> {
        self.with_client(|client| Ok(client.committed(partitions)?))
            .await
    }

    /// Whether a record is buffered, polling the broker once if not.
    pub async fn has_next(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        self.fill(&mut state)
    }

    pub async fn peek(&self) -> Option<RawRecord> {
        self.state.lock().await.buffer.front().cloned()
    }

    pub async fn pop(&self) -> Option<RawRecord> {
        self.state.lock().await.buffer.pop_front()
    }

    pub async fn convert(&self, raw: &RawRecord) -> Result<(ConsumerRecord, usize)> {
        self.converter.convert(raw).await
    }

    fn fill(&self, state: &mut SessionState) -> Result<bool> {
        if !state.buffer.is_empty() {
            return Ok(true);
        }
        let client = state.client.as_deref().ok_or_else(|| self.key.not_found())?;
        for _ in 0..self.config.max_poll_records.max(1) {
            match client.poll() {
                Some(Ok(record)) => state.buffer.push_back(record),
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }
        Ok(!state.buffer.is_empty())
    }

    /// Move buffered records into `task` until the buffer runs dry or the
    /// next record would reach the byte budget. That record stays buffered.
    pub(crate) async fn read_partial(
        &self,
        budget: &ReadBudget,
        task: &mut ReadTaskState,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        while !task.exceeded_max && self.fill(&mut state)? {
            let Some(raw) = state.buffer.front() else {
                break;
            };
            let (record, size) = self.converter.convert(raw).await?;
            let size = size as i64;

            if task.bytes + size >= budget.max_bytes {
                task.exceeded_max = true;
                break;
            }
            task.records.push(record);
            state.buffer.pop_front();
            task.bytes += size;
            if task.bytes > budget.min_bytes {
                task.exceeded_min = true;
            }
        }
        drop(state);
        self.touch();
        Ok(())
    }

    /// Close the broker consumer. Later calls are no-ops.
    pub async fn close(&self) {
        let client = {
            let mut state = self.state.lock().await;
            state.buffer.clear();
            state.client.take()
        };
        let Some(client) = client else {
            return;
        };
        info!("Closing consumer session {}", self.key);
        if let Err(e) = tokio::task::spawn_blocking(move || client.close()).await {
            warn!("Closing consumer session {} failed: {e}", self.key);
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.client.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{raw_record, FakeConsumer};
    use kafka_rest_codec::SchemaCodec;

    fn session(fake: &FakeConsumer, ttl: Duration) -> ConsumerSession {
        let config = crate::config::ConsumerSessionConfig::resolve(
            EmbeddedFormat::Binary,
            &rdkafka::config::ClientConfig::new(),
        );
        let converter = RecordConverter::new(
            EmbeddedFormat::Binary,
            &SchemaCodec::default(),
            &crate::testing::unused_schemas(),
        );
        ConsumerSession::new(
            SessionKey::new("g", "i"),
            config,
            converter,
            Box::new(fake.clone()),
            ttl,
        )
    }

    #[tokio::test]
    async fn test_pattern_subscription_is_anchored() {
        let fake = FakeConsumer::default();
        let session = session(&fake, Duration::from_secs(60));

        session.subscribe(None, Some("orders-.*".to_string())).await.unwrap();
        session.subscribe(None, Some("^pay.*".to_string())).await.unwrap();
        assert_eq!(fake.patterns(), vec!["^orders-.*", "^pay.*"]);

        session
            .subscribe(Some(vec!["a".to_string()]), Some("ignored".to_string()))
            .await
            .unwrap();
        assert_eq!(session.subscription().await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_explicit_commit_uses_next_offset() {
        let fake = FakeConsumer::default();
        let session = session(&fake, Duration::from_secs(60));

        session
            .commit(Some(&[TopicPartitionOffset::new("orders", 0, 41)]))
            .await
            .unwrap();
        assert_eq!(
            fake.committed_offsets(),
            vec![TopicPartitionOffset::new("orders", 0, 42)]
        );

        session.commit(None).await.unwrap();
        assert_eq!(fake.consumed_commits(), 1);
    }

    #[tokio::test]
    async fn test_commit_failure_still_refreshes_expiry() {
        let fake = FakeConsumer::default();
        fake.fail_commits();
        let session = session(&fake, Duration::from_millis(200));
        let before = session.expires_at();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let err = session.commit(None).await.unwrap_err();
        assert_eq!(err.code(), 3002);
        assert!(session.expires_at() > before);
    }

    #[tokio::test]
    async fn test_has_next_polls_once_when_empty() {
        let fake = FakeConsumer::default();
        let session = session(&fake, Duration::from_secs(60));
        assert!(!session.has_next().await.unwrap());

        fake.push(raw_record("orders", 0, 1, b"a"));
        fake.push(raw_record("orders", 0, 2, b"b"));
        assert!(session.has_next().await.unwrap());
        assert_eq!(session.peek().await.unwrap().offset, 1);
        assert_eq!(session.pop().await.unwrap().offset, 1);
        assert_eq!(session.pop().await.unwrap().offset, 2);
        assert!(session.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let fake = FakeConsumer::default();
        let session = session(&fake, Duration::from_secs(60));

        session.close().await;
        session.close().await;
        assert!(session.is_closed().await);
        assert_eq!(fake.close_count(), 1);

        let err = session.assignment().await.unwrap_err();
        assert_eq!(err.code(), 40402);
    }

    #[tokio::test]
    async fn test_format_check() {
        let fake = FakeConsumer::default();
        let session = session(&fake, Duration::from_secs(60));
        assert!(session.check_format(EmbeddedFormat::Binary).is_ok());
        let err = session.check_format(EmbeddedFormat::Json).unwrap_err();
        assert_eq!(err.code(), 40601);
    }

    #[test]
    fn test_expiry() {
        let fake = FakeConsumer::default();
        let session = session(&fake, Duration::from_secs(60));
        let now = Instant::now();
        assert!(!session.expired(now));
        assert!(session.expired(now + Duration::from_secs(61)));
    }
}
