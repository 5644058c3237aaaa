//! Bounded read: drain a session's records under a time and a byte budget.

use crate::config::ConsumerSessionConfig;
use crate::session::ConsumerSession;
use kafka_rest_types::{ConsumerRecord, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Default pause between partial reads while waiting for records.
pub const DEFAULT_POLL_FLOOR: Duration = Duration::from_millis(10);

/// Limits of one read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadBudget {
    pub timeout: Duration,
    /// The read stops before the accumulated size would reach this
    pub max_bytes: i64,
    /// The read may stop as soon as the accumulated size exceeds this
    pub min_bytes: i64,
}

impl ReadBudget {
    /// Requested limits are capped by the session's own; a missing or
    /// non-positive request falls back to the session's value.
    pub fn new(
        config: &ConsumerSessionConfig,
        timeout_ms: Option<i64>,
        max_bytes: Option<i64>,
    ) -> Self {
        let session_timeout = i64::from(config.request_timeout_ms);
        let session_max = i64::from(config.fetch_max_bytes);

        let timeout_ms = match timeout_ms {
            Some(ms) if ms > 0 => ms.min(session_timeout),
            _ => session_timeout,
        };
        let max_bytes = match max_bytes {
            Some(bytes) if bytes > 0 => bytes.min(session_max),
            _ => session_max,
        };
        let min_bytes = if config.fetch_min_bytes < 0 {
            i64::from(i32::MAX)
        } else {
            i64::from(config.fetch_min_bytes)
        };

        Self {
            timeout: Duration::from_millis(timeout_ms.max(0) as u64),
            max_bytes,
            min_bytes,
        }
    }
}

/// Progress of one read task.
#[derive(Debug, Default)]
pub struct ReadTaskState {
    pub bytes: i64,
    pub exceeded_min: bool,
    pub exceeded_max: bool,
    pub records: Vec<ConsumerRecord>,
}

/// Start a read on its own task. The receiver yields exactly one outcome.
pub fn spawn_read(
    session: Arc<ConsumerSession>,
    budget: ReadBudget,
    poll_floor: Duration,
) -> oneshot::Receiver<Result<Vec<ConsumerRecord>>> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let outcome = run_read(&session, budget, poll_floor).await;
        if tx.send(outcome).is_err() {
            warn!("Read result for {} dropped: caller went away", session.key());
        }
    });
    rx
}

pub async fn run_read(
    session: &ConsumerSession,
    budget: ReadBudget,
    poll_floor: Duration,
) -> Result<Vec<ConsumerRecord>> {
    let started = Instant::now();
    let mut state = ReadTaskState::default();

    loop {
        session.read_partial(&budget, &mut state).await?;

        let elapsed = started.elapsed();
        if elapsed >= budget.timeout || state.exceeded_max || state.exceeded_min {
            debug!(
                "Read on {} finished: {} records, {} bytes in {:?}",
                session.key(),
                state.records.len(),
                state.bytes,
                elapsed
            );
            return Ok(state.records);
        }

        let remaining = budget.timeout - elapsed;
        tokio::time::sleep(poll_floor.min(remaining)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::RecordConverter;
    use crate::session::SessionKey;
    use crate::testing::{raw_record, unused_schemas, FakeConsumer};
    use kafka_rest_codec::SchemaCodec;
    use kafka_rest_types::EmbeddedFormat;
    use rdkafka::config::ClientConfig;

    fn session_config(min_bytes: i32) -> ConsumerSessionConfig {
        let mut client = ClientConfig::new();
        client.set("fetch.min.bytes", min_bytes.to_string());
        ConsumerSessionConfig::resolve(EmbeddedFormat::Binary, &client)
    }

    fn session(fake: &FakeConsumer, config: ConsumerSessionConfig) -> Arc<ConsumerSession> {
        let converter = RecordConverter::new(
            EmbeddedFormat::Binary,
            &SchemaCodec::default(),
            &unused_schemas(),
        );
        Arc::new(ConsumerSession::new(
            SessionKey::new("g", "i"),
            config,
            converter,
            Box::new(fake.clone()),
            Duration::from_secs(60),
        ))
    }

    #[test]
    fn test_budget_clamping() {
        let config = session_config(1);

        let budget = ReadBudget::new(&config, None, None);
        assert_eq!(budget.timeout, Duration::from_millis(30_000));
        assert_eq!(budget.max_bytes, 67_108_864);
        assert_eq!(budget.min_bytes, 1);

        let budget = ReadBudget::new(&config, Some(-5), Some(0));
        assert_eq!(budget.timeout, Duration::from_millis(30_000));
        assert_eq!(budget.max_bytes, 67_108_864);

        let budget = ReadBudget::new(&config, Some(250), Some(1024));
        assert_eq!(budget.timeout, Duration::from_millis(250));
        assert_eq!(budget.max_bytes, 1024);

        let budget = ReadBudget::new(&config, Some(90_000), Some(i64::MAX));
        assert_eq!(budget.timeout, Duration::from_millis(30_000));
        assert_eq!(budget.max_bytes, 67_108_864);

        let budget = ReadBudget::new(&session_config(-1), None, None);
        assert_eq!(budget.min_bytes, i64::from(i32::MAX));
    }

    #[tokio::test]
    async fn test_empty_topic_honors_time_budget() {
        let fake = FakeConsumer::default();
        let session = session(&fake, session_config(1));
        let budget = ReadBudget::new(session.config(), Some(100), None);

        let started = Instant::now();
        let records = spawn_read(session, budget, DEFAULT_POLL_FLOOR)
            .await
            .unwrap()
            .unwrap();
        let elapsed = started.elapsed();

        assert!(records.is_empty());
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_byte_budget_leaves_overflowing_record_buffered() {
        let fake = FakeConsumer::default();
        for offset in 0..5 {
            fake.push(raw_record("orders", 0, offset, &[0u8; 40]));
        }
        let session = session(&fake, session_config(i32::MAX - 1));
        let budget = ReadBudget::new(session.config(), Some(5_000), Some(100));

        let records = run_read(&session, budget, DEFAULT_POLL_FLOOR).await.unwrap();
        let offsets: Vec<i64> = records.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 1]);

        // the record that would have crossed the budget is read next
        assert_eq!(session.peek().await.unwrap().offset, 2);
        let budget = ReadBudget::new(session.config(), Some(5_000), Some(100));
        let records = run_read(&session, budget, DEFAULT_POLL_FLOOR).await.unwrap();
        assert_eq!(records.first().map(|r| r.offset), Some(2));
    }

    #[tokio::test]
    async fn test_min_bytes_ends_read_early() {
        let fake = FakeConsumer::default();
        fake.push(raw_record("orders", 0, 0, b"hello"));
        let session = session(&fake, session_config(1));
        let budget = ReadBudget::new(session.config(), Some(10_000), None);

        let started = Instant::now();
        let records = run_read(&session, budget, DEFAULT_POLL_FLOOR).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_records_arriving_later_are_picked_up() {
        let fake = FakeConsumer::default();
        let session = session(&fake, session_config(4));
        let budget = ReadBudget::new(session.config(), Some(2_000), None);

        let rx = spawn_read(session.clone(), budget, DEFAULT_POLL_FLOOR);
        tokio::time::sleep(Duration::from_millis(50)).await;
        fake.push(raw_record("orders", 0, 7, b"late record"));

        let records = rx.await.unwrap().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].offset, 7);
    }

    #[tokio::test]
    async fn test_closed_session_fails_read() {
        let fake = FakeConsumer::default();
        let session = session(&fake, session_config(1));
        session.close().await;

        let budget = ReadBudget::new(session.config(), Some(100), None);
        let err = spawn_read(session, budget, DEFAULT_POLL_FLOOR)
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.code(), 40402);
    }
}
