//! Consumer instance settings: what a create request asks for, and what the
//! session ends up running with.

use kafka_rest_types::{BrokerSettings, EmbeddedFormat};
use rdkafka::config::ClientConfig;
use std::time::Duration;

pub const DEFAULT_AUTO_OFFSET_RESET: &str = "earliest";
pub const DEFAULT_ENABLE_AUTO_COMMIT: bool = false;
pub const DEFAULT_REQUEST_TIMEOUT_MS: i32 = 30_000;
pub const DEFAULT_FETCH_MIN_BYTES: i32 = 1;
pub const DEFAULT_FETCH_MAX_BYTES: i32 = 64 * 1024 * 1024;
pub const DEFAULT_MAX_POLL_RECORDS: i32 = 30;
pub const DEFAULT_FETCH_MAX_WAIT_MS: i32 = 500;
pub const DEFAULT_MAX_POLL_INTERVAL_MS: i32 = 600_000;

/// Prefix of generated instance names.
pub const INSTANCE_NAME_PREFIX: &str = "kafka-rest-consumer-";

/// A consumer instance as requested by a caller.
#[derive(Debug, Clone, Default)]
pub struct ConsumerInstanceConfig {
    pub id: Option<String>,
    pub name: Option<String>,
    pub format: EmbeddedFormat,
    pub auto_offset_reset: Option<String>,
    pub enable_auto_commit: Option<String>,
    pub fetch_min_bytes: Option<i32>,
    pub request_timeout_ms: Option<i32>,
}

impl ConsumerInstanceConfig {
    pub fn new(format: EmbeddedFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    /// Explicit id, else explicit name, else a generated unique name.
    pub fn instance_name(&self) -> String {
        self.id
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| format!("{INSTANCE_NAME_PREFIX}{}", uuid::Uuid::new_v4()))
    }

    /// Client properties for a new session's broker consumer.
    pub fn client_config(
        &self,
        broker: &BrokerSettings,
        group: &str,
        instance: &str,
    ) -> ClientConfig {
        let mut config = broker.client_config();
        config
            .set("group.id", group)
            .set("client.id", instance)
            .set(
                "auto.offset.reset",
                self.auto_offset_reset
                    .as_deref()
                    .unwrap_or(DEFAULT_AUTO_OFFSET_RESET),
            )
            .set(
                "enable.auto.commit",
                self.enable_auto_commit
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ENABLE_AUTO_COMMIT.to_string()),
            )
            .set(
                "fetch.min.bytes",
                self.fetch_min_bytes
                    .unwrap_or(DEFAULT_FETCH_MIN_BYTES)
                    .to_string(),
            )
            .set(
                "request.timeout.ms",
                self.request_timeout_ms
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS)
                    .to_string(),
            )
            .set("fetch.max.bytes", DEFAULT_FETCH_MAX_BYTES.to_string())
            .set("fetch.wait.max.ms", DEFAULT_FETCH_MAX_WAIT_MS.to_string())
            .set(
                "max.poll.interval.ms",
                DEFAULT_MAX_POLL_INTERVAL_MS.to_string(),
            )
            .set("enable.partition.eof", "false");
        config
    }
}

/// Settings a live session runs with. Immutable once the session exists.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerSessionConfig {
    pub format: EmbeddedFormat,
    pub auto_offset_reset: String,
    pub enable_auto_commit: bool,
    pub fetch_min_bytes: i32,
    pub fetch_max_bytes: i32,
    pub request_timeout_ms: i32,
    /// Not a librdkafka property; fixed per session
    pub max_poll_records: i32,
    pub max_poll_interval_ms: i32,
}

impl ConsumerSessionConfig {
    /// Read the effective settings back from the client configuration the
    /// broker consumer was built with.
    pub fn resolve(format: EmbeddedFormat, config: &ClientConfig) -> Self {
        fn int(config: &ClientConfig, key: &str, default: i32) -> i32 {
            config
                .get(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        }

        Self {
            format,
            auto_offset_reset: config
                .get("auto.offset.reset")
                .unwrap_or(DEFAULT_AUTO_OFFSET_RESET)
                .to_string(),
            enable_auto_commit: config
                .get("enable.auto.commit")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_ENABLE_AUTO_COMMIT),
            fetch_min_bytes: int(config, "fetch.min.bytes", DEFAULT_FETCH_MIN_BYTES),
            fetch_max_bytes: int(config, "fetch.max.bytes", DEFAULT_FETCH_MAX_BYTES),
            request_timeout_ms: int(config, "request.timeout.ms", DEFAULT_REQUEST_TIMEOUT_MS),
            max_poll_records: DEFAULT_MAX_POLL_RECORDS,
            max_poll_interval_ms: int(
                config,
                "max.poll.interval.ms",
                DEFAULT_MAX_POLL_INTERVAL_MS,
            ),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(0) as u64)
    }
}
