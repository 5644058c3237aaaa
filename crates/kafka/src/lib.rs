//! Consumer side of kafka-rest-proxy.
//!
//! A consumer session owns one broker consumer and survives across
//! independent HTTP calls until it is deleted or sits idle past its TTL.
//!
//! - [`pool`] - bounded `(group, instance)` → session map
//! - [`session`] - per-session broker calls and record buffer
//! - [`read_task`] - reads bounded by time and bytes
//! - [`sweeper`] - background expiration
//! - [`convert`] - per-format record conversion
//! - [`broker`] - the broker-consumer trait and its librdkafka implementation

pub mod broker;
pub mod config;
pub mod convert;
pub mod pool;
pub mod read_task;
pub mod session;
pub mod sweeper;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use broker::{BrokerConsumer, ConsumerFactory, RdKafkaConsumerFactory};
pub use config::{ConsumerInstanceConfig, ConsumerSessionConfig};
pub use convert::RecordConverter;
pub use pool::{ConsumerPool, PoolConfig};
pub use read_task::{spawn_read, ReadBudget, DEFAULT_POLL_FLOOR};
pub use session::{ConsumerSession, SessionKey};
pub use sweeper::spawn_sweeper;
