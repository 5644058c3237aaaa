//! Producer side of kafka-rest-proxy.
//!
//! One [`ProducerSession`] owns the process-wide broker producer. Callers go
//! through the [`RecordProducer`] trait so the produce path can run against a
//! fake in tests.
//!
//! ```rust,no_run
//! use kafka_rest_producer::{ProduceRecord, ProducerConfig, ProducerSession, RecordProducer};
//! use kafka_rest_types::BrokerSettings;
//!
//! # async fn run() -> kafka_rest_types::Result<()> {
//! let producer = ProducerSession::new(
//!     BrokerSettings::new("localhost:9092"),
//!     ProducerConfig::default(),
//! )?;
//! let result = producer
//!     .produce(ProduceRecord::new("orders").value(b"hello".to_vec()))
//!     .await?;
//! println!("written at {}:{}", result.partition, result.offset);
//! producer.stop().await;
//! # Ok(())
//! # }
//! ```

mod session;

pub use session::{
    producer_config, ProduceRecord, ProduceResult, ProducerConfig, ProducerSession,
    RecordProducer, CLIENT_ID_PREFIX,
};
