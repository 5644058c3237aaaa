//! Process configuration, from command-line flags or the environment.

pub mod duration;

use clap::Parser;
use kafka_rest_consumer::PoolConfig;
use kafka_rest_producer::ProducerConfig;
use kafka_rest_schema_registry::{CacheConfig, RegistryConfig};
use kafka_rest_types::{BrokerSettings, SaslMechanism, SecurityProtocol};
use std::net::SocketAddr;
use std::time::Duration;

pub use duration::parse_duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "kafka-rest-proxy")]
#[command(about = "HTTP gateway exposing Kafka produce/consume as REST sessions")]
#[command(long_about = None)]
pub struct ProxyConfig {
    /// Address the HTTP server listens on
    #[arg(long, env = "KAFKA_REST_LISTEN", default_value = "0.0.0.0:8082")]
    pub listen: SocketAddr,

    #[command(flatten)]
    pub kafka: KafkaOpts,

    #[command(flatten)]
    pub registry: RegistryOpts,

    #[command(flatten)]
    pub consumer: ConsumerOpts,

    #[command(flatten)]
    pub producer: ProducerOpts,
}

#[derive(Parser, Debug, Clone)]
pub struct KafkaOpts {
    /// Kafka brokers (comma-separated list)
    #[arg(long, env = "KAFKA_BOOTSTRAP_SERVERS", default_value = "localhost:9092")]
    pub bootstrap_servers: String,

    /// PLAINTEXT, SSL, SASL_PLAINTEXT or SASL_SSL
    #[arg(long, env = "KAFKA_SECURITY_PROTOCOL", default_value = "PLAINTEXT")]
    pub security_protocol: SecurityProtocol,

    /// PLAIN, SCRAM-SHA-256 or SCRAM-SHA-512
    #[arg(long, env = "KAFKA_SASL_MECHANISM", default_value = "PLAIN")]
    pub sasl_mechanism: SaslMechanism,

    #[arg(long, env = "KAFKA_SASL_USERNAME")]
    pub sasl_username: Option<String>,

    #[arg(long, env = "KAFKA_SASL_PASSWORD", hide_env_values = true)]
    pub sasl_password: Option<String>,

    /// PEM file with the CA certificate(s)
    #[arg(long, env = "KAFKA_SSL_CA_LOCATION")]
    pub ssl_ca_location: Option<String>,

    #[arg(long, env = "KAFKA_SSL_CERTIFICATE_LOCATION")]
    pub ssl_certificate_location: Option<String>,

    #[arg(long, env = "KAFKA_SSL_KEY_LOCATION")]
    pub ssl_key_location: Option<String>,

    #[arg(long, env = "KAFKA_SSL_KEY_PASSWORD", hide_env_values = true)]
    pub ssl_key_password: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct RegistryOpts {
    /// Schema registry base URL
    #[arg(long, env = "SCHEMA_REGISTRY_URL", default_value = "http://localhost:8081")]
    pub schema_registry_url: String,

    #[arg(long, env = "SCHEMA_REGISTRY_USERNAME")]
    pub schema_registry_username: Option<String>,

    #[arg(long, env = "SCHEMA_REGISTRY_PASSWORD", hide_env_values = true)]
    pub schema_registry_password: Option<String>,

    #[arg(long, env = "SCHEMA_REGISTRY_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub schema_registry_timeout: Duration,

    /// How long fetched schemas stay cached
    #[arg(long, env = "SCHEMA_CACHE_TTL", default_value = "1d", value_parser = parse_duration)]
    pub schema_cache_ttl: Duration,

    /// How long a registry "not found" answer is remembered
    #[arg(long, env = "SCHEMA_CACHE_MISSING_TTL", default_value = "1m", value_parser = parse_duration)]
    pub schema_cache_missing_ttl: Duration,

    #[arg(long, env = "SCHEMA_CACHE_MAX_ENTRIES", default_value = "10000")]
    pub schema_cache_max_entries: u64,
}

#[derive(Parser, Debug, Clone)]
pub struct ConsumerOpts {
    /// Maximum number of live consumer sessions
    #[arg(long, env = "CONSUMER_POOL_CAPACITY", default_value = "25")]
    pub consumer_pool_capacity: usize,

    /// Idle time after which a consumer session is closed
    #[arg(long, env = "CONSUMER_SESSION_TTL", default_value = "5m", value_parser = parse_duration)]
    pub consumer_session_ttl: Duration,

    #[arg(long, env = "CONSUMER_SWEEP_INTERVAL", default_value = "1s", value_parser = parse_duration)]
    pub consumer_sweep_interval: Duration,

    /// Pause between polls while a read waits for records
    #[arg(long, env = "CONSUMER_POLL_FLOOR", default_value = "10ms", value_parser = parse_duration)]
    pub consumer_poll_floor: Duration,
}

#[derive(Parser, Debug, Clone)]
pub struct ProducerOpts {
    /// Bounded wait for outstanding sends at shutdown
    #[arg(long, env = "PRODUCER_DRAIN_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub producer_drain_timeout: Duration,

    /// Pause before and after rebuilding a failed producer client
    #[arg(long, env = "PRODUCER_RESTART_COOLDOWN", default_value = "10s", value_parser = parse_duration)]
    pub producer_restart_cooldown: Duration,
}

impl ProxyConfig {
    pub fn broker_settings(&self) -> BrokerSettings {
        let kafka = &self.kafka;
        BrokerSettings {
            bootstrap_servers: kafka.bootstrap_servers.clone(),
            security_protocol: kafka.security_protocol,
            sasl_mechanism: kafka.sasl_mechanism,
            sasl_username: kafka.sasl_username.clone(),
            sasl_password: kafka.sasl_password.clone(),
            ssl_ca_location: kafka.ssl_ca_location.clone(),
            ssl_certificate_location: kafka.ssl_certificate_location.clone(),
            ssl_key_location: kafka.ssl_key_location.clone(),
            ssl_key_password: kafka.ssl_key_password.clone(),
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            username: self.registry.schema_registry_username.clone(),
            password: self.registry.schema_registry_password.clone(),
            request_timeout: self.registry.schema_registry_timeout,
            ..RegistryConfig::new(&self.registry.schema_registry_url)
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            positive_ttl: self.registry.schema_cache_ttl,
            negative_ttl: self.registry.schema_cache_missing_ttl,
            max_entries: self.registry.schema_cache_max_entries,
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            capacity: self.consumer.consumer_pool_capacity,
            session_ttl: self.consumer.consumer_session_ttl,
        }
    }

    pub fn producer_config(&self) -> ProducerConfig {
        ProducerConfig {
            drain_timeout: self.producer.producer_drain_timeout,
            restart_cooldown: self.producer.producer_restart_cooldown,
        }
    }
}
