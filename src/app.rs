//! Wiring: build every component from [`ProxyConfig`], serve, shut down.

use crate::config::ProxyConfig;
use crate::consume::ConsumeAction;
use crate::http::{router, AppState};
use crate::produce::ProduceAction;
use anyhow::Context;
use kafka_rest_codec::SchemaCodec;
use kafka_rest_consumer::{spawn_sweeper, ConsumerPool, RdKafkaConsumerFactory};
use kafka_rest_producer::ProducerSession;
use kafka_rest_schema_registry::{CachedSchemaManager, SchemaManager, SchemaRegistryClient};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct App {
    config: ProxyConfig,
    state: AppState,
    pool: Arc<ConsumerPool>,
    producer: Arc<ProducerSession>,
    sweeper: JoinHandle<()>,
    cancel: CancellationToken,
}

impl App {
    /// Build clients, caches and the consumer pool, and start the expiration sweeper.
    pub fn build(config: ProxyConfig) -> anyhow::Result<Self> {
        let broker = config.broker_settings();

        let registry = SchemaRegistryClient::new(&config.registry_config())
            .context("Failed to create schema registry client")?;
        let schemas = SchemaManager::new(Arc::new(CachedSchemaManager::new(
            registry,
            &config.cache_config(),
        )));
        let codec = SchemaCodec::new(config.registry.schema_cache_max_entries);

        let producer = Arc::new(
            ProducerSession::new(broker.clone(), config.producer_config())
                .context("Failed to create Kafka producer")?,
        );

        let pool = Arc::new(ConsumerPool::new(
            Arc::new(RdKafkaConsumerFactory),
            broker,
            codec.clone(),
            schemas.clone(),
            config.pool_config(),
        ));

        let cancel = CancellationToken::new();
        let sweeper = spawn_sweeper(
            pool.clone(),
            config.consumer.consumer_sweep_interval,
            cancel.clone(),
        );

        let state = AppState {
            produce: Arc::new(ProduceAction::new(producer.clone(), schemas, codec)),
            consume: Arc::new(ConsumeAction::new(
                pool.clone(),
                config.consumer.consumer_poll_floor,
            )),
        };

        Ok(Self {
            config,
            state,
            pool,
            producer,
            sweeper,
            cancel,
        })
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Serve until `shutdown` resolves, then close every session and the producer.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.listen)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.listen))?;
        info!("kafka-rest-proxy listening on {}", self.config.listen);

        axum::serve(listener, router(self.state.clone()))
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server failed")?;

        self.shutdown().await;
        Ok(())
    }

    pub async fn shutdown(self) {
        info!("Shutting down");
        self.cancel.cancel();
        if let Err(e) = self.sweeper.await {
            warn!("Sweeper task failed: {e}");
        }
        self.pool.shutdown().await;
        self.producer.stop().await;
        info!("Shutdown complete");
    }
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
