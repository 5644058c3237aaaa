//! Command-line entry point for kafka-rest-proxy.
//!
//! Every option can also be set through the environment, e.g.
//!
//! ```bash
//! KAFKA_BOOTSTRAP_SERVERS=broker:9092 \
//! SCHEMA_REGISTRY_URL=http://registry:8081 \
//! RUST_LOG=kafka_rest=info \
//!   kafka-rest-proxy --consumer-session-ttl 10m
//! ```

use clap::Parser;
use kafka_rest_proxy::app::shutdown_signal;
use kafka_rest_proxy::{App, ProxyConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ProxyConfig::parse();
    let app = App::build(config)?;
    app.run(shutdown_signal()).await
}
