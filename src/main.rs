//! Time-series ingestion worker
//!
//! Event-driven pipeline handling:
//! - File-upload events consumed from Redpanda
//! - Streaming CSV validation with online mean and median
//! - Concurrent batched persistence to ClickHouse
//! - Acknowledgment only after the file record is durably completed

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use clickhouse_client::{
    ClickHouseClient, ClickHouseConfig, ClickHouseDataPointWriter, ClickHouseFileStore,
};
use redpanda::{Consumer, RedpandaConfig, StartOffset};
use telemetry::{health, init_tracing_from_env};
use worker::{ConsumerWorker, IngestConfig, IngestionWorker, WorkerConfig, WorkerScheduler};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default)]
    redpanda: RedpandaConfig,

    #[serde(default)]
    clickhouse: ClickHouseConfig,

    #[serde(default)]
    ingest: IngestConfig,

    /// Seconds between metrics snapshots written to ClickHouse
    #[serde(default = "default_metrics_flush_secs")]
    metrics_flush_secs: u64,
}

fn default_metrics_flush_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redpanda: RedpandaConfig::default(),
            clickhouse: ClickHouseConfig::default(),
            ingest: IngestConfig::default(),
            metrics_flush_secs: default_metrics_flush_secs(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23+ requires explicit crypto provider selection before any TLS
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting time-series ingestion worker v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    config
        .ingest
        .validate()
        .context("Invalid ingestion configuration")?;

    info!(
        brokers = ?config.redpanda.brokers,
        topic = %config.redpanda.consumer.topic,
        group = %config.redpanda.consumer.group_id,
        sasl_username = config.redpanda.sasl_username.as_deref().unwrap_or("none"),
        "Loaded Redpanda config"
    );
    info!(
        batch_size = config.ingest.batch_size,
        max_in_flight = config.ingest.max_in_flight,
        drain_timeout_ms = config.ingest.drain_timeout_ms,
        "Loaded ingestion config"
    );

    let clickhouse = ClickHouseClient::new(config.clickhouse.clone());

    if let Err(e) = clickhouse_client::schema::init_schema(&clickhouse).await {
        error!(error = %e, "Failed to initialize ClickHouse schema");
        // Continue anyway - schema might already exist
    }

    check_health(&config, &clickhouse).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let files = Arc::new(ClickHouseFileStore::new(clickhouse.clone()));
    let writer = Arc::new(ClickHouseDataPointWriter::new(clickhouse.clone()));
    let ingest = IngestionWorker::new(files, writer, config.ingest.clone(), shutdown_rx.clone());

    let source = Arc::new(Consumer::new(config.redpanda.clone()));
    let consumer = ConsumerWorker::new(source, ingest);

    let worker_config = WorkerConfig {
        metrics_flush_interval: Duration::from_secs(config.metrics_flush_secs.max(1)),
    };
    let scheduler = Arc::new(WorkerScheduler::new(worker_config, clickhouse, consumer));
    let handles = scheduler.start(shutdown_rx);

    shutdown_signal().await;
    info!("Shutting down...");
    let _ = shutdown_tx.send(true);

    // The file in progress gets the full drain window plus time to settle.
    let grace = config.ingest.drain_timeout() + Duration::from_secs(5);
    let joined = tokio::time::timeout(grace, async {
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task failed");
            }
        }
    })
    .await;

    if joined.is_err() {
        warn!(grace_ms = %grace.as_millis(), "Workers did not stop in time");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("INGESTION")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // The config crate's nested parsing doesn't work reliably with underscored field names
    if let Ok(brokers) = std::env::var("INGESTION_REDPANDA_BROKERS") {
        config.redpanda.brokers = brokers.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Ok(username) = std::env::var("INGESTION_REDPANDA_SASL_USERNAME") {
        config.redpanda.sasl_username = Some(username);
    }
    if let Ok(password) = std::env::var("INGESTION_REDPANDA_SASL_PASSWORD") {
        config.redpanda.sasl_password = Some(password);
    }
    if let Ok(topic) = std::env::var("INGESTION_REDPANDA_TOPIC") {
        config.redpanda.consumer.topic = topic;
    }
    if let Ok(group) = std::env::var("INGESTION_REDPANDA_GROUP_ID") {
        config.redpanda.consumer.group_id = group;
    }
    if let Ok(start) = std::env::var("INGESTION_REDPANDA_START_OFFSET") {
        config.redpanda.consumer.start_offset = match start.as_str() {
            "latest" => StartOffset::Latest,
            "earliest" => StartOffset::Earliest,
            other => return Err(anyhow!("Unknown start offset: {}", other)),
        };
    }

    if let Ok(url) = std::env::var("INGESTION_CLICKHOUSE_URL") {
        config.clickhouse.url = url;
    }
    if let Ok(database) = std::env::var("INGESTION_CLICKHOUSE_DATABASE") {
        config.clickhouse.database = database;
    }
    if let Ok(username) = std::env::var("INGESTION_CLICKHOUSE_USERNAME") {
        config.clickhouse.username = Some(username);
    }
    if let Ok(password) = std::env::var("INGESTION_CLICKHOUSE_PASSWORD") {
        config.clickhouse.password = Some(password);
    }

    if let Ok(batch_size) = std::env::var("INGESTION_BATCH_SIZE") {
        config.ingest.batch_size = batch_size
            .parse()
            .context("INGESTION_BATCH_SIZE must be an integer")?;
    }
    if let Ok(max_in_flight) = std::env::var("INGESTION_MAX_IN_FLIGHT") {
        config.ingest.max_in_flight = max_in_flight
            .parse()
            .context("INGESTION_MAX_IN_FLIGHT must be an integer")?;
    }

    Ok(config)
}

/// Check component health on startup.
async fn check_health(config: &Config, clickhouse: &ClickHouseClient) {
    let redpanda_healthy = redpanda::health::check_connection(&config.redpanda).await;
    if redpanda_healthy {
        health().redpanda.set_healthy();
        info!("Redpanda connection: healthy");
    } else {
        health().redpanda.set_unhealthy("Connection failed");
        error!("Redpanda connection: unhealthy");
    }

    if clickhouse_client::health::report_connection(clickhouse, &health().clickhouse).await {
        info!("ClickHouse connection: healthy");
    } else {
        error!("ClickHouse connection: unhealthy");
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
