//! Worker scheduler: runs the consumer loop and the metrics flush side by
//! side until shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info};

use clickhouse_client::insert::insert_metrics;
use clickhouse_client::ClickHouseClient;
use telemetry::{health, metrics};

use crate::consumer::ConsumerWorker;

/// Worker scheduler configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Metrics flush interval
    pub metrics_flush_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            metrics_flush_interval: Duration::from_secs(60), // 1 minute
        }
    }
}

/// Background worker scheduler.
pub struct WorkerScheduler {
    config: WorkerConfig,
    clickhouse: ClickHouseClient,
    consumer: Arc<ConsumerWorker>,
}

impl WorkerScheduler {
    pub fn new(config: WorkerConfig, clickhouse: ClickHouseClient, consumer: ConsumerWorker) -> Self {
        Self {
            config,
            clickhouse,
            consumer: Arc::new(consumer),
        }
    }

    /// Starts all background workers. Each one exits once `shutdown` is set.
    pub fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        let consumer = self.consumer.clone();
        let rx = shutdown.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = consumer.run(rx).await {
                error!(error = %e, "Consumer worker fatal error");
                health().consumer.set_unhealthy(e.to_string());
            }
        }));
        info!("Consumer worker started");

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_metrics_flush(shutdown).await;
        }));

        info!("Background workers started");
        handles
    }

    async fn run_metrics_flush(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.metrics_flush_interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                Ok(()) = shutdown.changed() => {}
            }

            self.flush_metrics().await;

            if *shutdown.borrow() {
                break;
            }
        }
        debug!("Metrics flush stopped");
    }

    async fn flush_metrics(&self) {
        let snapshot = metrics().snapshot();
        debug!(
            files_completed = snapshot.files_completed,
            rows_inserted = snapshot.rows_inserted,
            "Flushing metrics"
        );
        if let Err(e) = insert_metrics(&self.clickhouse, snapshot).await {
            error!(error = %e, "Failed to flush metrics");
        }
    }
}
