//! Startup connectivity check for ClickHouse.

use crate::client::{db_err, ClickHouseClient};
use ingest_core::{Error, Result};
use telemetry::ComponentHealth;
use tracing::{debug, error};

/// Runs `SELECT 1` against the configured server.
pub async fn check_connection(client: &ClickHouseClient) -> Result<()> {
    let one = client
        .inner()
        .query("SELECT 1")
        .fetch_one::<u8>()
        .await
        .map_err(db_err("Health check failed"))?;
    if one != 1 {
        return Err(Error::database(format!(
            "Health check returned {} instead of 1",
            one
        )));
    }
    Ok(())
}

/// Checks the connection and records the outcome on `component`.
pub async fn report_connection(client: &ClickHouseClient, component: &ComponentHealth) -> bool {
    match check_connection(client).await {
        Ok(()) => {
            debug!(url = %client.config().url, "ClickHouse connection healthy");
            component.set_healthy();
            true
        }
        Err(e) => {
            error!(
                url = %client.config().url,
                code = e.code(),
                error = %e,
                "ClickHouse health check failed"
            );
            component.set_unhealthy(e.to_string());
            false
        }
    }
}
