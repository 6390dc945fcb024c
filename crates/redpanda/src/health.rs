//! Redpanda health checks.

use crate::config::RedpandaConfig;
use rskafka::client::ClientBuilder;
use tracing::{debug, error, warn};

/// Check that the brokers are reachable and the ingestion topic exists.
pub async fn check_connection(config: &RedpandaConfig) -> bool {
    let client = match ClientBuilder::new(config.brokers.clone()).build().await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to Redpanda: {}", e);
            return false;
        }
    };

    match client.list_topics().await {
        Ok(topics) => {
            let topic = &config.consumer.topic;
            if topics.iter().any(|t| &t.name == topic) {
                debug!(topics = topics.len(), "Redpanda connection healthy");
            } else {
                // The partition client retries until the topic appears.
                warn!(topic = %topic, "Ingestion topic does not exist yet");
            }
            true
        }
        Err(e) => {
            error!("Failed to list Redpanda topics: {}", e);
            false
        }
    }
}
